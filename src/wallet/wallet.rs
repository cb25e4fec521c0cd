//! Wallet implementation for the ledger
//!
//! A wallet holds a key pair and a local view of the unspent outputs it
//! owns, and builds signed transfers spending them.

use crate::core::{LedgerState, Transaction, TransactionError, TransactionInput, TransactionOutput};
use crate::crypto::{KeyError, KeyPair};
use log::{debug, warn};
use secp256k1::PublicKey;
use std::collections::BTreeMap;
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

/// A key pair plus the outputs it can spend
pub struct Wallet {
    key_pair: KeyPair,
    /// Optional label for display
    pub label: Option<String>,
    /// Owned outputs by id, as of the last refresh
    utxos: BTreeMap<String, TransactionOutput>,
}

impl Wallet {
    /// Create a new wallet with a fresh key pair
    pub fn new() -> Self {
        Self::from_key_pair(KeyPair::generate())
    }

    /// Create a wallet with a label
    pub fn with_label(label: &str) -> Self {
        let mut wallet = Self::new();
        wallet.label = Some(label.to_string());
        wallet
    }

    /// Import a wallet from a private key
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, WalletError> {
        Ok(Self::from_key_pair(KeyPair::from_private_key_hex(private_key_hex)?))
    }

    fn from_key_pair(key_pair: KeyPair) -> Self {
        Self {
            key_pair,
            label: None,
            utxos: BTreeMap::new(),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.key_pair.public_key
    }

    /// Base58Check address, for display only
    pub fn address(&self) -> String {
        self.key_pair.address()
    }

    /// Get the wallet's private key (hex)
    /// WARNING: Keep this secret!
    pub fn private_key(&self) -> String {
        self.key_pair.private_key_hex()
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Name for log lines: the label if set, else the address
    pub fn display_name(&self) -> String {
        self.label.clone().unwrap_or_else(|| self.address())
    }

    /// Refresh the local view from `state` and return the total owned
    pub fn balance(&mut self, state: &LedgerState) -> u64 {
        let owner = self.public_key();
        self.utxos = state
            .owned_by(&owner)
            .map(|output| (output.id.clone(), output.clone()))
            .collect();
        self.local_balance()
    }

    /// Total of the local view without refreshing it
    pub fn local_balance(&self) -> u64 {
        self.utxos
            .values()
            .fold(0u64, |total, output| total.saturating_add(output.value))
    }

    /// Outputs in the local view
    pub fn utxos(&self) -> impl Iterator<Item = &TransactionOutput> {
        self.utxos.values()
    }

    /// Build a signed transfer of `value` to `recipient`.
    ///
    /// Refreshes the local view, then picks owned outputs in id order until
    /// they cover `value`. The picked outputs leave the local view whether
    /// or not the ledger later accepts the transaction.
    pub fn build_and_sign_transfer(
        &mut self,
        recipient: &PublicKey,
        value: u64,
        state: &LedgerState,
    ) -> Result<Transaction, WalletError> {
        let have = self.balance(state);
        if have < value {
            warn!(
                "{}: not enough funds to send {} (balance {})",
                self.display_name(),
                value,
                have
            );
            return Err(WalletError::InsufficientFunds { have, need: value });
        }

        let mut selected = Vec::new();
        let mut total = 0u64;
        for id in self.utxos.keys() {
            if total >= value {
                break;
            }
            total = total.saturating_add(self.utxos[id].value);
            selected.push(id.clone());
        }

        let inputs: Vec<TransactionInput> = selected
            .iter()
            .map(|id| TransactionInput::new(id))
            .collect();

        let mut transaction = Transaction::new(self.public_key(), *recipient, value, inputs);
        transaction.sign(&self.key_pair)?;

        for id in &selected {
            self.utxos.remove(id);
        }

        debug!(
            "{}: built transfer of {} using {} input(s) worth {}",
            self.display_name(),
            value,
            selected.len(),
            total
        );

        Ok(transaction)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}
