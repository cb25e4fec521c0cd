//! Transaction handling for the ledger
//!
//! Implements the UTXO transfer model: a transaction names one sender, one
//! recipient and a value, spends outputs the sender owns and, once
//! processed, carries exactly two outputs (payment and change).

use crate::core::utxo::LedgerState;
use crate::crypto::{encode_key, sha256_hex, verify_signature, KeyError, KeyPair};
use log::{debug, warn};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Id given to the hand-built genesis transaction
pub const GENESIS_TX_ID: &str = "0";

/// Index of the payment output in a processed transaction
pub const RECIPIENT_OUTPUT: usize = 0;

/// Index of the change output in a processed transaction
pub const CHANGE_OUTPUT: usize = 1;

// =============================================================================
// Error Types
// =============================================================================

/// Reasons a transaction is refused by the processor
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Inputs too small: {inputs} (minimum: {minimum})")]
    BelowMinimum { inputs: u64, minimum: u64 },
    #[error("Inputs of {inputs} cannot cover a transfer of {value}")]
    InsufficientInputs { inputs: u64, value: u64 },
    #[error("Output {0} is referenced by more than one input")]
    DuplicateInput(String),
    #[error("Input values overflow")]
    ValueOverflow,
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
}

// =============================================================================
// Transaction Output
// =============================================================================

/// Derive the id of the output at `index` of transaction `tx_id`
pub fn output_id(tx_id: &str, index: usize) -> String {
    format!("{}:{}", tx_id, index)
}

/// A quantity of value assigned to one owner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionOutput {
    /// Derived from the owning transaction id and the output index
    pub id: String,
    /// Public key entitled to spend this output
    pub owner: PublicKey,
    pub value: u64,
    /// Id of the transaction that created this output
    pub parent_transaction_id: String,
}

impl TransactionOutput {
    pub fn new(owner: PublicKey, value: u64, parent_transaction_id: &str, index: usize) -> Self {
        Self {
            id: output_id(parent_transaction_id, index),
            owner,
            value,
            parent_transaction_id: parent_transaction_id.to_string(),
        }
    }

    /// Check if this output belongs to the given key
    pub fn is_owned_by(&self, public_key: &PublicKey) -> bool {
        &self.owner == public_key
    }
}

// =============================================================================
// Transaction Input
// =============================================================================

/// A claim against one existing, unspent output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionInput {
    /// Id of the output being spent
    pub output_id: String,
    /// The output as found in the UTXO set when the transaction was processed.
    /// Not part of the transaction's identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<TransactionOutput>,
}

impl TransactionInput {
    pub fn new(output_id: &str) -> Self {
        Self {
            output_id: output_id.to_string(),
            resolved: None,
        }
    }

    /// Value contributed by this input (zero when unresolved)
    pub fn value(&self) -> u64 {
        self.resolved.as_ref().map(|o| o.value).unwrap_or(0)
    }
}

// =============================================================================
// Id issuer
// =============================================================================

/// Monotonic counter that keeps otherwise identical transfers from sharing
/// an id. Process-local; it carries no consensus meaning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxIdIssuer {
    last: u64,
}

impl TxIdIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the counter and return the new sequence number
    pub fn issue(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    /// Last sequence number handed out
    pub fn last(&self) -> u64 {
        self.last
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A value transfer from `sender` to `recipient`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Assigned when the transaction is processed
    pub id: String,
    pub sender: PublicKey,
    pub recipient: PublicKey,
    /// Amount transferred to `recipient`
    pub value: u64,
    /// Hex-encoded compact ECDSA signature over [`Transaction::signing_data`]
    pub signature: String,
    /// Sequence number the id was derived from
    #[serde(default)]
    pub sequence: u64,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
}

impl Transaction {
    /// Create an unsigned, unprocessed transaction
    pub fn new(
        sender: PublicKey,
        recipient: PublicKey,
        value: u64,
        inputs: Vec<TransactionInput>,
    ) -> Self {
        Self {
            id: String::new(),
            sender,
            recipient,
            value,
            signature: String::new(),
            sequence: 0,
            inputs,
            outputs: Vec::new(),
        }
    }

    /// Build the genesis transaction: `value` minted to `recipient`, signed
    /// by `coinbase`, with the fixed genesis id and a single output.
    pub fn genesis(
        coinbase: &KeyPair,
        recipient: PublicKey,
        value: u64,
    ) -> Result<Self, TransactionError> {
        let mut tx = Self::new(coinbase.public_key, recipient, value, Vec::new());
        tx.sign(coinbase)?;
        tx.id = GENESIS_TX_ID.to_string();
        tx.outputs
            .push(TransactionOutput::new(recipient, value, &tx.id, RECIPIENT_OUTPUT));
        Ok(tx)
    }

    /// Data covered by the signature: `sender ∥ recipient ∥ value`
    pub fn signing_data(&self) -> Vec<u8> {
        format!(
            "{}{}{}",
            encode_key(&self.sender),
            encode_key(&self.recipient),
            self.value
        )
        .into_bytes()
    }

    /// Sign with the sender's key pair
    pub fn sign(&mut self, key_pair: &KeyPair) -> Result<(), TransactionError> {
        let signature = key_pair.sign(&self.signing_data())?;
        self.signature = hex::encode(signature);
        Ok(())
    }

    /// Check the signature against the sender's public key.
    /// A missing or malformed signature does not verify.
    pub fn verify_signature(&self) -> bool {
        let Ok(signature) = hex::decode(&self.signature) else {
            return false;
        };
        verify_signature(&self.sender, &self.signing_data(), &signature).unwrap_or(false)
    }

    /// Id for this transfer under the given sequence number
    pub fn calculate_id(&self, sequence: u64) -> String {
        let data = format!(
            "{}{}{}{}",
            encode_key(&self.sender),
            encode_key(&self.recipient),
            self.value,
            sequence
        );
        sha256_hex(data.as_bytes())
    }

    pub fn is_genesis(&self) -> bool {
        self.id == GENESIS_TX_ID && self.inputs.is_empty()
    }

    /// Sum of resolved inputs; unresolved inputs count as zero.
    /// `None` if the sum overflows.
    pub fn inputs_value(&self) -> Option<u64> {
        checked_total(self.inputs.iter().map(TransactionInput::value))
    }

    /// Sum of outputs, `None` on overflow
    pub fn outputs_value(&self) -> Option<u64> {
        checked_total(self.outputs.iter().map(|o| o.value))
    }

    /// Validate the transaction against `state` and, if accepted, move its
    /// inputs into two fresh outputs.
    ///
    /// Inputs that cannot be found in `state` are left unresolved and
    /// contribute nothing; the transaction is only refused when the
    /// resolved total is below `minimum_value` or short of `value`.
    /// `state` is only touched once every check has passed.
    pub fn process(
        &mut self,
        state: &mut LedgerState,
        issuer: &mut TxIdIssuer,
        minimum_value: u64,
    ) -> Result<(), TransactionError> {
        if !self.verify_signature() {
            warn!("Transaction signature failed to verify");
            return Err(TransactionError::InvalidSignature);
        }

        let mut seen = HashSet::new();
        for input in &mut self.inputs {
            if !seen.insert(input.output_id.clone()) {
                return Err(TransactionError::DuplicateInput(input.output_id.clone()));
            }
            input.resolved = state.get(&input.output_id).cloned();
            if input.resolved.is_none() {
                debug!("Input {} not found in UTXO set", input.output_id);
            }
        }

        let Some(inputs_value) = self.inputs_value() else {
            warn!("Transaction input values overflow");
            return Err(TransactionError::ValueOverflow);
        };
        if inputs_value < minimum_value {
            warn!(
                "Transaction inputs too small: {} (minimum {})",
                inputs_value, minimum_value
            );
            return Err(TransactionError::BelowMinimum {
                inputs: inputs_value,
                minimum: minimum_value,
            });
        }

        let Some(leftover) = inputs_value.checked_sub(self.value) else {
            warn!(
                "Transaction inputs {} cannot cover value {}",
                inputs_value, self.value
            );
            return Err(TransactionError::InsufficientInputs {
                inputs: inputs_value,
                value: self.value,
            });
        };

        self.sequence = issuer.issue();
        self.id = self.calculate_id(self.sequence);
        self.outputs = vec![
            TransactionOutput::new(self.recipient, self.value, &self.id, RECIPIENT_OUTPUT),
            TransactionOutput::new(self.sender, leftover, &self.id, CHANGE_OUTPUT),
        ];

        for output in &self.outputs {
            state.insert(output.clone());
        }
        for input in &self.inputs {
            if let Some(resolved) = &input.resolved {
                state.remove(&resolved.id);
            }
        }

        debug!(
            "Processed transaction {} ({} in, {} to recipient, {} change)",
            self.id, inputs_value, self.value, leftover
        );
        Ok(())
    }
}

/// Sum `values`, or `None` if the total does not fit in a `u64`
pub fn checked_total(values: impl IntoIterator<Item = u64>) -> Option<u64> {
    values
        .into_iter()
        .try_fold(0u64, |total, value| total.checked_add(value))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        alice: KeyPair,
        bob: KeyPair,
        genesis: Transaction,
        state: LedgerState,
        issuer: TxIdIssuer,
    }

    fn fixture(amount: u64) -> Fixture {
        let coinbase = KeyPair::generate();
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let genesis = Transaction::genesis(&coinbase, alice.public_key, amount).unwrap();
        let state = LedgerState::from_genesis(&genesis);
        Fixture {
            alice,
            bob,
            genesis,
            state,
            issuer: TxIdIssuer::new(),
        }
    }

    fn transfer(from: &KeyPair, to: &KeyPair, value: u64, spend: &[&str]) -> Transaction {
        let inputs = spend.iter().map(|id| TransactionInput::new(id)).collect();
        let mut tx = Transaction::new(from.public_key, to.public_key, value, inputs);
        tx.sign(from).unwrap();
        tx
    }

    #[test]
    fn test_genesis_transaction() {
        let f = fixture(100);
        assert!(f.genesis.is_genesis());
        assert_eq!(f.genesis.id, GENESIS_TX_ID);
        assert_eq!(f.genesis.outputs.len(), 1);
        assert_eq!(f.genesis.outputs[0].id, "0:0");
        assert_eq!(f.genesis.outputs[0].value, 100);
        assert!(f.genesis.verify_signature());
    }

    #[test]
    fn test_signature_covers_value() {
        let f = fixture(100);
        let mut tx = transfer(&f.alice, &f.bob, 40, &["0:0"]);
        assert!(tx.verify_signature());

        tx.value = 41;
        assert!(!tx.verify_signature());
    }

    #[test]
    fn test_signature_by_wrong_key_rejected() {
        let mut f = fixture(100);
        // bob signs a transfer claiming alice as sender
        let mut tx = Transaction::new(
            f.alice.public_key,
            f.bob.public_key,
            40,
            vec![TransactionInput::new("0:0")],
        );
        tx.sign(&f.bob).unwrap();

        let result = tx.process(&mut f.state, &mut f.issuer, 1);
        assert!(matches!(result, Err(TransactionError::InvalidSignature)));
        assert!(f.state.contains("0:0"));
    }

    #[test]
    fn test_process_creates_payment_and_change() {
        let mut f = fixture(100);
        let mut tx = transfer(&f.alice, &f.bob, 40, &["0:0"]);

        tx.process(&mut f.state, &mut f.issuer, 1).unwrap();

        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[RECIPIENT_OUTPUT].owner, f.bob.public_key);
        assert_eq!(tx.outputs[RECIPIENT_OUTPUT].value, 40);
        assert_eq!(tx.outputs[CHANGE_OUTPUT].owner, f.alice.public_key);
        assert_eq!(tx.outputs[CHANGE_OUTPUT].value, 60);
        assert_eq!(tx.inputs_value(), tx.outputs_value());

        assert!(!f.state.contains("0:0"));
        assert_eq!(f.state.balance_of(&f.alice.public_key), 60);
        assert_eq!(f.state.balance_of(&f.bob.public_key), 40);
    }

    #[test]
    fn test_ids_differ_for_identical_transfers() {
        let mut f = fixture(100);
        let mut first = transfer(&f.alice, &f.bob, 10, &["0:0"]);
        first.process(&mut f.state, &mut f.issuer, 1).unwrap();

        let change = first.outputs[CHANGE_OUTPUT].id.clone();
        let mut second = transfer(&f.alice, &f.bob, 10, &[&change]);
        second.process(&mut f.state, &mut f.issuer, 1).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(second.sequence, first.sequence + 1);
        assert_eq!(first.id, first.calculate_id(first.sequence));
    }

    #[test]
    fn test_below_minimum_leaves_state_untouched() {
        let mut f = fixture(100);
        let before = f.state.clone();
        let mut tx = transfer(&f.alice, &f.bob, 40, &["0:0"]);

        let result = tx.process(&mut f.state, &mut f.issuer, 500);

        assert!(matches!(
            result,
            Err(TransactionError::BelowMinimum {
                inputs: 100,
                minimum: 500
            })
        ));
        assert_eq!(f.state, before);
        assert!(tx.outputs.is_empty());
    }

    #[test]
    fn test_value_above_inputs_rejected() {
        let mut f = fixture(60);
        let before = f.state.clone();
        let mut tx = transfer(&f.alice, &f.bob, 1000, &["0:0"]);

        let result = tx.process(&mut f.state, &mut f.issuer, 1);

        assert!(matches!(
            result,
            Err(TransactionError::InsufficientInputs {
                inputs: 60,
                value: 1000
            })
        ));
        assert_eq!(f.state, before);
    }

    #[test]
    fn test_unresolved_input_contributes_zero() {
        // An input that cannot be found does not fail the transaction by
        // itself; it simply adds nothing to the spendable total.
        let mut f = fixture(100);
        let mut tx = transfer(&f.alice, &f.bob, 30, &["0:0", "missing:7"]);

        tx.process(&mut f.state, &mut f.issuer, 1).unwrap();

        assert!(tx.inputs[0].resolved.is_some());
        assert!(tx.inputs[1].resolved.is_none());
        assert_eq!(tx.inputs_value(), Some(100));
        assert_eq!(tx.outputs[CHANGE_OUTPUT].value, 70);
    }

    #[test]
    fn test_overflowing_inputs_rejected() {
        let mut f = fixture(100);
        f.state
            .insert(TransactionOutput::new(f.alice.public_key, u64::MAX, "big", 0));
        let before = f.state.clone();
        let mut tx = transfer(&f.alice, &f.bob, 10, &["0:0", "big:0"]);

        let result = tx.process(&mut f.state, &mut f.issuer, 1);

        assert!(matches!(result, Err(TransactionError::ValueOverflow)));
        assert_eq!(f.state, before);
        assert!(tx.outputs.is_empty());
    }

    #[test]
    fn test_checked_total() {
        assert_eq!(checked_total(Vec::new()), Some(0));
        assert_eq!(checked_total([1, 2, 3]), Some(6));
        assert_eq!(checked_total([u64::MAX, 101]), None);
    }

    #[test]
    fn test_only_unresolved_inputs_is_below_minimum() {
        let mut f = fixture(100);
        let mut tx = transfer(&f.alice, &f.bob, 0, &["missing:0"]);

        let result = tx.process(&mut f.state, &mut f.issuer, 1);
        assert!(matches!(
            result,
            Err(TransactionError::BelowMinimum { inputs: 0, .. })
        ));
    }

    #[test]
    fn test_spent_output_cannot_be_spent_again() {
        let mut f = fixture(100);
        let mut first = transfer(&f.alice, &f.bob, 40, &["0:0"]);
        first.process(&mut f.state, &mut f.issuer, 1).unwrap();

        let mut replay = transfer(&f.alice, &f.bob, 40, &["0:0"]);
        let result = replay.process(&mut f.state, &mut f.issuer, 1);

        assert!(matches!(result, Err(TransactionError::BelowMinimum { .. })));
        assert_eq!(f.state.balance_of(&f.bob.public_key), 40);
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let mut f = fixture(100);
        let mut tx = transfer(&f.alice, &f.bob, 150, &["0:0", "0:0"]);

        let result = tx.process(&mut f.state, &mut f.issuer, 1);
        assert!(matches!(result, Err(TransactionError::DuplicateInput(id)) if id == "0:0"));
        assert_eq!(f.state.balance_of(&f.alice.public_key), 100);
    }

    #[test]
    fn test_issuer_is_monotonic() {
        let mut issuer = TxIdIssuer::new();
        assert_eq!(issuer.last(), 0);
        assert_eq!(issuer.issue(), 1);
        assert_eq!(issuer.issue(), 2);
        assert_eq!(issuer.last(), 2);
    }
}
