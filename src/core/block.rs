//! Block implementation for the ledger
//!
//! A block links to its predecessor by hash, carries an ordered list of
//! transactions summarised by a merkle root, and is sealed by searching
//! for a nonce whose hash meets the difficulty target.

use crate::core::transaction::{Transaction, TransactionError, TxIdIssuer};
use crate::core::utxo::LedgerState;
use crate::crypto::{calculate_merkle_root, meets_difficulty, sha256_hex, MerkleMode};
use crate::mining::CancelToken;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// `previous_hash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

// =============================================================================
// Block Errors
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("Block has no transactions")]
    NoTransactions,
    #[error("Proof-of-work search cancelled")]
    Cancelled,
    #[error("Nonce space exhausted without meeting difficulty {0}")]
    NonceSpaceExhausted(usize),
}

/// A block in the chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Hash of the preceding block, or [`GENESIS_PREVIOUS_HASH`]
    pub previous_hash: String,
    /// Creation time; hashed at millisecond precision
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    /// Set immediately before sealing
    pub merkle_root: String,
    pub nonce: u64,
    /// Cached hash; see [`Block::calculate_hash`]
    pub hash: String,
}

impl Block {
    /// Create an empty, unsealed block on top of `previous_hash`
    pub fn new(previous_hash: &str) -> Self {
        let mut block = Self {
            previous_hash: previous_hash.to_string(),
            timestamp: Utc::now(),
            transactions: Vec::new(),
            merkle_root: String::new(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Create an empty genesis block
    pub fn genesis() -> Self {
        Self::new(GENESIS_PREVIOUS_HASH)
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// Recompute the hash from the current fields
    pub fn calculate_hash(&self) -> String {
        self.hash_with_nonce(self.nonce)
    }

    /// Hash the block as if its nonce were `nonce`
    pub fn hash_with_nonce(&self, nonce: u64) -> String {
        let data = format!(
            "{}{}{}{}",
            self.previous_hash,
            self.timestamp.timestamp_millis(),
            nonce,
            self.merkle_root
        );
        sha256_hex(data.as_bytes())
    }

    /// Merkle root of the current transactions
    pub fn compute_merkle_root(&self, mode: MerkleMode) -> Result<String, BlockError> {
        let ids: Vec<&str> = self.transactions.iter().map(|tx| tx.id.as_str()).collect();
        calculate_merkle_root(&ids, mode).ok_or(BlockError::NoTransactions)
    }

    /// Add a transaction to the block.
    ///
    /// The genesis block takes its hand-built transaction as-is; any other
    /// block runs the transaction processor against `state` first and
    /// discards the transaction if it is refused.
    pub fn add_transaction(
        &mut self,
        mut transaction: Transaction,
        state: &mut LedgerState,
        issuer: &mut TxIdIssuer,
        minimum_value: u64,
    ) -> Result<(), TransactionError> {
        if !self.is_genesis() {
            if let Err(e) = transaction.process(state, issuer, minimum_value) {
                warn!("Transaction failed to process. Discarded: {}", e);
                return Err(e);
            }
        }

        self.transactions.push(transaction);
        info!("Transaction successfully added to block");
        Ok(())
    }

    /// Fix the merkle root and search nonces until the hash meets `difficulty`.
    /// Returns the number of hashes tried.
    pub fn seal(&mut self, difficulty: usize, mode: MerkleMode) -> Result<u64, BlockError> {
        self.seal_with_cancel(difficulty, mode, &CancelToken::new())
    }

    /// As [`Block::seal`], checking `cancel` before every attempt
    pub fn seal_with_cancel(
        &mut self,
        difficulty: usize,
        mode: MerkleMode,
        cancel: &CancelToken,
    ) -> Result<u64, BlockError> {
        self.prepare_seal(mode)?;

        let mut attempts = 0u64;
        let mut nonce = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(BlockError::Cancelled);
            }

            let hash = self.hash_with_nonce(nonce);
            attempts += 1;

            if meets_difficulty(&hash, difficulty) {
                self.nonce = nonce;
                self.hash = hash;
                info!("Block mined: {}", self.hash);
                return Ok(attempts);
            }

            nonce = nonce
                .checked_add(1)
                .ok_or(BlockError::NonceSpaceExhausted(difficulty))?;
        }
    }

    /// Compute and store the merkle root ahead of a nonce search
    pub(crate) fn prepare_seal(&mut self, mode: MerkleMode) -> Result<(), BlockError> {
        self.merkle_root = self.compute_merkle_root(mode)?;
        Ok(())
    }

    /// Recompute the hash from current fields and check it against both the
    /// cached hash and the difficulty target
    pub fn verify_seal(&self, difficulty: usize) -> bool {
        let hash = self.calculate_hash();
        hash == self.hash && meets_difficulty(&hash, difficulty)
    }

    /// Check the stored merkle root against the transactions
    pub fn verify_merkle_root(&self, mode: MerkleMode) -> bool {
        self.compute_merkle_root(mode)
            .map(|root| root == self.merkle_root)
            .unwrap_or(false)
    }

    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }
}
