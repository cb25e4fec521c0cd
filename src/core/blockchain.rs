//! Blockchain implementation
//!
//! The `Blockchain` owns the ordered blocks, the genesis transaction, the
//! live UTXO set and the transaction id issuer.

use crate::core::block::Block;
use crate::core::transaction::{Transaction, TransactionError, TxIdIssuer};
use crate::core::utxo::LedgerState;
use crate::core::validation::{ChainValidator, ValidationError};
use crate::crypto::MerkleMode;
use crate::mining::{CancelToken, Miner, MiningError, MiningStats};
use log::info;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default mining difficulty (number of leading zero hex characters)
pub const DEFAULT_DIFFICULTY: usize = 4;

/// Smallest total input value a transfer may spend
pub const MINIMUM_TRANSACTION: u64 = 1;

/// Blockchain-related errors
#[derive(Error, Debug)]
pub enum BlockchainError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Mining error: {0}")]
    Mining(#[from] MiningError),
    #[error("Invalid chain: {0}")]
    InvalidChain(#[from] ValidationError),
    #[error("Block does not extend the chain tip")]
    NotOnTip,
}

/// Ledger parameters, persisted with the chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Leading zero hex characters required of every block hash
    pub difficulty: usize,
    /// Smallest total input value a transfer may spend
    pub minimum_value: u64,
    /// Merkle pairing used when sealing and validating
    #[serde(default)]
    pub merkle_mode: MerkleMode,
    /// Threads used by the nonce search
    #[serde(default = "default_workers")]
    pub mining_workers: usize,
}

fn default_workers() -> usize {
    1
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            minimum_value: MINIMUM_TRANSACTION,
            merkle_mode: MerkleMode::default(),
            mining_workers: default_workers(),
        }
    }
}

impl LedgerConfig {
    pub fn with_difficulty(difficulty: usize) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }

    /// Validator matching these parameters
    pub fn validator(&self) -> ChainValidator {
        ChainValidator::new(self.difficulty).with_merkle_mode(self.merkle_mode)
    }

    /// Miner matching these parameters
    pub fn miner(&self) -> Miner {
        Miner::new(self.difficulty, self.merkle_mode).with_workers(self.mining_workers)
    }
}

/// A block being assembled on top of the chain tip.
///
/// Transactions are processed against the pending block's own copy of the
/// UTXO set and id issuer. The chain adopts both only when the block is
/// appended, so a block that is cancelled, stale or dropped leaves the
/// chain untouched.
#[derive(Debug, Clone)]
pub struct PendingBlock {
    block: Block,
    state: LedgerState,
    issuer: TxIdIssuer,
}

impl PendingBlock {
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// The UTXO set with this block's transactions applied
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn tx_count(&self) -> usize {
        self.block.tx_count()
    }
}

/// The main blockchain structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredChain")]
pub struct Blockchain {
    /// The chain of blocks; index 0 is genesis and is never removed
    blocks: Vec<Block>,
    /// The hand-built transaction that seeds the UTXO set
    pub genesis_transaction: Transaction,
    pub config: LedgerConfig,
    issuer: TxIdIssuer,
    /// Unspent outputs of the appended blocks; rebuilt from them on load
    #[serde(skip)]
    state: LedgerState,
}

/// On-disk form of a [`Blockchain`]
#[derive(Deserialize)]
struct StoredChain {
    blocks: Vec<Block>,
    genesis_transaction: Transaction,
    config: LedgerConfig,
    #[serde(default)]
    issuer: TxIdIssuer,
}

impl TryFrom<StoredChain> for Blockchain {
    type Error = BlockchainError;

    fn try_from(stored: StoredChain) -> Result<Self, Self::Error> {
        if stored.blocks.is_empty() {
            return Err(ValidationError::MissingGenesis.into());
        }

        let state = LedgerState::rebuild(&stored.genesis_transaction, &stored.blocks);
        Ok(Self {
            blocks: stored.blocks,
            genesis_transaction: stored.genesis_transaction,
            config: stored.config,
            issuer: stored.issuer,
            state,
        })
    }
}

impl Blockchain {
    /// Start a chain: seed the live set with the genesis transaction, then
    /// seal a genesis block carrying it.
    pub fn new(
        genesis_transaction: Transaction,
        config: LedgerConfig,
    ) -> Result<Self, BlockchainError> {
        let mut state = LedgerState::from_genesis(&genesis_transaction);
        let mut issuer = TxIdIssuer::new();

        info!("Creating and mining genesis block...");
        let mut genesis = Block::genesis();
        genesis.add_transaction(
            genesis_transaction.clone(),
            &mut state,
            &mut issuer,
            config.minimum_value,
        )?;
        config.miner().mine(&mut genesis, &CancelToken::new())?;

        Ok(Self {
            blocks: vec![genesis],
            genesis_transaction,
            config,
            issuer,
            state,
        })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Mutable access to the stored blocks. The slice cannot grow or
    /// shrink, so the genesis block always stays. The live set is not
    /// updated; call [`Blockchain::rebuild_state`] after editing.
    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    /// Get the latest block
    pub fn latest_block(&self) -> &Block {
        // never empty: `new` seals genesis and loading rejects an empty list
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn get_block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Index of the latest block
    pub fn height(&self) -> usize {
        self.blocks.len() - 1
    }

    /// Start a block on top of the current tip
    pub fn next_block(&self) -> PendingBlock {
        PendingBlock {
            block: Block::new(&self.latest_block().hash),
            state: self.state.clone(),
            issuer: self.issuer.clone(),
        }
    }

    /// Process `transaction` against the pending block's UTXO set and add
    /// it to the block
    pub fn add_transaction(
        &self,
        pending: &mut PendingBlock,
        transaction: Transaction,
    ) -> Result<(), TransactionError> {
        pending.block.add_transaction(
            transaction,
            &mut pending.state,
            &mut pending.issuer,
            self.config.minimum_value,
        )
    }

    /// Seal `pending` and append it to the chain
    pub fn add_block(&mut self, pending: PendingBlock) -> Result<MiningStats, BlockchainError> {
        self.add_block_with_cancel(pending, &CancelToken::new())
    }

    /// As [`Blockchain::add_block`], giving up when `cancel` fires. On any
    /// error the chain and its live set are unchanged.
    pub fn add_block_with_cancel(
        &mut self,
        mut pending: PendingBlock,
        cancel: &CancelToken,
    ) -> Result<MiningStats, BlockchainError> {
        if pending.block.previous_hash != self.latest_block().hash {
            return Err(BlockchainError::NotOnTip);
        }

        let stats = self.config.miner().mine(&mut pending.block, cancel)?;
        self.blocks.push(pending.block);
        self.state = pending.state;
        self.issuer = pending.issuer;
        Ok(stats)
    }

    /// Replay the whole chain against a fresh UTXO set
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.config
            .validator()
            .validate(&self.blocks, &self.genesis_transaction)
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// The live UTXO set
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Recompute the live set from the stored blocks
    pub fn rebuild_state(&mut self) {
        self.state = LedgerState::rebuild(&self.genesis_transaction, &self.blocks);
    }

    pub fn balance_of(&self, owner: &PublicKey) -> u64 {
        self.state.balance_of(owner)
    }

    /// Find a committed transaction by id
    pub fn find_transaction(&self, id: &str) -> Option<(usize, &Transaction)> {
        self.blocks.iter().enumerate().find_map(|(index, block)| {
            block
                .transactions
                .iter()
                .find(|tx| tx.id == id)
                .map(|tx| (index, tx))
        })
    }

    /// Get chain statistics
    pub fn stats(&self) -> ChainStats {
        ChainStats {
            height: self.height(),
            total_blocks: self.blocks.len(),
            total_transactions: self.blocks.iter().map(Block::tx_count).sum(),
            total_value: self.state.total_value(),
            unspent_outputs: self.state.len(),
            difficulty: self.config.difficulty,
            latest_hash: self.latest_block().hash.clone(),
        }
    }
}

/// Chain statistics
#[derive(Debug, Clone)]
pub struct ChainStats {
    pub height: usize,
    pub total_blocks: usize,
    pub total_transactions: usize,
    pub total_value: u64,
    pub unspent_outputs: usize,
    pub difficulty: usize,
    pub latest_hash: String,
}
