//! Core ledger components
//!
//! This module contains the fundamental building blocks:
//! - Transactions (UTXO transfers with payment and change outputs)
//! - The UTXO set (`LedgerState`)
//! - Blocks (merkle root and proof-of-work sealing)
//! - Blockchain (chain management and the live UTXO set)
//! - Chain validation (full replay from genesis)

pub mod block;
pub mod blockchain;
pub mod transaction;
pub mod utxo;
pub mod validation;

pub use block::{Block, BlockError, GENESIS_PREVIOUS_HASH};
pub use blockchain::{
    Blockchain, BlockchainError, ChainStats, LedgerConfig, PendingBlock, DEFAULT_DIFFICULTY,
    MINIMUM_TRANSACTION,
};
pub use transaction::{
    output_id, Transaction, TransactionError, TransactionInput, TransactionOutput, TxIdIssuer,
    CHANGE_OUTPUT, GENESIS_TX_ID, RECIPIENT_OUTPUT,
};
pub use utxo::LedgerState;
pub use validation::{validate_chain, ChainValidator, ValidationError};
