//! UTXO ledger: a single-node ledger core in Rust
//!
//! This crate provides:
//! - Signed value transfers between secp256k1 key holders (UTXO model)
//! - An explicit UTXO set (`LedgerState`) with one payment and one change
//!   output per transfer
//! - Blocks committed by a merkle root and sealed by proof-of-work, with
//!   cancellable and multi-threaded nonce search
//! - Full-chain validation that replays every transaction from genesis
//! - Wallets that select their own outputs as inputs
//! - JSON persistence with rotating backups
//!
//! # Example
//!
//! ```rust
//! use utxo_ledger::core::{Blockchain, LedgerConfig, Transaction};
//! use utxo_ledger::wallet::Wallet;
//!
//! let coinbase = Wallet::new();
//! let mut alice = Wallet::new();
//! let bob = Wallet::new();
//!
//! let genesis = Transaction::genesis(coinbase.key_pair(), alice.public_key(), 100).unwrap();
//! let mut chain = Blockchain::new(genesis, LedgerConfig::with_difficulty(1)).unwrap();
//!
//! let mut block = chain.next_block();
//! let tx = alice.build_and_sign_transfer(&bob.public_key(), 40, chain.state()).unwrap();
//! chain.add_transaction(&mut block, tx).unwrap();
//! chain.add_block(block).unwrap();
//!
//! assert_eq!(alice.balance(chain.state()), 60);
//! assert!(chain.is_valid());
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod mining;
pub mod storage;
pub mod wallet;

// Re-export commonly used types
pub use core::{
    Block, Blockchain, LedgerConfig, LedgerState, Transaction, ValidationError,
    DEFAULT_DIFFICULTY,
};
pub use crypto::{KeyPair, MerkleMode};
pub use mining::{CancelToken, Miner};
pub use storage::Storage;
pub use wallet::Wallet;
