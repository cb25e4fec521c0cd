//! Wallet module for key and transfer management

pub mod wallet;

pub use wallet::{Wallet, WalletError};
