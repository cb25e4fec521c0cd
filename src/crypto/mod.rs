//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing and the hex difficulty target
//! - ECDSA key management (secp256k1)
//! - Merkle root calculation

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{meets_difficulty, sha256, sha256_hex};
pub use keys::{
    encode_key, public_key_to_address, sign_message, verify_signature, KeyError, KeyPair,
};
pub use merkle::{calculate_merkle_root, MerkleMode};
