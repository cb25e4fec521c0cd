//! Unspent output set
//!
//! `LedgerState` is the authoritative record of spendable value. The chain
//! keeps one live instance; the validator builds its own from genesis.

use crate::core::block::Block;
use crate::core::transaction::{Transaction, TransactionOutput};
use secp256k1::PublicKey;
use std::collections::HashMap;

/// Mapping from output id to the unspent output record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    utxos: HashMap<String, TransactionOutput>,
}

impl LedgerState {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set seeded with the genesis transaction's outputs
    pub fn from_genesis(genesis: &Transaction) -> Self {
        let mut state = Self::new();
        for output in &genesis.outputs {
            state.insert(output.clone());
        }
        state
    }

    /// Rebuild the set by applying every post-genesis block to the genesis seed.
    ///
    /// Each transaction removes the inputs it resolved and adds its outputs,
    /// mirroring what processing did when the chain was built.
    pub fn rebuild(genesis: &Transaction, blocks: &[Block]) -> Self {
        let mut state = Self::from_genesis(genesis);
        for block in blocks.iter().skip(1) {
            for tx in &block.transactions {
                for input in &tx.inputs {
                    if let Some(resolved) = &input.resolved {
                        state.remove(&resolved.id);
                    }
                }
                for output in &tx.outputs {
                    state.insert(output.clone());
                }
            }
        }
        state
    }

    pub fn get(&self, id: &str) -> Option<&TransactionOutput> {
        self.utxos.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.utxos.contains_key(id)
    }

    /// Add an output, replacing any record with the same id
    pub fn insert(&mut self, output: TransactionOutput) {
        self.utxos.insert(output.id.clone(), output);
    }

    pub fn remove(&mut self, id: &str) -> Option<TransactionOutput> {
        self.utxos.remove(id)
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// Outputs owned by the given key
    pub fn owned_by<'a>(
        &'a self,
        owner: &'a PublicKey,
    ) -> impl Iterator<Item = &'a TransactionOutput> + 'a {
        self.utxos.values().filter(move |o| o.is_owned_by(owner))
    }

    /// Total value owned by the given key, saturating at `u64::MAX`
    pub fn balance_of(&self, owner: &PublicKey) -> u64 {
        self.owned_by(owner)
            .fold(0u64, |total, o| total.saturating_add(o.value))
    }

    /// Total value held in the set, saturating at `u64::MAX`
    pub fn total_value(&self) -> u64 {
        self.utxos
            .values()
            .fold(0u64, |total, o| total.saturating_add(o.value))
    }
}
