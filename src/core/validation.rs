//! Full-chain replay validation
//!
//! The validator walks the chain from genesis against its own UTXO set,
//! re-deriving linkage, proof of work and spend balances without trusting
//! any state cached by the live ledger.

use crate::core::block::Block;
use crate::core::transaction::{
    checked_total, output_id, Transaction, CHANGE_OUTPUT, RECIPIENT_OUTPUT,
};
use crate::core::utxo::LedgerState;
use crate::crypto::{meets_difficulty, MerkleMode};
use log::{info, warn};
use thiserror::Error;

/// First reason a chain fails replay. Block indices are chain positions;
/// transaction fields carry the transaction id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Chain has no genesis block")]
    MissingGenesis,
    #[error("Block {0}: stored hash does not match its contents")]
    HashMismatch(usize),
    #[error("Block {0}: previous hash does not match the preceding block")]
    LinkageBroken(usize),
    #[error("Block {0}: hash does not meet the difficulty target")]
    ProofOfWorkMissing(usize),
    #[error("Block {0}: merkle root does not match its transactions")]
    MerkleRootMismatch(usize),
    #[error("Block {0}: signature on transaction {1} is invalid")]
    BadSignature(usize, String),
    #[error("Block {0}: inputs of transaction {1} do not equal its outputs")]
    ValueMismatch(usize, String),
    #[error("Block {0}: transaction {1} spends a missing or altered output")]
    MissingOrAlteredInput(usize, String),
    #[error("Block {0}: output {1} does not belong where it is recorded")]
    MisplacedOutput(usize, String),
    #[error("Block {0}: payment output of transaction {1} is not owned by the recipient")]
    WrongRecipient(usize, String),
    #[error("Block {0}: change output of transaction {1} is not owned by the sender")]
    ChangeMisdirected(usize, String),
}

/// Replays a chain against a scratch UTXO set
#[derive(Debug, Clone)]
pub struct ChainValidator {
    difficulty: usize,
    merkle_mode: MerkleMode,
}

impl ChainValidator {
    pub fn new(difficulty: usize) -> Self {
        Self {
            difficulty,
            merkle_mode: MerkleMode::default(),
        }
    }

    /// Merkle pairing the chain was sealed with
    pub fn with_merkle_mode(mut self, mode: MerkleMode) -> Self {
        self.merkle_mode = mode;
        self
    }

    /// Replay `chain` from genesis. Returns the first failure found.
    pub fn validate(&self, chain: &[Block], genesis: &Transaction) -> Result<(), ValidationError> {
        if chain.is_empty() {
            return Err(ValidationError::MissingGenesis);
        }

        let mut scratch = LedgerState::from_genesis(genesis);

        for (i, pair) in chain.windows(2).enumerate() {
            let index = i + 1;
            let (previous, current) = (&pair[0], &pair[1]);

            if let Err(e) = self.validate_block(index, previous, current, &mut scratch) {
                warn!("Chain invalid: {}", e);
                return Err(e);
            }
        }

        info!("Blockchain is valid ({} blocks)", chain.len());
        Ok(())
    }

    fn validate_block(
        &self,
        index: usize,
        previous: &Block,
        current: &Block,
        scratch: &mut LedgerState,
    ) -> Result<(), ValidationError> {
        if current.hash != current.calculate_hash() {
            return Err(ValidationError::HashMismatch(index));
        }

        if previous.hash != current.previous_hash {
            return Err(ValidationError::LinkageBroken(index));
        }

        if !meets_difficulty(&current.hash, self.difficulty) {
            return Err(ValidationError::ProofOfWorkMissing(index));
        }

        if !current.verify_merkle_root(self.merkle_mode) {
            return Err(ValidationError::MerkleRootMismatch(index));
        }

        for tx in &current.transactions {
            Self::replay_transaction(index, tx, scratch)?;
        }

        Ok(())
    }

    fn replay_transaction(
        index: usize,
        tx: &Transaction,
        scratch: &mut LedgerState,
    ) -> Result<(), ValidationError> {
        if !tx.verify_signature() {
            return Err(ValidationError::BadSignature(index, tx.id.clone()));
        }

        let inputs_value = checked_total(
            tx.inputs
                .iter()
                .filter_map(|input| scratch.get(&input.output_id))
                .map(|output| output.value),
        );
        match (inputs_value, tx.outputs_value()) {
            (Some(inputs), Some(outputs)) if inputs == outputs => {}
            _ => return Err(ValidationError::ValueMismatch(index, tx.id.clone())),
        }

        for input in &tx.inputs {
            let recorded = input.resolved.as_ref().map(|o| o.value);
            match scratch.get(&input.output_id) {
                Some(output) if Some(output.value) == recorded => {}
                _ => {
                    return Err(ValidationError::MissingOrAlteredInput(
                        index,
                        tx.id.clone(),
                    ))
                }
            }
            scratch.remove(&input.output_id);
        }

        for (position, output) in tx.outputs.iter().enumerate() {
            if output.id != output_id(&tx.id, position)
                || output.parent_transaction_id != tx.id
                || scratch.contains(&output.id)
            {
                return Err(ValidationError::MisplacedOutput(index, output.id.clone()));
            }
            scratch.insert(output.clone());
        }

        match tx.outputs.get(RECIPIENT_OUTPUT) {
            Some(output) if output.owner == tx.recipient => {}
            _ => return Err(ValidationError::WrongRecipient(index, tx.id.clone())),
        }
        match tx.outputs.get(CHANGE_OUTPUT) {
            Some(output) if output.owner == tx.sender => {}
            _ => return Err(ValidationError::ChangeMisdirected(index, tx.id.clone())),
        }

        Ok(())
    }
}

/// Replay `chain` with the default merkle pairing
pub fn validate_chain(
    chain: &[Block],
    genesis: &Transaction,
    difficulty: usize,
) -> Result<(), ValidationError> {
    ChainValidator::new(difficulty).validate(chain, genesis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{TransactionInput, TransactionOutput, TxIdIssuer};
    use crate::crypto::KeyPair;

    const DIFFICULTY: usize = 1;

    struct Chain {
        blocks: Vec<Block>,
        genesis: Transaction,
        alice: KeyPair,
        bob: KeyPair,
        state: LedgerState,
        issuer: TxIdIssuer,
    }

    impl Chain {
        fn new(amount: u64) -> Self {
            let coinbase = KeyPair::generate();
            let alice = KeyPair::generate();
            let bob = KeyPair::generate();
            let genesis = Transaction::genesis(&coinbase, alice.public_key, amount).unwrap();
            let mut state = LedgerState::from_genesis(&genesis);
            let mut issuer = TxIdIssuer::new();

            let mut block = Block::genesis();
            block
                .add_transaction(genesis.clone(), &mut state, &mut issuer, 1)
                .unwrap();
            block.seal(DIFFICULTY, MerkleMode::Balanced).unwrap();

            Self {
                blocks: vec![block],
                genesis,
                alice,
                bob,
                state,
                issuer,
            }
        }

        /// Append a sealed block holding one transfer that spends every
        /// output `from` owns
        fn transfer(&mut self, from_alice: bool, value: u64) {
            let (from, to) = if from_alice {
                (&self.alice, &self.bob)
            } else {
                (&self.bob, &self.alice)
            };
            let inputs = self
                .state
                .owned_by(&from.public_key)
                .map(|o| TransactionInput::new(&o.id))
                .collect();
            let mut tx = Transaction::new(from.public_key, to.public_key, value, inputs);
            tx.sign(from).unwrap();

            let mut block = Block::new(&self.blocks.last().unwrap().hash);
            block
                .add_transaction(tx, &mut self.state, &mut self.issuer, 1)
                .unwrap();
            block.seal(DIFFICULTY, MerkleMode::Balanced).unwrap();
            self.blocks.push(block);
        }

        fn validate(&self) -> Result<(), ValidationError> {
            validate_chain(&self.blocks, &self.genesis, DIFFICULTY)
        }

        fn reseal(&mut self, index: usize) {
            self.blocks[index]
                .seal(DIFFICULTY, MerkleMode::Balanced)
                .unwrap();
        }
    }

    fn sample_chain() -> Chain {
        let mut chain = Chain::new(100);
        chain.transfer(true, 40);
        chain.transfer(false, 20);
        chain.transfer(true, 10);
        chain
    }

    #[test]
    fn test_valid_chain() {
        let chain = sample_chain();
        assert_eq!(chain.validate(), Ok(()));
        for block in &chain.blocks {
            assert!(block.verify_seal(DIFFICULTY));
        }
    }

    #[test]
    fn test_genesis_only_chain_is_valid() {
        let chain = Chain::new(100);
        assert_eq!(chain.validate(), Ok(()));
    }

    #[test]
    fn test_empty_chain_is_invalid() {
        let chain = Chain::new(100);
        assert_eq!(
            validate_chain(&[], &chain.genesis, DIFFICULTY),
            Err(ValidationError::MissingGenesis)
        );
    }

    #[test]
    fn test_validation_leaves_live_state_alone() {
        let chain = sample_chain();
        let before = chain.state.clone();
        chain.validate().unwrap();
        assert_eq!(chain.state, before);
    }

    #[test]
    fn test_mutated_value_fails_signature() {
        let mut chain = sample_chain();
        chain.blocks[2].transactions[0].value += 1;

        let tx_id = chain.blocks[2].transactions[0].id.clone();
        assert_eq!(
            chain.validate(),
            Err(ValidationError::BadSignature(2, tx_id))
        );
    }

    #[test]
    fn test_tampered_nonce_is_hash_mismatch() {
        let mut chain = sample_chain();
        chain.blocks[2].nonce += 1;
        assert_eq!(chain.validate(), Err(ValidationError::HashMismatch(2)));
    }

    #[test]
    fn test_relinked_block_breaks_linkage_at_that_index() {
        let mut chain = sample_chain();
        chain.blocks[2].previous_hash = "f".repeat(64);
        chain.reseal(2);

        assert_eq!(chain.validate(), Err(ValidationError::LinkageBroken(2)));
    }

    #[test]
    fn test_relinked_block_without_reseal_is_hash_mismatch() {
        let mut chain = sample_chain();
        chain.blocks[2].previous_hash = "f".repeat(64);
        assert_eq!(chain.validate(), Err(ValidationError::HashMismatch(2)));
    }

    #[test]
    fn test_insufficient_work_detected() {
        let chain = sample_chain();
        // Sealed at difficulty 1; demanding far more work must fail at block 1.
        // The block hashes are random, so 16 leading zeros cannot occur in practice.
        assert_eq!(
            validate_chain(&chain.blocks, &chain.genesis, 16),
            Err(ValidationError::ProofOfWorkMissing(1))
        );
    }

    #[test]
    fn test_injected_transaction_breaks_merkle_root() {
        let mut chain = sample_chain();
        let tx = chain.blocks[1].transactions[0].clone();
        chain.blocks[1].transactions.push(tx);

        assert_eq!(
            chain.validate(),
            Err(ValidationError::MerkleRootMismatch(1))
        );
    }

    #[test]
    fn test_inflated_output_is_value_mismatch() {
        let mut chain = sample_chain();
        chain.blocks[1].transactions[0].outputs[CHANGE_OUTPUT].value += 5;

        let tx_id = chain.blocks[1].transactions[0].id.clone();
        assert_eq!(
            chain.validate(),
            Err(ValidationError::ValueMismatch(1, tx_id))
        );
    }

    #[test]
    fn test_overflowing_outputs_are_value_mismatch() {
        let mut chain = sample_chain();
        let tx = &mut chain.blocks[1].transactions[0];
        tx.outputs[RECIPIENT_OUTPUT].value = u64::MAX;
        tx.outputs[CHANGE_OUTPUT].value = 101;

        let tx_id = chain.blocks[1].transactions[0].id.clone();
        assert_eq!(
            chain.validate(),
            Err(ValidationError::ValueMismatch(1, tx_id))
        );
    }

    #[test]
    fn test_output_relabelled_onto_unspent_id_detected() {
        let mut chain = sample_chain();
        // block 1's change still belongs to alice when block 2 is replayed
        let alice_change = chain.blocks[1].transactions[0].outputs[CHANGE_OUTPUT]
            .id
            .clone();
        chain.blocks[2].transactions[0].outputs[CHANGE_OUTPUT].id = alice_change.clone();

        assert_eq!(
            chain.validate(),
            Err(ValidationError::MisplacedOutput(2, alice_change))
        );
    }

    #[test]
    fn test_output_with_foreign_id_detected() {
        let mut chain = sample_chain();
        chain.blocks[1].transactions[0].outputs[RECIPIENT_OUTPUT].id = "elsewhere:0".to_string();

        assert_eq!(
            chain.validate(),
            Err(ValidationError::MisplacedOutput(1, "elsewhere:0".to_string()))
        );
    }

    #[test]
    fn test_altered_recorded_input_detected() {
        let mut chain = sample_chain();
        let tx = &mut chain.blocks[1].transactions[0];
        if let Some(resolved) = tx.inputs[0].resolved.as_mut() {
            resolved.value = 1;
        }

        let tx_id = chain.blocks[1].transactions[0].id.clone();
        assert_eq!(
            chain.validate(),
            Err(ValidationError::MissingOrAlteredInput(1, tx_id))
        );
    }

    #[test]
    fn test_unresolved_input_fails_replay() {
        // Processing tolerates an input it cannot find; replay does not.
        let mut chain = Chain::new(100);
        let inputs = vec![TransactionInput::new("0:0"), TransactionInput::new("nowhere:0")];
        let mut tx = Transaction::new(chain.alice.public_key, chain.bob.public_key, 40, inputs);
        tx.sign(&chain.alice).unwrap();

        let mut block = Block::new(&chain.blocks[0].hash);
        block
            .add_transaction(tx, &mut chain.state, &mut chain.issuer, 1)
            .unwrap();
        block.seal(DIFFICULTY, MerkleMode::Balanced).unwrap();
        let tx_id = block.transactions[0].id.clone();
        chain.blocks.push(block);

        assert_eq!(
            chain.validate(),
            Err(ValidationError::MissingOrAlteredInput(1, tx_id))
        );
    }

    #[test]
    fn test_redirected_payment_detected() {
        let mut chain = sample_chain();
        let stranger = KeyPair::generate().public_key;
        chain.blocks[1].transactions[0].outputs[RECIPIENT_OUTPUT].owner = stranger;

        let tx_id = chain.blocks[1].transactions[0].id.clone();
        assert_eq!(
            chain.validate(),
            Err(ValidationError::WrongRecipient(1, tx_id))
        );
    }

    #[test]
    fn test_misdirected_change_detected() {
        let mut chain = sample_chain();
        let stranger = KeyPair::generate().public_key;
        chain.blocks[1].transactions[0].outputs[CHANGE_OUTPUT].owner = stranger;

        let tx_id = chain.blocks[1].transactions[0].id.clone();
        assert_eq!(
            chain.validate(),
            Err(ValidationError::ChangeMisdirected(1, tx_id))
        );
    }

    #[test]
    fn test_missing_change_output_detected() {
        let mut chain = sample_chain();
        let tx = &mut chain.blocks[1].transactions[0];
        let change = tx.outputs.pop().unwrap();
        // keep the totals balanced so only the shape is wrong
        let mut payment: TransactionOutput = tx.outputs[RECIPIENT_OUTPUT].clone();
        payment.value += change.value;
        tx.outputs[RECIPIENT_OUTPUT] = payment;

        let tx_id = chain.blocks[1].transactions[0].id.clone();
        assert_eq!(
            chain.validate(),
            Err(ValidationError::ChangeMisdirected(1, tx_id))
        );
    }
}
