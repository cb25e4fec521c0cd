//! Mining engine for the ledger
//!
//! Seals blocks either with the single-threaded search in [`Block`] or by
//! splitting the nonce space across a rayon worker pool.

use crate::core::{Block, BlockError};
use crate::crypto::{meets_difficulty, MerkleMode};
use crate::mining::CancelToken;
use log::info;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use thiserror::Error;

/// Mining errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("{0}")]
    Block(#[from] BlockError),
    #[error("Failed to start mining workers: {0}")]
    WorkerPool(String),
}

/// Mining statistics
#[derive(Debug, Clone)]
pub struct MiningStats {
    /// Number of hash attempts across all workers
    pub hash_attempts: u64,
    /// Time taken in milliseconds
    pub time_ms: u128,
    /// Hash rate (hashes per second)
    pub hash_rate: f64,
    /// Winning nonce
    pub nonce: u64,
    pub workers: usize,
}

/// Block sealer
#[derive(Debug, Clone)]
pub struct Miner {
    difficulty: usize,
    merkle_mode: MerkleMode,
    workers: usize,
}

impl Miner {
    /// Create a single-threaded miner
    pub fn new(difficulty: usize, merkle_mode: MerkleMode) -> Self {
        Self {
            difficulty,
            merkle_mode,
            workers: 1,
        }
    }

    /// Search with `workers` threads (at least one)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Seal `block`, stopping early if `cancel` fires.
    ///
    /// Every worker count produces the same nonce: the lowest one whose
    /// hash meets the target.
    pub fn mine(
        &self,
        block: &mut Block,
        cancel: &CancelToken,
    ) -> Result<MiningStats, MiningError> {
        let start = Instant::now();

        info!(
            "Mining block with {} transaction(s) at difficulty {} ({} worker(s))...",
            block.tx_count(),
            self.difficulty,
            self.workers
        );

        let attempts = if self.workers == 1 {
            block.seal_with_cancel(self.difficulty, self.merkle_mode, cancel)?
        } else {
            self.mine_parallel(block, cancel)?
        };

        let elapsed = start.elapsed().as_millis();
        let hash_rate = if elapsed > 0 {
            (attempts as f64) / (elapsed as f64 / 1000.0)
        } else {
            attempts as f64
        };

        info!(
            "Block {} mined in {}ms ({} attempts, {:.2} H/s)",
            &block.hash[..16],
            elapsed,
            attempts,
            hash_rate
        );

        Ok(MiningStats {
            hash_attempts: attempts,
            time_ms: elapsed,
            hash_rate,
            nonce: block.nonce,
            workers: self.workers,
        })
    }

    /// Worker `w` tries nonces `w, w + n, w + 2n, …`. Workers share the
    /// lowest winning nonce seen so far and stop once their next candidate
    /// is above it, so every smaller nonce has been tried when they finish.
    fn mine_parallel(&self, block: &mut Block, cancel: &CancelToken) -> Result<u64, MiningError> {
        block.prepare_seal(self.merkle_mode)?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| MiningError::WorkerPool(e.to_string()))?;

        let best = AtomicU64::new(u64::MAX);
        let step = self.workers as u64;
        let template: &Block = block;

        let attempts: u64 = pool.install(|| {
            (0..step)
                .into_par_iter()
                .map(|worker| self.search_stride(template, worker, step, &best, cancel))
                .sum()
        });

        if cancel.is_cancelled() {
            return Err(BlockError::Cancelled.into());
        }

        // u64::MAX doubles as "not found"
        let nonce = best.into_inner();
        if nonce == u64::MAX {
            return Err(BlockError::NonceSpaceExhausted(self.difficulty).into());
        }

        block.nonce = nonce;
        block.hash = block.calculate_hash();
        Ok(attempts)
    }

    /// Scan `start, start + step, …` below the shared best. Returns the
    /// number of hashes tried.
    fn search_stride(
        &self,
        template: &Block,
        start: u64,
        step: u64,
        best: &AtomicU64,
        cancel: &CancelToken,
    ) -> u64 {
        let mut nonce = start;
        let mut tried = 0u64;

        while nonce < best.load(Ordering::Relaxed) && !cancel.is_cancelled() {
            tried += 1;
            if meets_difficulty(&template.hash_with_nonce(nonce), self.difficulty) {
                best.fetch_min(nonce, Ordering::Relaxed);
                break;
            }
            match nonce.checked_add(step) {
                Some(next) => nonce = next,
                None => break,
            }
        }

        tried
    }
}
