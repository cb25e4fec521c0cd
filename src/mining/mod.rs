//! Mining module: cancellable, optionally multi-threaded block sealing

pub mod cancel;
pub mod miner;

pub use cancel::CancelToken;
pub use miner::{Miner, MiningError, MiningStats};
