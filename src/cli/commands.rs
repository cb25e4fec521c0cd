//! CLI commands for the ledger
//!
//! Implements the command handlers behind the `ledger` binary.

use crate::core::{Blockchain, LedgerConfig, Transaction};
use crate::storage::Storage;
use crate::wallet::{Wallet, WalletError};
use log::warn;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn print_balances(chain: &Blockchain, wallets: &mut [&mut Wallet]) {
    for wallet in wallets.iter_mut() {
        println!(
            "   ├─ {} balance: {}",
            wallet.display_name(),
            wallet.balance(chain.state())
        );
    }
}

/// Try a transfer in a fresh block on the tip. Returns whether a block
/// was added.
fn transfer(
    chain: &mut Blockchain,
    from: &mut Wallet,
    to: &Wallet,
    value: u64,
) -> CliResult<bool> {
    println!(
        "\n💸 {} is attempting to send {} to {}...",
        from.display_name(),
        value,
        to.display_name()
    );

    let tx = match from.build_and_sign_transfer(&to.public_key(), value, chain.state()) {
        Ok(tx) => tx,
        Err(WalletError::InsufficientFunds { have, need }) => {
            println!(
                "   ❌ Not enough funds (have {}, need {}). Transfer discarded.",
                have, need
            );
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    let mut block = chain.next_block();
    if let Err(e) = chain.add_transaction(&mut block, tx) {
        println!("   ❌ Transaction rejected: {}", e);
        return Ok(false);
    }

    let stats = chain.add_block(block)?;
    println!(
        "   ⛏️  Block #{} mined: {} ({} attempts, {}ms)",
        chain.height(),
        &chain.latest_block().hash,
        stats.hash_attempts,
        stats.time_ms
    );
    Ok(true)
}

/// Run the demonstration: genesis grants 100 to wallet A, A pays B 40,
/// A tries to pay B 1000, B pays A 20, then the chain is validated and
/// saved.
pub fn cmd_demo(storage: &Storage, config: LedgerConfig) -> CliResult<()> {
    let coinbase = Wallet::with_label("coinbase");
    let mut wallet_a = Wallet::with_label("walletA");
    let mut wallet_b = Wallet::with_label("walletB");

    println!("🔑 Wallets");
    println!("   ├─ walletA: {}", wallet_a.address());
    println!("   └─ walletB: {}", wallet_b.address());

    println!(
        "\n🆕 Creating genesis (difficulty {}, {:?} merkle, {} worker(s))...",
        config.difficulty, config.merkle_mode, config.mining_workers
    );
    let genesis = Transaction::genesis(coinbase.key_pair(), wallet_a.public_key(), 100)?;
    let mut chain = Blockchain::new(genesis, config)?;
    println!("   ⛏️  Genesis block: {}", chain.latest_block().hash);
    print_balances(&chain, &mut [&mut wallet_a]);

    transfer(&mut chain, &mut wallet_a, &wallet_b, 40)?;
    print_balances(&chain, &mut [&mut wallet_a, &mut wallet_b]);

    transfer(&mut chain, &mut wallet_a, &wallet_b, 1000)?;
    print_balances(&chain, &mut [&mut wallet_a, &mut wallet_b]);

    transfer(&mut chain, &mut wallet_b, &wallet_a, 20)?;
    print_balances(&chain, &mut [&mut wallet_a, &mut wallet_b]);

    println!("\n🔍 Validating chain...");
    match chain.validate() {
        Ok(()) => println!("✅ Chain is valid ({} blocks)", chain.blocks().len()),
        Err(e) => println!("❌ Chain is invalid: {}", e),
    }

    storage.save(&chain)?;
    println!("💾 Chain saved to {}", storage.chain_path().display());

    Ok(())
}

/// Replay a saved chain from genesis
pub fn cmd_validate(storage: &Storage) -> CliResult<()> {
    let chain = storage.load()?;
    println!("🔍 Validating {} blocks...", chain.blocks().len());

    match chain.validate() {
        Ok(()) => {
            println!("✅ Chain is valid!");
            Ok(())
        }
        Err(e) => {
            warn!("Validation failed: {}", e);
            println!("❌ Chain validation FAILED: {}", e);
            Err(e.into())
        }
    }
}

/// Print chain statistics and the most recent `count` blocks
pub fn cmd_info(storage: &Storage, count: usize) -> CliResult<()> {
    let chain = storage.load()?;
    let stats = chain.stats();
    let storage_stats = storage.stats()?;

    println!("⛓️  Chain Info");
    println!("   ├─ Height: {}", stats.height);
    println!("   ├─ Total blocks: {}", stats.total_blocks);
    println!("   ├─ Total transactions: {}", stats.total_transactions);
    println!("   ├─ Unspent outputs: {}", stats.unspent_outputs);
    println!("   ├─ Total value: {}", stats.total_value);
    println!("   ├─ Difficulty: {}", stats.difficulty);
    println!("   ├─ Merkle mode: {:?}", chain.config.merkle_mode);
    println!(
        "   ├─ File size: {} bytes ({} backups)",
        storage_stats.file_size, storage_stats.backup_count
    );
    println!("   └─ Latest hash: {}", stats.latest_hash);

    let start = (stats.height + 1).saturating_sub(count);

    println!("\n🧱 Recent blocks:");
    for i in (start..=stats.height).rev() {
        if let Some(block) = chain.get_block(i) {
            println!(
                "   #{} | {} | nonce {} | {} tx | {}",
                i,
                &block.hash[..16],
                block.nonce,
                block.tx_count(),
                block.timestamp.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    Ok(())
}
