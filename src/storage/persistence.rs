//! Ledger persistence layer
//!
//! Saves the chain (blocks, genesis transaction, config and id issuer) as
//! JSON and restores it, rebuilding the live UTXO set by replay.

use crate::core::Blockchain;
use log::{debug, info};
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub chain_file: String,
    pub backup_enabled: bool,
    /// Zero disables backups
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ledger_data"),
            chain_file: "chain.json".to_string(),
            backup_enabled: true,
            max_backups: 5,
        }
    }
}

/// Chain file manager
pub struct Storage {
    config: StorageConfig,
}

impl Storage {
    /// Create a storage manager, creating the data directory if needed
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    /// Storage rooted at `data_dir` with the default file name
    pub fn in_dir(data_dir: &Path) -> Result<Self, StorageError> {
        Self::new(StorageConfig {
            data_dir: data_dir.to_path_buf(),
            ..StorageConfig::default()
        })
    }

    pub fn chain_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.chain_file)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.backup.{}", self.config.chain_file, index))
    }

    fn backups_enabled(&self) -> bool {
        self.config.backup_enabled && self.config.max_backups > 0
    }

    /// Write the chain to disk, keeping the previous file as a backup
    pub fn save(&self, blockchain: &Blockchain) -> Result<(), StorageError> {
        let path = self.chain_path();

        if self.backups_enabled() && path.exists() {
            self.rotate_backups()?;
            fs::copy(&path, self.backup_path(0))?;
        }

        // Write to a temporary file, then rename over the target only once
        // every byte has reached the disk
        let temp_path = path.with_extension("tmp");
        if let Err(e) = write_chain(&temp_path, blockchain) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        fs::rename(&temp_path, &path)?;

        info!(
            "Saved chain of {} block(s) to {}",
            blockchain.blocks().len(),
            path.display()
        );
        Ok(())
    }

    /// Read the chain back and rebuild its live UTXO set
    pub fn load(&self) -> Result<Blockchain, StorageError> {
        let path = self.chain_path();

        if !path.exists() {
            return Err(StorageError::InvalidData(format!(
                "Chain file not found: {}",
                path.display()
            )));
        }

        let blockchain = load_from_file(&path)?;
        info!(
            "Loaded chain of {} block(s) from {}",
            blockchain.blocks().len(),
            path.display()
        );
        Ok(blockchain)
    }

    /// Check if a saved chain exists
    pub fn exists(&self) -> bool {
        self.chain_path().exists()
    }

    /// Delete the saved chain; backups are kept
    pub fn delete(&self) -> Result<(), StorageError> {
        let path = self.chain_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Shift `backup.i` to `backup.i+1`, dropping the oldest
    fn rotate_backups(&self) -> Result<(), StorageError> {
        let last = self.config.max_backups - 1;

        let oldest = self.backup_path(last);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        for i in (0..last).rev() {
            let current = self.backup_path(i);
            if current.exists() {
                fs::rename(&current, self.backup_path(i + 1))?;
            }
        }

        debug!("Rotated chain backups");
        Ok(())
    }

    /// Load a backup; 0 is the most recent
    pub fn restore_backup(&self, backup_index: usize) -> Result<Blockchain, StorageError> {
        let backup_path = self.backup_path(backup_index);

        if !backup_path.exists() {
            return Err(StorageError::InvalidData(format!(
                "Backup {} not found",
                backup_index
            )));
        }

        load_from_file(&backup_path)
    }

    /// Indices of the backups present on disk
    pub fn list_backups(&self) -> Vec<usize> {
        (0..self.config.max_backups)
            .filter(|i| self.backup_path(*i).exists())
            .collect()
    }

    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        let path = self.chain_path();

        let file_size = if path.exists() {
            fs::metadata(&path)?.len()
        } else {
            0
        };

        Ok(StorageStats {
            file_size,
            backup_count: self.list_backups().len(),
            data_dir: self.config.data_dir.clone(),
        })
    }
}

/// Storage statistics
#[derive(Debug)]
pub struct StorageStats {
    pub file_size: u64,
    pub backup_count: usize,
    pub data_dir: PathBuf,
}

/// Serialize `blockchain` to `path`, then flush and fsync it. Any write
/// error is returned rather than lost when the buffer is dropped.
fn write_chain(path: &Path, blockchain: &Blockchain) -> Result<(), StorageError> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, blockchain)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Save a chain to a specific file path
pub fn save_to_file(blockchain: &Blockchain, path: &Path) -> Result<(), StorageError> {
    write_chain(path, blockchain)
}

/// Load a chain from a specific file path.
///
/// The live UTXO set is rebuilt by replay. A file without a genesis block
/// fails to deserialize.
pub fn load_from_file(path: &Path) -> Result<Blockchain, StorageError> {
    let reader = BufReader::new(fs::File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
