//! History persistence layer
//!
//! Provides durable storage for the experience store's history with:
//! - JSON-lines format for append-only writes
//! - An fsync after every append, so a returned append is durable
//! - Rollback of torn writes on failure
//! - An in-memory backend for tests and ephemeral runs

use boxcheck_core::{Error, Record, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage for the ordered record history
pub trait HistoryBackend: Send + Sync {
    /// Read back every persisted record in insertion order
    fn load(&mut self) -> Result<Vec<Record>>;

    /// Durably append one record. Must not return `Ok` before the write is durable.
    fn append(&mut self, record: &Record) -> Result<()>;

    /// Remove every persisted record
    fn clear(&mut self) -> Result<()>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Configuration for on-disk history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding the history file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// History file name inside `data_dir`
    #[serde(default = "default_history_file")]
    pub history_file: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            history_file: default_history_file(),
        }
    }
}

impl PersistenceConfig {
    /// Config rooted at `dir` with the default file name
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            ..Default::default()
        }
    }

    /// Full path of the history file
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(&self.history_file)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_history_file() -> String {
    "history.jsonl".to_string()
}

/// JSON-lines history file
pub struct JsonlBackend {
    path: PathBuf,
    file: File,
}

impl JsonlBackend {
    /// Open (or create) the history file
    pub fn open(config: &PersistenceConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let path = config.history_path();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        info!("Opened history file: {:?}", path);
        Ok(Self { path, file })
    }

    /// Path of the history file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line)?;
        self.file.flush()?;
        self.file.sync_data()
    }
}

impl HistoryBackend for JsonlBackend {
    fn load(&mut self) -> Result<Vec<Record>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut content = Vec::new();
        self.file.read_to_end(&mut content)?;

        let mut records = Vec::new();
        let mut torn_at = None;
        let mut offset = 0;

        while offset < content.len() {
            let end = content[offset..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(content.len(), |pos| offset + pos);
            let line = &content[offset..end];
            let is_last = end + 1 >= content.len();

            if !line.iter().all(|b| b.is_ascii_whitespace()) {
                match serde_json::from_slice::<Record>(line) {
                    Ok(record) => records.push(record),
                    Err(e) if is_last => {
                        // Torn final write from a crash; the append never reported success.
                        warn!("Dropping unreadable last history line: {}", e);
                        torn_at = Some(offset);
                    }
                    Err(e) => {
                        return Err(Error::Serialization(e));
                    }
                }
            }

            offset = end + 1;
        }

        // The next append must start on a fresh line
        if let Some(offset) = torn_at {
            self.file.set_len(offset as u64)?;
            self.file.sync_data()?;
            info!("Truncated history file {:?} to {} bytes", self.path, offset);
        } else if content.last().is_some_and(|&b| b != b'\n') {
            self.write_line(b"\n")?;
        }

        debug!("Loaded {} records from {:?}", records.len(), self.path);
        Ok(records)
    }

    fn append(&mut self, record: &Record) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let previous_len = self.file.metadata()?.len();
        if let Err(e) = self.write_line(&line) {
            if let Err(rollback) = self.file.set_len(previous_len) {
                warn!("Failed to roll back partial history write: {}", rollback);
            }
            return Err(Error::Storage(e));
        }

        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        info!("Cleared history file: {:?}", self.path);
        Ok(())
    }

    fn name(&self) -> &str {
        "jsonl"
    }
}

/// In-process history, optionally failing writes on demand
#[derive(Default)]
pub struct MemoryBackend {
    records: Vec<Record>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that already holds `records`
    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records,
            fail_writes: Arc::default(),
        }
    }

    /// Switch that makes `append` and `clear` fail while set
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_writes)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage(std::io::Error::other(
                "simulated storage failure",
            )));
        }
        Ok(())
    }
}

impl HistoryBackend for MemoryBackend {
    fn load(&mut self) -> Result<Vec<Record>> {
        Ok(self.records.clone())
    }

    fn append(&mut self, record: &Record) -> Result<()> {
        self.check_writable()?;
        self.records.push(record.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.check_writable()?;
        self.records.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
