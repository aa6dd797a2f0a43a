//! Bounded delivery history.
//!
//! Every completed `send_report` appends one [`DeliveryRecord`]. The log keeps
//! the most recent `capacity` entries and evicts the oldest first.
//!
//! Recording is best-effort: the orchestrator logs a [`RecorderError`] and
//! returns the delivery outcome unchanged.
//!
//! # Configuration
//!
//! File-backed history in RON config:
//! ```ron
//! recorder: File(
//!     path: "/var/lib/courier/delivery_records.json",
//!     capacity: 50,
//! ),
//! ```
//!
//! In-memory history (tests, one-shot runs):
//! ```ron
//! recorder: Memory(capacity: 50),
//! ```

mod file;
mod memory;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use file::FileRecorder;
pub use memory::MemoryRecorder;

use crate::{error::RecorderError, types::DeliveryRecord};

/// Default number of retained records.
pub const DEFAULT_CAPACITY: usize = 50;

/// Append-only, bounded store of delivery records.
///
/// Implementations serialize appends so concurrent deliveries never
/// interleave or lose records.
#[async_trait]
pub trait DeliveryRecorder: Send + Sync + std::fmt::Debug {
    /// Append a record, evicting the oldest ones beyond [`capacity`](Self::capacity).
    ///
    /// # Errors
    ///
    /// If the record cannot be persisted.
    async fn append(&self, record: DeliveryRecord) -> Result<(), RecorderError>;

    /// The retained records, oldest first.
    ///
    /// # Errors
    ///
    /// If the store cannot be read.
    async fn records(&self) -> Result<Vec<DeliveryRecord>, RecorderError>;

    /// Maximum number of retained records.
    fn capacity(&self) -> usize;
}

/// Runtime selection of the recorder backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecorderConfig {
    /// JSON file on disk
    File {
        #[serde(default = "default_path")]
        path: PathBuf,
        #[serde(default = "default_capacity")]
        capacity: usize,
    },
    /// Process memory only
    Memory {
        #[serde(default = "default_capacity")]
        capacity: usize,
    },
}

fn default_path() -> PathBuf {
    PathBuf::from("./delivery_records.json")
}

const fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self::File {
            path: default_path(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl RecorderConfig {
    /// Build the configured recorder. A capacity of zero is raised to one.
    #[must_use]
    pub fn build(self) -> Arc<dyn DeliveryRecorder> {
        match self {
            Self::File { path, capacity } => Arc::new(FileRecorder::new(path, capacity)),
            Self::Memory { capacity } => Arc::new(MemoryRecorder::with_capacity(capacity)),
        }
    }
}
