use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use courier_common::{internal, tracing};
use fd_lock::RwLock;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use super::{DEFAULT_CAPACITY, DeliveryRecorder};
use crate::{error::RecorderError, types::DeliveryRecord};

/// JSON-file recorder.
///
/// The whole history is stored as one pretty-printed JSON array, oldest
/// first. Every read-modify-write holds an exclusive lock on `<name>.lock`,
/// so any number of recorders and processes can share one file. Writes go to
/// a fresh temporary file that is then renamed over the log, so a crash
/// mid-write never leaves a truncated history behind.
///
/// A missing file is an empty history. A file that does not parse is moved
/// aside to `<name>.corrupt` and the history starts over.
#[derive(Debug)]
pub struct FileRecorder {
    file: HistoryFile,
    // Keeps this instance's appends from tying up blocking threads on the
    // file lock.
    lock: Mutex<()>,
}

impl FileRecorder {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            file: HistoryFile {
                path: path.into(),
                capacity: capacity.max(1),
            },
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Runs `f` on a blocking thread with the history file locked.
    async fn with_file<T, F>(&self, f: F) -> Result<T, RecorderError>
    where
        T: Send + 'static,
        F: FnOnce(&HistoryFile) -> Result<T, RecorderError> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let file = self.file.clone();

        tokio::task::spawn_blocking(move || file.locked(f))
            .await
            .map_err(|e| RecorderError::Internal(format!("Recorder task failed: {e}")))?
    }
}

/// The synchronous half: everything here runs on a blocking thread.
#[derive(Debug, Clone)]
struct HistoryFile {
    path: PathBuf,
    capacity: usize,
}

impl HistoryFile {
    fn io_error(&self, source: std::io::Error) -> RecorderError {
        RecorderError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn locked<T>(
        &self,
        f: impl FnOnce(&Self) -> Result<T, RecorderError>,
    ) -> Result<T, RecorderError> {
        fs::create_dir_all(self.directory()).map_err(|e| self.io_error(e))?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.sibling("lock"))
            .map_err(|e| self.io_error(e))?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock.write().map_err(|e| self.io_error(e))?;

        f(self)
    }

    fn load(&self) -> Result<Vec<DeliveryRecord>, RecorderError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        if contents.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice(&contents) {
            Ok(records) => Ok(records),
            Err(e) => {
                let aside = self.sibling("corrupt");
                tracing::warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "Delivery history is unreadable, starting a new one"
                );
                fs::rename(&self.path, &aside).map_err(|e| self.io_error(e))?;
                Ok(Vec::new())
            }
        }
    }

    fn store(&self, records: &[DeliveryRecord]) -> Result<(), RecorderError> {
        let json = serde_json::to_vec_pretty(records)?;

        let mut temp = NamedTempFile::new_in(self.directory()).map_err(|e| self.io_error(e))?;
        temp.write_all(&json).map_err(|e| self.io_error(e))?;
        temp.as_file().sync_all().map_err(|e| self.io_error(e))?;
        temp.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;

        Ok(())
    }

    /// Appends under the lock. Returns how many records were kept and evicted.
    fn append(&self, record: DeliveryRecord) -> Result<(usize, usize), RecorderError> {
        let mut records = self.load()?;
        records.push(record);
        let excess = records.len().saturating_sub(self.capacity);
        records.drain(..excess);

        self.store(&records)?;
        Ok((records.len(), excess))
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

impl Default for FileRecorder {
    fn default() -> Self {
        Self::new("./delivery_records.json", DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl DeliveryRecorder for FileRecorder {
    #[tracing::instrument(level = "debug", skip(self, record), fields(path = %self.file.path.display()))]
    async fn append(&self, record: DeliveryRecord) -> Result<(), RecorderError> {
        let (retained, evicted) = self.with_file(move |file| file.append(record)).await?;

        internal!(level = DEBUG, retained, evicted, "Recorded delivery");

        Ok(())
    }

    async fn records(&self) -> Result<Vec<DeliveryRecord>, RecorderError> {
        self.with_file(HistoryFile::load).await
    }

    fn capacity(&self) -> usize {
        self.file.capacity
    }
}
