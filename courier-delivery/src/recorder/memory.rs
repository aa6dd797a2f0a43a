use std::{
    collections::VecDeque,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;

use super::{DEFAULT_CAPACITY, DeliveryRecorder};
use crate::{error::RecorderError, types::DeliveryRecord};

/// In-memory recorder.
///
/// Records live in a `VecDeque` behind an `RwLock`; clones share the same
/// history. A poisoned lock is recovered rather than propagated, since a
/// record is never left half-written.
#[derive(Debug, Clone)]
pub struct MemoryRecorder {
    records: Arc<RwLock<VecDeque<DeliveryRecord>>>,
    capacity: usize,
}

impl MemoryRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryRecorder for MemoryRecorder {
    async fn append(&self, record: DeliveryRecord) -> Result<(), RecorderError> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
        drop(records);
        Ok(())
    }

    async fn records(&self) -> Result<Vec<DeliveryRecord>, RecorderError> {
        Ok(self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
