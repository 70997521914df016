//! Deterministic port implementations for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use core_kernel::{
    BillingEvent, Clock, Document, DocumentStore, IdGenerator, NotificationDispatcher,
    NotifyError, Query, StoreError, WriteBatch,
};

/// Clock pinned to a configurable instant.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Midday UTC on 2025-06-15
    pub fn default_instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    /// Moves the clock forward
    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + duration;
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(Self::default_instant())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Id generator yielding fresh random ids while remembering what it handed
/// out, so tests can assert on pre-allocated ids.
#[derive(Default)]
pub struct RecordingIdGenerator {
    issued: Mutex<Vec<Uuid>>,
}

impl RecordingIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issued(&self) -> Vec<Uuid> {
        self.issued.lock().unwrap().clone()
    }
}

impl IdGenerator for RecordingIdGenerator {
    fn next_uuid(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.issued.lock().unwrap().push(id);
        id
    }
}

/// Dispatcher that records every event for later assertions.
#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<BillingEvent>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BillingEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: BillingEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Dispatcher that fails every dispatch, for verifying that notification
/// failures never roll back billing state.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingDispatcher;

#[async_trait]
impl NotificationDispatcher for FailingDispatcher {
    async fn dispatch(&self, _event: BillingEvent) -> Result<(), NotifyError> {
        Err(NotifyError("dispatcher offline".to_string()))
    }
}

/// Store wrapper whose batch commits always fail, for exercising the abort
/// path of multi-document writes. All other operations delegate to the
/// wrapped store.
pub struct CommitFailingStore {
    inner: Arc<dyn DocumentStore>,
}

impl CommitFailingStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DocumentStore for CommitFailingStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.inner.query(collection, query).await
    }

    async fn add(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        self.inner.add(collection, data).await
    }

    async fn set(&self, collection: &str, id: &str, data: Document) -> Result<(), StoreError> {
        self.inner.set(collection, id, data).await
    }

    async fn set_checked(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        expected_revision: u64,
    ) -> Result<bool, StoreError> {
        self.inner
            .set_checked(collection, id, data, expected_revision)
            .await
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<(), StoreError> {
        self.inner.update(collection, id, patch).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn commit(&self, _batch: WriteBatch) -> Result<(), StoreError> {
        Err(StoreError::Backend("batch commit failed".to_string()))
    }
}
