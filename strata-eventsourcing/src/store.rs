//! Event storage
//!
//! The event log is a single append-only table of [`EventRow`]s. Storage
//! backends only move rows; turning rows into aggregates is the
//! repository's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use strata_sql::SqlError;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// One persisted event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRow {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    /// Serialized payload
    pub body: String,
    pub event_id: Uuid,
    pub actor_id: Option<String>,
    pub occurred_on: DateTime<Utc>,
    pub version: u64,
    pub delete_action: String,
}

/// Which rows to read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub aggregate_type: String,
    /// `None` reads every aggregate of the type
    pub aggregate_ids: Option<Vec<String>>,
    /// Inclusive upper bound on versions
    pub max_version: Option<u64>,
}

impl EventFilter {
    /// All events of one aggregate type
    pub fn for_type(aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            aggregate_ids: None,
            max_version: None,
        }
    }

    /// Restrict to the given aggregates
    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aggregate_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn up_to(mut self, max_version: u64) -> Self {
        self.max_version = Some(max_version);
        self
    }

    /// True when an id list was given but is empty, so nothing can match
    pub fn is_empty_selection(&self) -> bool {
        self.aggregate_ids.as_ref().is_some_and(Vec::is_empty)
    }

    pub fn matches(&self, row: &EventRow) -> bool {
        row.aggregate_type == self.aggregate_type
            && self
                .aggregate_ids
                .as_ref()
                .is_none_or(|ids| ids.iter().any(|id| *id == row.aggregate_id))
            && self.max_version.is_none_or(|max| row.version <= max)
    }
}

/// Event storage trait
///
/// Implement this trait to persist the event log in a custom backend.
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Append rows atomically.
    ///
    /// A row whose `(aggregate_type, aggregate_id, version)` already exists
    /// must fail the whole call with [`StorageError::Conflict`], unless the
    /// stored row has the same event id: that row was written by an earlier
    /// attempt of the same save and is skipped, so retrying a save whose
    /// publish failed succeeds.
    async fn append(&self, rows: &[EventRow]) -> Result<(), StorageError>;

    /// Read matching rows, ascending by version within each aggregate
    async fn read(&self, filter: &EventFilter) -> Result<Vec<EventRow>, StorageError>;
}

type StreamKey = (String, String);

/// In-memory event storage (for testing/development)
#[derive(Clone)]
pub struct InMemoryEventStorage {
    /// Rows per `(aggregate type, aggregate id)`, tagged with their append sequence
    streams: Arc<DashMap<StreamKey, Vec<(u64, EventRow)>>>,

    /// Where each stored event id lives
    event_ids: Arc<DashMap<Uuid, (StreamKey, u64)>>,

    sequence: Arc<AtomicU64>,

    /// Serializes appends so the conflict check and the insert are one step
    append_lock: Arc<Mutex<()>>,
}

impl InMemoryEventStorage {
    /// Create new in-memory storage
    pub fn new() -> Self {
        Self {
            streams: Arc::new(DashMap::new()),
            event_ids: Arc::new(DashMap::new()),
            sequence: Arc::new(AtomicU64::new(0)),
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Get all rows in append order (for testing)
    pub fn all_rows(&self) -> Vec<EventRow> {
        let mut rows: Vec<(u64, EventRow)> = self
            .streams
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|(sequence, _)| *sequence);
        rows.into_iter().map(|(_, row)| row).collect()
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.event_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.event_ids.is_empty()
    }

    /// Clear all data
    pub fn clear(&self) {
        self.streams.clear();
        self.event_ids.clear();
    }

    /// Rows of the batch that still have to be stored.
    ///
    /// A row whose event id is already stored at the same aggregate and
    /// version was appended by an earlier attempt and is skipped.
    fn unstored<'a>(&self, rows: &'a [EventRow]) -> Result<Vec<&'a EventRow>, StorageError> {
        let mut batch_versions = HashSet::new();
        let mut batch_ids = HashSet::new();
        let mut pending = Vec::with_capacity(rows.len());

        for row in rows {
            if !batch_ids.insert(row.event_id) {
                return Err(StorageError::DuplicateEvent {
                    event_id: row.event_id,
                });
            }

            let key = (row.aggregate_type.clone(), row.aggregate_id.clone());

            if let Some(slot) = self.event_ids.get(&row.event_id) {
                if *slot == (key, row.version) {
                    continue;
                }
                return Err(StorageError::DuplicateEvent {
                    event_id: row.event_id,
                });
            }

            let stored = self
                .streams
                .get(&key)
                .is_some_and(|stream| stream.iter().any(|(_, r)| r.version == row.version));

            if stored || !batch_versions.insert((key, row.version)) {
                return Err(StorageError::Conflict {
                    aggregate_type: row.aggregate_type.clone(),
                    aggregate_id: row.aggregate_id.clone(),
                    version: row.version,
                });
            }

            pending.push(row);
        }

        Ok(pending)
    }
}

impl Default for InMemoryEventStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStorage for InMemoryEventStorage {
    async fn append(&self, rows: &[EventRow]) -> Result<(), StorageError> {
        let _guard = self.append_lock.lock().await;

        let pending = self.unstored(rows)?;
        if pending.len() < rows.len() {
            debug!(
                rows = rows.len(),
                already_stored = rows.len() - pending.len(),
                "Skipping events stored by an earlier append"
            );
        }

        for row in pending {
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
            self.event_ids.insert(
                row.event_id,
                ((row.aggregate_type.clone(), row.aggregate_id.clone()), row.version),
            );
            self.streams
                .entry((row.aggregate_type.clone(), row.aggregate_id.clone()))
                .or_default()
                .push((sequence, row.clone()));
        }

        Ok(())
    }

    async fn read(&self, filter: &EventFilter) -> Result<Vec<EventRow>, StorageError> {
        if filter.is_empty_selection() {
            return Ok(Vec::new());
        }

        let mut rows: Vec<(u64, EventRow)> = self
            .streams
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|(_, row)| filter.matches(row))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();

        rows.sort_by_key(|(sequence, _)| *sequence);
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }
}

/// Storage error
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Version conflict: {aggregate_type} {aggregate_id} already has version {version}")]
    Conflict {
        aggregate_type: String,
        aggregate_id: String,
        version: u64,
    },

    #[error("Duplicate event id: {event_id}")]
    DuplicateEvent { event_id: Uuid },

    #[error("Invalid event row: {0}")]
    InvalidRow(String),

    #[error("SQL error: {0}")]
    Sql(#[from] SqlError),

    #[error("Storage backend error: {0}")]
    Backend(String),
}
