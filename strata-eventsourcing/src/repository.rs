//! Event store repository
//!
//! Maps aggregates to and from the event log: rows are decoded with an
//! [`EventCodec`], grouped per aggregate and replayed; saves append the
//! pending events, publish them and only then clear them.

use crate::aggregate::{Aggregate, AggregateError};
use crate::codec::{CodecError, EventCodec, JsonEventCodec};
use crate::config::StoreConfig;
use crate::projection::ProjectionFilter;
use crate::sql::{SqlEventStorage, SqlExecutor};
use crate::store::{EventFilter, EventRow, EventStorage, StorageError};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use strata_events::{
    ActorId, AggregateId, DeleteAction, DomainEvent, Event, EventBus, EventBusError,
    EventPublisher,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Options for a load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Replay only up to this version (inclusive)
    pub max_version: Option<u64>,

    /// Return soft-deleted aggregates too
    pub include_deleted: bool,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn up_to(mut self, max_version: u64) -> Self {
        self.max_version = Some(max_version);
        self
    }

    pub fn with_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }
}

/// Aggregate repository over an event log
///
/// ```rust,ignore
/// let repository: EventStoreRepository<Account, _> =
///     EventStoreRepository::new(Arc::new(InMemoryEventStorage::new()), Arc::new(EventBus::new()));
///
/// let mut account = Account::open("acc-1", "Ann")?;
/// repository.save(&mut account).await?;
///
/// let loaded = repository.load(&AggregateId::new("acc-1")?).await?;
/// ```
pub struct EventStoreRepository<A, S, P = EventBus, C = JsonEventCodec>
where
    A: Aggregate,
    S: EventStorage,
    P: EventPublisher,
    C: EventCodec<A::Event>,
{
    storage: Arc<S>,
    publisher: Arc<P>,
    codec: C,
    include_deleted: bool,
    _phantom: PhantomData<fn() -> A>,
}

impl<A, S, P, C> EventStoreRepository<A, S, P, C>
where
    A: Aggregate,
    S: EventStorage,
    P: EventPublisher,
    C: EventCodec<A::Event>,
{
    /// Create new repository with the default codec
    pub fn new(storage: Arc<S>, publisher: Arc<P>) -> Self
    where
        C: Default,
    {
        Self::with_codec(storage, publisher, C::default())
    }

    /// Create repository with a custom codec
    pub fn with_codec(storage: Arc<S>, publisher: Arc<P>, codec: C) -> Self {
        Self {
            storage,
            publisher,
            codec,
            include_deleted: false,
            _phantom: PhantomData,
        }
    }

    /// Apply store-wide defaults
    pub fn with_config(mut self, config: &StoreConfig) -> Self {
        self.include_deleted = config.include_deleted;
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn publisher(&self) -> &Arc<P> {
        &self.publisher
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Options used by [`load`](Self::load), [`load_many`](Self::load_many)
    /// and [`load_all`](Self::load_all)
    pub fn default_options(&self) -> LoadOptions {
        LoadOptions::new().with_deleted(self.include_deleted)
    }

    /// Load aggregate by ID; `None` if it has no events or is deleted
    pub async fn load(&self, id: &AggregateId) -> Result<Option<A>, RepositoryError> {
        self.load_with(id, &self.default_options()).await
    }

    pub async fn load_with(
        &self,
        id: &AggregateId,
        options: &LoadOptions,
    ) -> Result<Option<A>, RepositoryError> {
        let mut aggregates = self.load_many_with(std::slice::from_ref(id), options).await?;
        Ok(aggregates.pop())
    }

    /// Load several aggregates; missing and deleted ones are left out
    pub async fn load_many(&self, ids: &[AggregateId]) -> Result<Vec<A>, RepositoryError> {
        self.load_many_with(ids, &self.default_options()).await
    }

    pub async fn load_many_with(
        &self,
        ids: &[AggregateId],
        options: &LoadOptions,
    ) -> Result<Vec<A>, RepositoryError> {
        let filter = self.filter(options).with_ids(ids.iter().map(AggregateId::as_str));
        let rows = self.storage.read(&filter).await?;
        self.rows_to_aggregates(rows, options)
    }

    /// Load every aggregate of this type
    pub async fn load_all(&self) -> Result<Vec<A>, RepositoryError> {
        self.load_all_with(&self.default_options()).await
    }

    pub async fn load_all_with(&self, options: &LoadOptions) -> Result<Vec<A>, RepositoryError> {
        let rows = self.storage.read(&self.filter(options)).await?;
        self.rows_to_aggregates(rows, options)
    }

    /// Save one aggregate
    pub async fn save(&self, aggregate: &mut A) -> Result<(), RepositoryError> {
        self.save_all(std::slice::from_mut(aggregate)).await
    }

    /// Save several aggregates with a single append.
    ///
    /// Pending events are cleared only after the append and every publish
    /// succeed, so a failed save can be retried as is.
    pub async fn save_all(&self, aggregates: &mut [A]) -> Result<(), RepositoryError> {
        let mut rows = Vec::new();
        for aggregate in aggregates.iter() {
            for event in aggregate.changes() {
                rows.push(self.to_row(aggregate.id(), event)?);
            }
        }

        if rows.is_empty() {
            return Ok(());
        }

        self.storage.append(&rows).await?;
        info!(
            aggregate_type = A::aggregate_type(),
            aggregates = aggregates.len(),
            events = rows.len(),
            "Saved events"
        );

        for aggregate in aggregates.iter() {
            for event in aggregate.changes() {
                let event: Arc<dyn Event> = Arc::new(event.clone());
                self.publisher.publish_event(event).await?;
            }
        }

        for aggregate in aggregates.iter_mut() {
            aggregate.clear_changes();
        }

        Ok(())
    }

    /// Rebuild aggregates from raw rows.
    ///
    /// Rows are grouped by aggregate id in first-seen order and each group is
    /// replayed in version order. Rows of other aggregate types are skipped.
    pub fn rows_to_aggregates(
        &self,
        rows: Vec<EventRow>,
        options: &LoadOptions,
    ) -> Result<Vec<A>, RepositoryError> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<DomainEvent<A::Event>>> = HashMap::new();
        let mut seen = HashSet::new();

        for row in rows {
            if row.aggregate_type != A::aggregate_type()
                || options.max_version.is_some_and(|max| row.version > max)
                || !seen.insert(row.event_id)
            {
                continue;
            }

            let event = self.from_row(&row)?;
            groups
                .entry(row.aggregate_id.clone())
                .or_insert_with(|| {
                    order.push(row.aggregate_id.clone());
                    Vec::new()
                })
                .push(event);
        }

        let mut aggregates = Vec::with_capacity(order.len());
        for id in order {
            let events = groups.remove(&id).unwrap_or_default();
            let aggregate_id = AggregateId::new(&id).map_err(AggregateError::from)?;
            let aggregate = A::load_from_changes(aggregate_id, events)?;

            if aggregate.is_deleted() && !options.include_deleted {
                debug!(
                    aggregate_type = A::aggregate_type(),
                    aggregate_id = %id,
                    "Skipping deleted aggregate"
                );
                continue;
            }
            aggregates.push(aggregate);
        }

        Ok(aggregates)
    }

    /// Decode one row into a domain event
    pub fn from_row(&self, row: &EventRow) -> Result<DomainEvent<A::Event>, RepositoryError> {
        let corrupt = |reason: String| RepositoryError::CorruptRow {
            row: RowContext::from(row),
            reason,
        };

        let aggregate_id = AggregateId::new(&row.aggregate_id).map_err(|e| corrupt(e.to_string()))?;
        let actor_id = row
            .actor_id
            .as_deref()
            .map(ActorId::new)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let delete_action: DeleteAction = row
            .delete_action
            .parse()
            .map_err(|e: strata_events::UnknownDeleteAction| corrupt(e.to_string()))?;

        let payload = self
            .codec
            .deserialize(&row.event_type, &row.body)
            .map_err(|source| match source {
                CodecError::EventTypeNotFound { .. } => {
                    RepositoryError::EventTypeNotFound(RowContext::from(row))
                }
                source => RepositoryError::EventDataDeserializationFailed {
                    row: RowContext::from(row),
                    source,
                },
            })?;

        let mut event = DomainEvent::new(payload)
            .with_id(row.event_id)
            .with_aggregate_id(aggregate_id)
            .with_version(row.version)
            .with_occurred_on(row.occurred_on)
            .with_delete_action(delete_action);
        event.actor_id = actor_id;
        Ok(event)
    }

    fn to_row(
        &self,
        aggregate_id: &AggregateId,
        event: &DomainEvent<A::Event>,
    ) -> Result<EventRow, RepositoryError> {
        let encoded = self
            .codec
            .serialize(&event.payload)
            .map_err(|source| RepositoryError::EventSerializationFailed {
                aggregate_type: A::aggregate_type(),
                aggregate_id: aggregate_id.to_string(),
                event_type: event.event_type(),
                source,
            })?;

        Ok(EventRow {
            aggregate_type: A::aggregate_type().to_string(),
            aggregate_id: event
                .aggregate_id
                .as_ref()
                .unwrap_or(aggregate_id)
                .to_string(),
            event_type: encoded.event_type,
            body: encoded.body,
            event_id: event.id.unwrap_or_else(Uuid::new_v4),
            actor_id: event.actor_id.as_ref().map(ToString::to_string),
            occurred_on: event.occurred_on.unwrap_or_else(Utc::now),
            version: event.version(),
            delete_action: event.delete_action.to_string(),
        })
    }

    fn filter(&self, options: &LoadOptions) -> EventFilter {
        let filter = EventFilter::for_type(A::aggregate_type());
        match options.max_version {
            Some(max_version) => filter.up_to(max_version),
            None => filter,
        }
    }
}

impl<A, X, P, C> EventStoreRepository<A, SqlEventStorage<X>, P, C>
where
    A: Aggregate,
    X: SqlExecutor,
    P: EventPublisher,
    C: EventCodec<A::Event>,
{
    /// Load the aggregates whose projection row matches the filter
    pub async fn load_projected(
        &self,
        projection: &ProjectionFilter,
        options: &LoadOptions,
    ) -> Result<Vec<A>, RepositoryError> {
        let rows = self
            .storage
            .read_projected(A::aggregate_type(), projection, options.max_version)
            .await?;
        self.rows_to_aggregates(rows, options)
    }
}

impl<A, S, P, C> Clone for EventStoreRepository<A, S, P, C>
where
    A: Aggregate,
    S: EventStorage,
    P: EventPublisher,
    C: EventCodec<A::Event> + Clone,
{
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            publisher: self.publisher.clone(),
            codec: self.codec.clone(),
            include_deleted: self.include_deleted,
            _phantom: PhantomData,
        }
    }
}

/// Identity of the row a decode failure came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowContext {
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_id: Uuid,
    pub version: u64,
    pub event_type: String,
    pub body: String,
}

impl From<&EventRow> for RowContext {
    fn from(row: &EventRow) -> Self {
        Self {
            aggregate_type: row.aggregate_type.clone(),
            aggregate_id: row.aggregate_id.clone(),
            event_id: row.event_id,
            version: row.version,
            event_type: row.event_type.clone(),
            body: row.body.clone(),
        }
    }
}

impl fmt::Display for RowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in event {} ({} {} v{})",
            self.event_type, self.event_id, self.aggregate_type, self.aggregate_id, self.version
        )
    }
}

/// Repository error
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to publish events: {0}")]
    Publish(#[from] EventBusError),

    #[error("Unknown event type {0}")]
    EventTypeNotFound(RowContext),

    #[error("Cannot deserialize {row}: {source}")]
    EventDataDeserializationFailed { row: RowContext, source: CodecError },

    #[error("Cannot serialize {event_type} for {aggregate_type} {aggregate_id}: {source}")]
    EventSerializationFailed {
        aggregate_type: &'static str,
        aggregate_id: String,
        event_type: &'static str,
        source: CodecError,
    },

    #[error("Corrupt row {row}: {reason}")]
    CorruptRow { row: RowContext, reason: String },
}

impl RepositoryError {
    /// True for optimistic concurrency failures
    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Storage(StorageError::Conflict { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::{Counter, CounterEvent};
    use crate::sql::tests::RecordingExecutor;
    use crate::store::InMemoryEventStorage;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata_events::{
        EventBusBuilder, EventHandler, EventHandlerError, TypedEventHandler,
    };
    use strata_sql::{Condition, TableId};

    type CounterRepository = EventStoreRepository<Counter, InMemoryEventStorage>;

    fn repository() -> CounterRepository {
        EventStoreRepository::new(
            Arc::new(InMemoryEventStorage::new()),
            Arc::new(EventBusBuilder::new().async_handling(false).build()),
        )
    }

    fn id(value: &str) -> AggregateId {
        AggregateId::new(value).unwrap()
    }

    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<(String, u64)>>>,
    }

    #[async_trait]
    impl EventHandler<DomainEvent<CounterEvent>> for Recorder {
        async fn handle(&self, event: &DomainEvent<CounterEvent>) -> Result<(), EventHandlerError> {
            self.seen.lock().unwrap().push((
                event.aggregate_id.as_ref().map(ToString::to_string).unwrap_or_default(),
                event.version(),
            ));
            Ok(())
        }
    }

    /// Publisher that fails a set number of times before succeeding
    #[derive(Default)]
    struct FlakyPublisher {
        failures_left: AtomicUsize,
        published: AtomicUsize,
    }

    #[async_trait]
    impl EventPublisher for FlakyPublisher {
        async fn publish_event(&self, _event: Arc<dyn Event>) -> Result<(), EventBusError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EventBusError::PublishFailed("broker down".to_string()));
            }
            self.published.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let repository = repository();
        let mut counter = Counter::create("c-1");
        counter.increment(2).unwrap();
        counter.increment(3).unwrap();
        counter
            .raise(CounterEvent::Renamed {
                name: "clicks".to_string(),
            })
            .unwrap();

        repository.save(&mut counter).await.unwrap();
        assert!(!counter.has_changes());

        let loaded = repository.load(&id("c-1")).await.unwrap().unwrap();
        assert_eq!(loaded.count, 5);
        assert_eq!(loaded.name, "clicks");
        assert_eq!(loaded.version(), 3);
        assert!(!loaded.has_changes());

        let rows = repository.storage().all_rows();
        assert_eq!(rows[0].event_type, "Incremented");
        assert_eq!(rows[0].body, "{\"by\":2}");
        assert_eq!(rows[0].actor_id.as_deref(), Some(ActorId::SYSTEM));
        assert_eq!(rows[0].delete_action, "None");
    }

    #[tokio::test]
    async fn test_load_missing_aggregate() {
        let repository = repository();
        assert!(repository.load(&id("nope")).await.unwrap().is_none());
        assert!(repository.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_aggregates_are_hidden_by_default() {
        let repository = repository();
        let mut counter = Counter::create("c-1");
        counter.increment(1).unwrap();
        counter.archive().unwrap();
        repository.save(&mut counter).await.unwrap();

        assert!(repository.load(&id("c-1")).await.unwrap().is_none());

        let options = LoadOptions::new().with_deleted(true);
        let deleted = repository.load_with(&id("c-1"), &options).await.unwrap().unwrap();
        assert!(deleted.is_deleted());

        let configured = repository
            .clone()
            .with_config(&StoreConfig::new().include_deleted(true));
        assert!(configured.load(&id("c-1")).await.unwrap().is_some());

        // An earlier version predates the deletion
        let before = repository
            .load_with(&id("c-1"), &LoadOptions::new().up_to(1))
            .await
            .unwrap()
            .unwrap();
        assert!(!before.is_deleted());
        assert_eq!(before.version(), 1);
    }

    #[tokio::test]
    async fn test_undelete_restores_visibility() {
        let repository = repository();
        let mut counter = Counter::create("c-1");
        counter.archive().unwrap();
        counter.restore().unwrap();
        repository.save(&mut counter).await.unwrap();

        assert!(repository.load(&id("c-1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_edit_conflicts() {
        let repository = repository();
        let mut original = Counter::create("c-1");
        original.increment(1).unwrap();
        repository.save(&mut original).await.unwrap();

        let mut first = repository.load(&id("c-1")).await.unwrap().unwrap();
        let mut second = repository.load(&id("c-1")).await.unwrap().unwrap();
        first.increment(10).unwrap();
        second.increment(20).unwrap();

        repository.save(&mut first).await.unwrap();
        let err = repository.save(&mut second).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(second.has_changes());

        let stored = repository.load(&id("c-1")).await.unwrap().unwrap();
        assert_eq!(stored.count, 11);
    }

    #[tokio::test]
    async fn test_noop_save_appends_and_publishes_nothing() {
        let publisher = Arc::new(FlakyPublisher::default());
        let repository: EventStoreRepository<Counter, InMemoryEventStorage, FlakyPublisher> =
            EventStoreRepository::new(Arc::new(InMemoryEventStorage::new()), publisher.clone());

        let mut counter = Counter::create("c-1");
        repository.save(&mut counter).await.unwrap();
        repository.save_all(&mut []).await.unwrap();

        assert!(repository.storage().is_empty());
        assert_eq!(publisher.published.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_pending_events() {
        let publisher = Arc::new(FlakyPublisher {
            failures_left: AtomicUsize::new(1),
            published: AtomicUsize::new(0),
        });
        let repository: EventStoreRepository<Counter, InMemoryEventStorage, FlakyPublisher> =
            EventStoreRepository::new(Arc::new(InMemoryEventStorage::new()), publisher.clone());

        let mut counter = Counter::create("c-1");
        counter.increment(1).unwrap();

        let err = repository.save(&mut counter).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Publish(_)));
        assert!(counter.has_changes());
        assert_eq!(repository.storage().len(), 1);
    }

    #[tokio::test]
    async fn test_save_after_publish_failure_publishes_and_clears() {
        let publisher = Arc::new(FlakyPublisher {
            failures_left: AtomicUsize::new(1),
            published: AtomicUsize::new(0),
        });
        let repository: EventStoreRepository<Counter, InMemoryEventStorage, FlakyPublisher> =
            EventStoreRepository::new(Arc::new(InMemoryEventStorage::new()), publisher.clone());

        let mut counter = Counter::create("c-1");
        counter.increment(1).unwrap();
        counter.increment(2).unwrap();

        assert!(repository.save(&mut counter).await.is_err());
        tokio_test::assert_ok!(repository.save(&mut counter).await);

        assert!(!counter.has_changes());
        assert_eq!(publisher.published.load(Ordering::SeqCst), 2);
        assert_eq!(repository.storage().len(), 2);

        let loaded = repository.load(&id("c-1")).await.unwrap().unwrap();
        assert_eq!(loaded.version(), 2);
    }

    #[tokio::test]
    async fn test_events_are_published_in_order() {
        let bus = Arc::new(EventBusBuilder::new().async_handling(false).build());
        let recorder = Recorder::default();
        bus.subscribe::<DomainEvent<CounterEvent>, _>(TypedEventHandler::new(recorder.clone()));

        let repository: CounterRepository =
            EventStoreRepository::new(Arc::new(InMemoryEventStorage::new()), bus);

        let mut a = Counter::create("a");
        let mut b = Counter::create("b");
        a.increment(1).unwrap();
        a.increment(1).unwrap();
        b.increment(1).unwrap();

        let mut batch = [a, b];
        repository.save_all(&mut batch).await.unwrap();

        assert!(batch.iter().all(|c| !c.has_changes()));
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![
                ("a".to_string(), 1),
                ("a".to_string(), 2),
                ("b".to_string(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_save_all_is_one_append() {
        let repository = repository();
        let mut existing = Counter::create("b");
        existing.increment(1).unwrap();
        repository.save(&mut existing).await.unwrap();

        let mut a = Counter::create("a");
        a.increment(1).unwrap();
        let mut stale_b = Counter::create("b");
        stale_b.increment(1).unwrap();

        let mut batch = [a, stale_b];
        let err = repository.save_all(&mut batch).await.unwrap_err();
        assert!(err.is_conflict());

        // "a" was in the same append, so it was not written either
        assert!(repository.load(&id("a")).await.unwrap().is_none());
        assert!(batch[0].has_changes());
    }

    #[tokio::test]
    async fn test_load_many_and_all_keep_first_seen_order() {
        let repository = repository();
        for name in ["z", "a", "m"] {
            let mut counter = Counter::create(name);
            counter.increment(1).unwrap();
            repository.save(&mut counter).await.unwrap();
        }

        let all: Vec<String> = repository
            .load_all()
            .await
            .unwrap()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(all, vec!["z", "a", "m"]);

        let some = repository.load_many(&[id("m"), id("z"), id("missing")]).await.unwrap();
        assert_eq!(some.len(), 2);
    }

    #[tokio::test]
    async fn test_rows_to_aggregates_sorts_each_group() {
        let repository = repository();
        let mut counter = Counter::create("c-1");
        counter.increment(1).unwrap();
        counter.increment(2).unwrap();
        repository.save(&mut counter).await.unwrap();

        let mut rows = repository.storage().all_rows();
        rows.reverse();
        let mut foreign = rows[0].clone();
        foreign.aggregate_type = "Other".to_string();
        rows.push(foreign);

        let aggregates = repository.rows_to_aggregates(rows, &LoadOptions::new()).unwrap();
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].count, 3);
        assert_eq!(aggregates[0].version(), 2);
    }

    #[tokio::test]
    async fn test_unknown_event_type_reports_the_row() {
        let repository = repository();
        let mut counter = Counter::create("c-1");
        counter.increment(1).unwrap();
        repository.save(&mut counter).await.unwrap();

        let mut rows = repository.storage().all_rows();
        rows[0].event_type = "Exploded".to_string();
        let event_id = rows[0].event_id;

        let err = repository.rows_to_aggregates(rows, &LoadOptions::new()).unwrap_err();
        match err {
            RepositoryError::EventTypeNotFound(row) => {
                assert_eq!(row.event_type, "Exploded");
                assert_eq!(row.event_id, event_id);
                assert_eq!(row.aggregate_id, "c-1");
                assert_eq!(row.body, "{\"by\":1}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_reports_the_row() {
        let repository = repository();
        let mut counter = Counter::create("c-1");
        counter.increment(1).unwrap();
        repository.save(&mut counter).await.unwrap();

        let mut rows = repository.storage().all_rows();
        rows[0].body = "{\"by\":\"lots\"}".to_string();

        let err = repository.rows_to_aggregates(rows, &LoadOptions::new()).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::EventDataDeserializationFailed { ref row, .. } if row.body == "{\"by\":\"lots\"}"
        ));
    }

    #[tokio::test]
    async fn test_corrupt_envelope_columns() {
        let repository = repository();
        let mut counter = Counter::create("c-1");
        counter.increment(1).unwrap();
        repository.save(&mut counter).await.unwrap();

        let mut rows = repository.storage().all_rows();
        rows[0].delete_action = "Explode".to_string();

        let err = repository.rows_to_aggregates(rows, &LoadOptions::new()).unwrap_err();
        assert!(matches!(err, RepositoryError::CorruptRow { .. }));
    }

    #[tokio::test]
    async fn test_load_projected_compiles_the_join() {
        let executor = Arc::new(RecordingExecutor::default());
        let storage = Arc::new(SqlEventStorage::new(executor.clone(), &StoreConfig::new()).unwrap());
        let repository: EventStoreRepository<Counter, SqlEventStorage<RecordingExecutor>> =
            EventStoreRepository::new(storage, Arc::new(EventBus::new()));

        let mut counter = Counter::create("c-1");
        counter.increment(4).unwrap();
        repository.save(&mut counter).await.unwrap();

        // Serve the appended row back, twice, as a join over a projection
        // with duplicate keys would.
        let insert = executor.statements.lock().unwrap()[0].clone();
        let values = insert.values();
        let row = EventRow {
            aggregate_type: values[0].as_text().unwrap().to_string(),
            aggregate_id: values[1].as_text().unwrap().to_string(),
            event_type: values[2].as_text().unwrap().to_string(),
            body: values[3].as_text().unwrap().to_string(),
            event_id: values[4].as_text().unwrap().parse().unwrap(),
            actor_id: values[5].as_text().map(ToString::to_string),
            occurred_on: Utc::now(),
            version: values[7].as_integer().unwrap() as u64,
            delete_action: values[8].as_text().unwrap().to_string(),
        };
        *executor.rows.lock().unwrap() = vec![row.clone(), row];

        let projection = ProjectionFilter::new(TableId::new("CounterProjection").unwrap(), "Id").unwrap();
        let projection = projection
            .clone()
            .and_where(Condition::ge(projection.column("Count").unwrap(), 3));

        let loaded = repository
            .load_projected(&projection, &LoadOptions::new())
            .await
            .unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].count, 4);
        assert_eq!(
            executor.texts().last().unwrap(),
            "SELECT Events.*\n\
             FROM Events\n\
             INNER JOIN CounterProjection ON Events.AggregateId = CounterProjection.Id\n\
             WHERE Events.AggregateType = @p0 AND CounterProjection.Count >= @p1\n\
             ORDER BY Events.AggregateId ASC, Events.Version ASC"
        );
    }
}
