//! Integration tests for common Strata workflows.
//!
//! These tests drive aggregates through the repository, the event bus and
//! the SQL storage together.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use strata::prelude::*;
use strata::EventBusError;
use strata::strata_eventsourcing::{EventRow, StorageError};
use strata::strata_sql::{SqlStatement, SqlValue};

// =============================================================================
// Domain
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum UserEvent {
    Registered { name: String, email: String },
    EmailChanged { email: String },
    Closed,
    Reopened,
}

impl EventPayload for UserEvent {
    const EVENT_TYPES: &'static [&'static str] =
        &["Registered", "EmailChanged", "Closed", "Reopened"];

    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Registered { .. } => "Registered",
            UserEvent::EmailChanged { .. } => "EmailChanged",
            UserEvent::Closed => "Closed",
            UserEvent::Reopened => "Reopened",
        }
    }
}

#[derive(Debug, Clone)]
struct User {
    root: AggregateRoot<UserEvent>,
    name: String,
    email: String,
}

strata::impl_aggregate_identity!(User);

impl User {
    fn register(id: &str, name: &str, email: &str, actor: &str) -> Result<Self, AggregateError> {
        let mut user = Self {
            root: AggregateRoot::try_new(Some(id))?,
            name: String::new(),
            email: String::new(),
        };
        user.apply_change(
            DomainEvent::new(UserEvent::Registered {
                name: name.to_string(),
                email: email.to_string(),
            }),
            Some(ActorId::new(actor)?),
            None,
        )?;
        Ok(user)
    }

    fn change_email(&mut self, email: &str) -> Result<(), AggregateError> {
        self.raise(UserEvent::EmailChanged {
            email: email.to_string(),
        })
    }

    fn close(&mut self) -> Result<(), AggregateError> {
        self.apply_change(DomainEvent::new(UserEvent::Closed).deleting(), None, None)
    }

    fn reopen(&mut self) -> Result<(), AggregateError> {
        self.apply_change(DomainEvent::new(UserEvent::Reopened).undeleting(), None, None)
    }
}

impl Aggregate for User {
    type Event = UserEvent;

    fn aggregate_type() -> &'static str {
        "User"
    }

    fn new_instance(id: AggregateId) -> Option<Self> {
        Some(Self {
            root: AggregateRoot::new(id),
            name: String::new(),
            email: String::new(),
        })
    }

    fn root(&self) -> &AggregateRoot<UserEvent> {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateRoot<UserEvent> {
        &mut self.root
    }

    fn handle(&mut self, event: &DomainEvent<UserEvent>) {
        match &event.payload {
            UserEvent::Registered { name, email } => {
                self.name = name.clone();
                self.email = email.clone();
            }
            UserEvent::EmailChanged { email } => self.email = email.clone(),
            UserEvent::Closed | UserEvent::Reopened => {}
        }
    }
}

fn id(value: &str) -> AggregateId {
    AggregateId::new(value).unwrap()
}

fn sync_bus() -> Arc<EventBus> {
    Arc::new(
        strata::EventBusBuilder::new()
            .async_handling(false)
            .build(),
    )
}

// =============================================================================
// Read model fed by the event bus
// =============================================================================

#[derive(Clone, Default)]
struct EmailDirectory {
    emails: Arc<Mutex<HashMap<String, String>>>,
}

#[async_trait]
impl EventHandler<DomainEvent<UserEvent>> for EmailDirectory {
    async fn handle(&self, event: &DomainEvent<UserEvent>) -> Result<(), EventHandlerError> {
        let Some(user) = &event.aggregate_id else {
            return Err(EventHandlerError::ProcessingError(
                "event without aggregate".to_string(),
            ));
        };

        let mut emails = self.emails.lock().unwrap();
        match &event.payload {
            UserEvent::Registered { email, .. } | UserEvent::EmailChanged { email } => {
                emails.insert(user.to_string(), email.clone());
            }
            UserEvent::Closed => {
                emails.remove(user.as_str());
            }
            UserEvent::Reopened => {}
        }
        Ok(())
    }
}

// =============================================================================
// In-memory workflows
// =============================================================================

#[tokio::test]
async fn test_register_change_and_reload() {
    let bus = sync_bus();
    let directory = EmailDirectory::default();
    bus.subscribe::<DomainEvent<UserEvent>, _>(TypedEventHandler::new(directory.clone()));

    let repository: EventStoreRepository<User, InMemoryEventStorage> =
        EventStoreRepository::new(Arc::new(InMemoryEventStorage::new()), bus);

    let mut user = User::register("u-1", "Ann", "ann@old.example", "admin").unwrap();
    user.change_email("ann@new.example").unwrap();
    repository.save(&mut user).await.unwrap();

    let loaded = repository.load(&id("u-1")).await.unwrap().unwrap();
    assert_eq!(loaded, user);
    assert_eq!(loaded.name, "Ann");
    assert_eq!(loaded.email, "ann@new.example");
    assert_eq!(loaded.version(), 2);

    let rows = repository.storage().all_rows();
    assert_eq!(rows[0].actor_id.as_deref(), Some("admin"));
    assert_eq!(rows[1].actor_id.as_deref(), Some(ActorId::SYSTEM));

    assert_eq!(
        directory.emails.lock().unwrap().get("u-1").map(String::as_str),
        Some("ann@new.example")
    );
}

#[tokio::test]
async fn test_soft_delete_lifecycle() {
    let repository: EventStoreRepository<User, InMemoryEventStorage> =
        EventStoreRepository::new(Arc::new(InMemoryEventStorage::new()), sync_bus());

    let mut user = User::register("u-1", "Ann", "ann@example.com", "admin").unwrap();
    user.close().unwrap();
    repository.save(&mut user).await.unwrap();

    assert!(repository.load(&id("u-1")).await.unwrap().is_none());
    assert!(repository.load_all().await.unwrap().is_empty());

    let mut closed = repository
        .load_with(&id("u-1"), &LoadOptions::new().with_deleted(true))
        .await
        .unwrap()
        .unwrap();
    assert!(closed.is_deleted());

    closed.reopen().unwrap();
    repository.save(&mut closed).await.unwrap();

    let reopened = repository.load(&id("u-1")).await.unwrap().unwrap();
    assert!(!reopened.is_deleted());
    assert_eq!(reopened.version(), 3);
}

#[tokio::test]
async fn test_stale_writer_is_rejected_and_can_retry() {
    let repository: EventStoreRepository<User, InMemoryEventStorage> =
        EventStoreRepository::new(Arc::new(InMemoryEventStorage::new()), sync_bus());

    let mut user = User::register("u-1", "Ann", "ann@example.com", "admin").unwrap();
    repository.save(&mut user).await.unwrap();

    let mut winner = repository.load(&id("u-1")).await.unwrap().unwrap();
    let mut loser = repository.load(&id("u-1")).await.unwrap().unwrap();

    winner.change_email("winner@example.com").unwrap();
    loser.change_email("loser@example.com").unwrap();

    repository.save(&mut winner).await.unwrap();
    let err = repository.save(&mut loser).await.unwrap_err();
    assert!(err.is_conflict());

    // Reload and reapply the intent on top of the winner's version
    let mut retry = repository.load(&id("u-1")).await.unwrap().unwrap();
    retry.change_email("loser@example.com").unwrap();
    repository.save(&mut retry).await.unwrap();

    let stored = repository.load(&id("u-1")).await.unwrap().unwrap();
    assert_eq!(stored.email, "loser@example.com");
    assert_eq!(stored.version(), 3);
}

#[test]
fn test_aggregates_deduplicate_by_identity() {
    let a = User::register("u-1", "Ann", "a@example.com", "admin").unwrap();
    let b = User::register("u-1", "Bob", "b@example.com", "admin").unwrap();
    let c = User::register("u-2", "Ann", "a@example.com", "admin").unwrap();

    let unique: HashSet<User> = [a, b, c].into_iter().collect();
    assert_eq!(unique.len(), 2);
}

#[test]
fn test_blank_identity_is_rejected() {
    let err = User::register("   ", "Ann", "a@example.com", "admin").unwrap_err();
    assert!(matches!(err, AggregateError::InvalidIdentity(_)));
}

// =============================================================================
// SQL storage with a fake database
// =============================================================================

/// Stores inserted rows and answers queries from them.
///
/// Queries joining a projection return the rows of the aggregates listed in
/// `projection_matches`, standing in for the database's evaluation of the
/// projection conditions.
#[derive(Default)]
struct FakeDatabase {
    rows: Mutex<Vec<EventRow>>,
    statements: Mutex<Vec<SqlStatement>>,
    projection_matches: Mutex<HashSet<String>>,
}

impl FakeDatabase {
    fn decode(values: &[&SqlValue]) -> EventRow {
        let text = |i: usize| values[i].as_text().unwrap().to_string();
        EventRow {
            aggregate_type: text(0),
            aggregate_id: text(1),
            event_type: text(2),
            body: text(3),
            event_id: text(4).parse().unwrap(),
            actor_id: values[5].as_text().map(ToString::to_string),
            occurred_on: match values[6] {
                SqlValue::Timestamp(at) => *at,
                other => panic!("expected a timestamp, got {other:?}"),
            },
            version: values[7].as_integer().unwrap() as u64,
            delete_action: text(8),
        }
    }
}

#[async_trait]
impl SqlExecutor for FakeDatabase {
    async fn execute(&self, statement: &SqlStatement) -> Result<u64, StorageError> {
        self.statements.lock().unwrap().push(statement.clone());

        let values = statement.values();
        let incoming: Vec<EventRow> = values.chunks(9).map(Self::decode).collect();

        let mut rows = self.rows.lock().unwrap();
        for row in &incoming {
            if rows.iter().any(|r| {
                r.aggregate_type == row.aggregate_type
                    && r.aggregate_id == row.aggregate_id
                    && r.version == row.version
            }) {
                return Err(StorageError::Conflict {
                    aggregate_type: row.aggregate_type.clone(),
                    aggregate_id: row.aggregate_id.clone(),
                    version: row.version,
                });
            }
        }

        let count = incoming.len() as u64;
        rows.extend(incoming);
        Ok(count)
    }

    async fn query_events(&self, statement: &SqlStatement) -> Result<Vec<EventRow>, StorageError> {
        self.statements.lock().unwrap().push(statement.clone());

        let rows = self.rows.lock().unwrap();
        if statement.text.contains("JOIN") {
            let matches = self.projection_matches.lock().unwrap();
            return Ok(rows
                .iter()
                .filter(|r| matches.contains(&r.aggregate_id))
                .cloned()
                .collect());
        }

        let wanted: Vec<&str> = statement.values()[1..]
            .iter()
            .filter_map(|v| v.as_text())
            .collect();
        Ok(rows
            .iter()
            .filter(|r| wanted.is_empty() || wanted.contains(&r.aggregate_id.as_str()))
            .cloned()
            .collect())
    }
}

/// A derived repository adding a projection lookup
struct UserRepository {
    inner: EventStoreRepository<User, SqlEventStorage<FakeDatabase>>,
    projection: ProjectionFilter,
}

impl UserRepository {
    fn new(database: Arc<FakeDatabase>, config: &StoreConfig) -> Self {
        let storage = Arc::new(SqlEventStorage::new(database, config).unwrap());
        Self {
            inner: EventStoreRepository::new(storage, sync_bus()).with_config(config),
            projection: ProjectionFilter::new(TableId::new("UserProjection").unwrap(), "UserId")
                .unwrap(),
        }
    }

    async fn find_by_email_domain(&self, domain: &str) -> Result<Vec<User>, RepositoryError> {
        let email = self.projection.column("Email").map_err(StorageError::from)?;
        let filter = self
            .projection
            .clone()
            .and_where(Condition::like(email, format!("%@{domain}")));
        self.inner
            .load_projected(&filter, &self.inner.default_options())
            .await
    }
}

#[tokio::test]
async fn test_sql_storage_round_trip() {
    let database = Arc::new(FakeDatabase::default());
    let repository = UserRepository::new(database.clone(), &StoreConfig::new());

    let ann = User::register("u-1", "Ann", "ann@example.com", "admin").unwrap();
    let mut bob = User::register("u-2", "Bob", "bob@example.org", "admin").unwrap();
    bob.change_email("bob@example.com").unwrap();

    let mut batch = [ann, bob];
    repository.inner.save_all(&mut batch).await.unwrap();

    let statements = database.statements.lock().unwrap().clone();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].text.starts_with("INSERT INTO Events ("));
    assert_eq!(statements[0].parameters.len(), 27);

    let loaded = repository.inner.load(&id("u-2")).await.unwrap().unwrap();
    assert_eq!(loaded.email, "bob@example.com");
    assert_eq!(loaded.version(), 2);

    let last = database.statements.lock().unwrap().last().cloned().unwrap();
    assert_eq!(
        last.text,
        "SELECT *\nFROM Events\nWHERE AggregateType = @p0 AND AggregateId = @p1\nORDER BY Version ASC"
    );

    assert!(batch.iter().all(|user| !user.has_changes()));
}

#[tokio::test]
async fn test_sql_storage_reports_conflicts() {
    let database = Arc::new(FakeDatabase::default());
    let repository = UserRepository::new(database, &StoreConfig::new());

    let mut first = User::register("u-1", "Ann", "ann@example.com", "admin").unwrap();
    let mut second = User::register("u-1", "Ann", "ann@example.com", "admin").unwrap();

    repository.inner.save(&mut first).await.unwrap();
    let err = repository.inner.save(&mut second).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_projection_lookup() {
    let database = Arc::new(FakeDatabase::default());
    let config = StoreConfig::new().dialect(DialectKind::SqlServer);
    let repository = UserRepository::new(database.clone(), &config);

    let mut ann = User::register("u-1", "Ann", "ann@example.com", "admin").unwrap();
    let mut bob = User::register("u-2", "Bob", "bob@example.org", "admin").unwrap();
    repository.inner.save(&mut ann).await.unwrap();
    repository.inner.save(&mut bob).await.unwrap();

    database
        .projection_matches
        .lock()
        .unwrap()
        .insert("u-1".to_string());

    let found = repository.find_by_email_domain("example.com").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Ann");

    let last = database.statements.lock().unwrap().last().cloned().unwrap();
    assert_eq!(
        last.text,
        "SELECT [Events].*\n\
         FROM [Events]\n\
         INNER JOIN [UserProjection] ON [Events].[AggregateId] = [UserProjection].[UserId]\n\
         WHERE [Events].[AggregateType] = @p0 AND [UserProjection].[Email] LIKE @p1\n\
         ORDER BY [Events].[AggregateId] ASC, [Events].[Version] ASC"
    );
    assert_eq!(
        last.values(),
        vec![&SqlValue::from("User"), &SqlValue::from("%@example.com")]
    );
}

/// Publisher that is down for its first `outages` calls
#[derive(Default)]
struct OutagePublisher {
    outages: Mutex<usize>,
    published: Mutex<Vec<Arc<dyn strata::Event>>>,
}

#[async_trait]
impl EventPublisher for OutagePublisher {
    async fn publish_event(&self, event: Arc<dyn strata::Event>) -> Result<(), EventBusError> {
        let mut outages = self.outages.lock().unwrap();
        if *outages > 0 {
            *outages -= 1;
            return Err(EventBusError::PublishFailed("bus unavailable".to_string()));
        }
        self.published.lock().unwrap().push(event);
        Ok(())
    }
}

#[tokio::test]
async fn test_sql_save_is_retried_after_publish_outage() {
    let database = Arc::new(FakeDatabase::default());
    let publisher = Arc::new(OutagePublisher {
        outages: Mutex::new(1),
        ..Default::default()
    });
    let storage = Arc::new(SqlEventStorage::new(database.clone(), &StoreConfig::new()).unwrap());
    let repository: EventStoreRepository<User, _, OutagePublisher> =
        EventStoreRepository::new(storage, publisher.clone());

    let mut ann = User::register("u-1", "Ann", "ann@example.com", "admin").unwrap();
    ann.change_email("ann@example.org").unwrap();

    tokio_test::assert_err!(repository.save(&mut ann).await);
    assert!(ann.has_changes());

    tokio_test::assert_ok!(repository.save(&mut ann).await);
    assert!(!ann.has_changes());
    assert_eq!(publisher.published.lock().unwrap().len(), 2);
    assert_eq!(database.rows.lock().unwrap().len(), 2);

    let loaded = repository.load(&id("u-1")).await.unwrap().unwrap();
    assert_eq!(loaded.email, "ann@example.org");
}
