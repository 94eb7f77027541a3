//! Event Sourcing for Strata
//!
//! Aggregates are rebuilt by replaying their events and persisted by
//! appending new ones to a single event log.
//!
//! ## Features
//!
//! - **Aggregates** - Envelope handling, versioning and soft deletion
//! - **Codecs** - Payload enums to `(event type, body)` pairs
//! - **Storage** - In-memory and SQL event logs
//! - **Repository** - Load/save aggregates, publish saved events
//! - **Projections** - Load aggregates selected through a projection table
//! - **Optimistic Concurrency** - Duplicate versions are rejected, never merged
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata_eventsourcing::*;
//! use strata_events::{AggregateId, DomainEvent, EventBus, EventPayload};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! enum UserEvent {
//!     Registered { email: String },
//!     Deactivated,
//! }
//!
//! impl EventPayload for UserEvent {
//!     const EVENT_TYPES: &'static [&'static str] = &["Registered", "Deactivated"];
//!
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             UserEvent::Registered { .. } => "Registered",
//!             UserEvent::Deactivated => "Deactivated",
//!         }
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct User {
//!     root: AggregateRoot<UserEvent>,
//!     email: String,
//! }
//!
//! impl Aggregate for User {
//!     type Event = UserEvent;
//!
//!     fn aggregate_type() -> &'static str { "User" }
//!
//!     fn new_instance(id: AggregateId) -> Option<Self> {
//!         Some(Self { root: AggregateRoot::new(id), email: String::new() })
//!     }
//!
//!     fn root(&self) -> &AggregateRoot<UserEvent> { &self.root }
//!     fn root_mut(&mut self) -> &mut AggregateRoot<UserEvent> { &mut self.root }
//!
//!     fn handle(&mut self, event: &DomainEvent<UserEvent>) {
//!         if let UserEvent::Registered { email } = &event.payload {
//!             self.email = email.clone();
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo: EventStoreRepository<User, _> =
//!         EventStoreRepository::new(Arc::new(InMemoryEventStorage::new()), Arc::new(EventBus::new()));
//!
//!     let mut user = User::new_instance(AggregateId::new("user-123")?).unwrap();
//!     user.raise(UserEvent::Registered { email: "user@example.com".into() })?;
//!     repo.save(&mut user).await?;
//!
//!     let loaded = repo.load(&AggregateId::new("user-123")?).await?;
//!     assert_eq!(loaded.map(|u| u.version()), Some(1));
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod projection;
pub mod repository;
pub mod sql;
pub mod store;

pub use aggregate::{Aggregate, AggregateError, AggregateKey, AggregateRoot};
pub use codec::{CodecError, EncodedEvent, EventCodec, JsonEventCodec};
pub use config::{ConfigError, StoreConfig};
pub use projection::ProjectionFilter;
pub use repository::{EventStoreRepository, LoadOptions, RepositoryError, RowContext};
pub use sql::{SqlEventStorage, SqlExecutor};
pub use store::{EventFilter, EventRow, EventStorage, InMemoryEventStorage, StorageError};
