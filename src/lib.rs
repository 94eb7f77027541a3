// Strata - event-sourced aggregates over a single event log
//
// This library re-exports the Strata crates: the event model, the SQL
// compiler and the aggregate persistence engine built on both.

// Re-export the event model
pub use strata_events::*;

// Re-export optional crates
#[cfg(feature = "sql")]
pub use strata_sql;

#[cfg(feature = "eventsourcing")]
pub use strata_eventsourcing;

#[cfg(feature = "eventsourcing")]
pub use strata_eventsourcing::impl_aggregate_identity;

// Re-export commonly used dependencies
pub use async_trait::async_trait;
pub use serde;
pub use serde_json;
pub use tokio;

/// Prelude for the common aggregate workflow
pub mod prelude {
    pub use strata_events::{
        ActorId, AggregateId, DeleteAction, DomainEvent, EventBus, EventHandler,
        EventHandlerError, EventPayload, EventPublisher, TypedEventHandler,
    };

    #[cfg(feature = "sql")]
    pub use strata_sql::{ColumnId, Condition, DialectKind, OrderBy, QueryBuilder, TableId};

    #[cfg(feature = "eventsourcing")]
    pub use strata_eventsourcing::{
        Aggregate, AggregateError, AggregateRoot, EventStoreRepository, InMemoryEventStorage,
        LoadOptions, ProjectionFilter, RepositoryError, SqlEventStorage, SqlExecutor,
        StoreConfig,
    };

    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
}
