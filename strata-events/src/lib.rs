//! Event model for Strata
//!
//! This crate holds the leaf types every other Strata crate builds on.
//!
//! ## Features
//!
//! - **Identities** - Validated aggregate and actor ids
//! - **Domain events** - Envelope metadata around a typed payload enum
//! - **Event Bus** - In-process publish/subscribe keyed by event type
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata_events::*;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! enum AccountEvent {
//!     Opened { owner: String },
//!     Closed,
//! }
//!
//! impl EventPayload for AccountEvent {
//!     const EVENT_TYPES: &'static [&'static str] = &["Opened", "Closed"];
//!
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             AccountEvent::Opened { .. } => "Opened",
//!             AccountEvent::Closed => "Closed",
//!         }
//!     }
//! }
//!
//! #[derive(Clone)]
//! struct AuditHandler;
//!
//! #[async_trait]
//! impl EventHandler<DomainEvent<AccountEvent>> for AuditHandler {
//!     async fn handle(&self, event: &DomainEvent<AccountEvent>) -> Result<(), EventHandlerError> {
//!         println!("{} by {:?}", event.event_type(), event.actor_id);
//!         Ok(())
//!     }
//! }
//!
//! let bus = EventBus::new();
//! bus.subscribe::<DomainEvent<AccountEvent>, _>(TypedEventHandler::new(AuditHandler));
//! bus.publish(DomainEvent::new(AccountEvent::Closed)).await?;
//! ```

pub mod bus;
pub mod event;
pub mod identity;

pub use bus::{EventBus, EventBusBuilder, EventBusConfig, EventBusError, EventPublisher};
pub use event::{
    DeleteAction, DomainEvent, DynEventHandler, Event, EventHandler, EventHandlerError,
    EventPayload, TypedEventHandler, UnknownDeleteAction,
};
pub use identity::{ActorId, AggregateId, IdentityError, IdentityKind, MAX_IDENTITY_LENGTH};
