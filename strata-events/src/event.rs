//! Event envelopes and handler traits

use crate::identity::{ActorId, AggregateId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::{self, Debug};
use std::str::FromStr;
use uuid::Uuid;

/// Type-erased event
///
/// Anything published through the event bus implements this trait.
pub trait Event: Send + Sync + Debug + 'static {
    /// Get event name
    fn event_name(&self) -> &str;

    /// Get event ID
    fn event_id(&self) -> Uuid;

    /// Get event timestamp
    fn timestamp(&self) -> DateTime<Utc>;

    /// Cast to Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Clone the event (box clone pattern)
    fn clone_event(&self) -> Box<dyn Event>;
}

/// Soft-delete effect an event has on its aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeleteAction {
    #[default]
    None,
    Delete,
    Undelete,
}

impl DeleteAction {
    /// Tag persisted alongside each event row
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteAction::None => "None",
            DeleteAction::Delete => "Delete",
            DeleteAction::Undelete => "Undelete",
        }
    }
}

impl fmt::Display for DeleteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised delete-action tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown delete action: {0}")]
pub struct UnknownDeleteAction(pub String);

impl FromStr for DeleteAction {
    type Err = UnknownDeleteAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" | "" => Ok(DeleteAction::None),
            "Delete" => Ok(DeleteAction::Delete),
            "Undelete" => Ok(DeleteAction::Undelete),
            other => Err(UnknownDeleteAction(other.to_string())),
        }
    }
}

/// Payload of a domain event.
///
/// Each aggregate defines one enum of payload variants; the variant name is the
/// event type tag stored with every row.
pub trait EventPayload: Send + Sync + Debug + Clone + 'static {
    /// Every type tag this payload can carry
    const EVENT_TYPES: &'static [&'static str];

    /// Type tag of this particular variant
    fn event_type(&self) -> &'static str;
}

/// Domain event: envelope metadata plus a typed payload.
///
/// Envelope fields left as `None` are filled in when the event is applied to an
/// aggregate; once dispatched they are all set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent<P> {
    /// Unique event ID
    pub id: Option<Uuid>,

    /// Owning aggregate
    pub aggregate_id: Option<AggregateId>,

    /// Position in the aggregate's stream, starting at 1
    pub version: Option<u64>,

    /// Who caused the event
    pub actor_id: Option<ActorId>,

    /// When the event happened
    pub occurred_on: Option<DateTime<Utc>>,

    /// Soft-delete effect
    #[serde(default)]
    pub delete_action: DeleteAction,

    /// Event payload
    pub payload: P,
}

impl<P: EventPayload> DomainEvent<P> {
    /// Create an event with an empty envelope
    pub fn new(payload: P) -> Self {
        Self {
            id: None,
            aggregate_id: None,
            version: None,
            actor_id: None,
            occurred_on: None,
            delete_action: DeleteAction::None,
            payload,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_aggregate_id(mut self, aggregate_id: AggregateId) -> Self {
        self.aggregate_id = Some(aggregate_id);
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_actor(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_occurred_on(mut self, occurred_on: DateTime<Utc>) -> Self {
        self.occurred_on = Some(occurred_on);
        self
    }

    pub fn with_delete_action(mut self, delete_action: DeleteAction) -> Self {
        self.delete_action = delete_action;
        self
    }

    /// Mark this event as soft-deleting its aggregate
    pub fn deleting(self) -> Self {
        self.with_delete_action(DeleteAction::Delete)
    }

    /// Mark this event as restoring a soft-deleted aggregate
    pub fn undeleting(self) -> Self {
        self.with_delete_action(DeleteAction::Undelete)
    }

    /// Version, or 0 while unassigned
    pub fn version(&self) -> u64 {
        self.version.unwrap_or(0)
    }

    /// Type tag of the payload
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

impl<P: EventPayload> Event for DomainEvent<P> {
    fn event_name(&self) -> &str {
        self.payload.event_type()
    }

    fn event_id(&self) -> Uuid {
        self.id.unwrap_or_default()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.occurred_on.unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_event(&self) -> Box<dyn Event> {
        Box::new(self.clone())
    }
}

/// Event handler trait
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync {
    /// Handle the event
    async fn handle(&self, event: &E) -> Result<(), EventHandlerError>;
}

/// Event handler error
#[derive(Debug, thiserror::Error)]
pub enum EventHandlerError {
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Event processing error: {0}")]
    ProcessingError(String),

    #[error("Handler received {actual}, expected {expected}")]
    TypeMismatch {
        expected: &'static str,
        actual: String,
    },
}

/// Type-erased event handler
#[async_trait]
pub trait DynEventHandler: Send + Sync {
    /// Handle event (type-erased)
    async fn handle_dyn(&self, event: &dyn Event) -> Result<(), EventHandlerError>;
}

/// Adapts a typed [`EventHandler`] to [`DynEventHandler`] by downcasting.
pub struct TypedEventHandler<E: Event, H: EventHandler<E>> {
    handler: H,
    _phantom: std::marker::PhantomData<fn(&E)>,
}

impl<E: Event, H: EventHandler<E>> TypedEventHandler<E, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _phantom: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<E: Event, H: EventHandler<E> + 'static> DynEventHandler for TypedEventHandler<E, H> {
    async fn handle_dyn(&self, event: &dyn Event) -> Result<(), EventHandlerError> {
        match event.as_any().downcast_ref::<E>() {
            Some(typed_event) => self.handler.handle(typed_event).await,
            None => Err(EventHandlerError::TypeMismatch {
                expected: std::any::type_name::<E>(),
                actual: event.event_name().to_string(),
            }),
        }
    }
}
