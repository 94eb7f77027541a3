//! Aggregate engine
//!
//! An aggregate's whole state is a fold over its events. The engine owns the
//! envelope rules (ownership, ordering, versioning, soft deletion) so that
//! aggregate types only describe what each event variant does to their state.

use chrono::{DateTime, Utc};
use std::fmt::{self, Debug};
use strata_events::{ActorId, AggregateId, DeleteAction, DomainEvent, EventPayload, IdentityError};
use uuid::Uuid;

/// Identity of an aggregate across types.
///
/// Two aggregates are the same aggregate exactly when their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregateKey {
    pub aggregate_type: &'static str,
    pub id: AggregateId,
}

impl fmt::Display for AggregateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.id)
    }
}

/// State shared by every aggregate: identity, version, deletion flag and the
/// events applied since the last save.
#[derive(Debug, Clone)]
pub struct AggregateRoot<E> {
    id: AggregateId,
    version: u64,
    /// Set once the first event has been applied, whatever its version
    applied: bool,
    is_deleted: bool,
    pending: Vec<DomainEvent<E>>,
}

impl<E: EventPayload> AggregateRoot<E> {
    /// Create a root with a known identity
    pub fn new(id: AggregateId) -> Self {
        Self {
            id,
            version: 0,
            applied: false,
            is_deleted: false,
            pending: Vec::new(),
        }
    }

    /// Create a root with a freshly generated identity
    pub fn generate() -> Self {
        Self::new(AggregateId::generate())
    }

    /// Create a root from raw identity text, generating one when none is given
    pub fn try_new(id: Option<&str>) -> Result<Self, AggregateError> {
        match id {
            Some(raw) => Ok(Self::new(AggregateId::new(raw)?)),
            None => Ok(Self::generate()),
        }
    }

    pub fn id(&self) -> &AggregateId {
        &self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    pub fn pending(&self) -> &[DomainEvent<E>] {
        &self.pending
    }
}

/// Aggregate trait
///
/// Implementors hold an [`AggregateRoot`] and react to their own event enum in
/// [`Aggregate::handle`]; everything else is provided.
///
/// ```rust,ignore
/// impl Aggregate for Account {
///     type Event = AccountEvent;
///
///     fn aggregate_type() -> &'static str { "Account" }
///
///     fn new_instance(id: AggregateId) -> Option<Self> {
///         Some(Self { root: AggregateRoot::new(id), balance: 0 })
///     }
///
///     fn root(&self) -> &AggregateRoot<AccountEvent> { &self.root }
///     fn root_mut(&mut self) -> &mut AggregateRoot<AccountEvent> { &mut self.root }
///
///     fn handle(&mut self, event: &DomainEvent<AccountEvent>) {
///         match &event.payload {
///             AccountEvent::Deposited { amount } => self.balance += amount,
///             AccountEvent::Closed => {}
///         }
///     }
/// }
/// ```
pub trait Aggregate: Send + Sync + Debug + Sized + 'static {
    /// Closed set of events this aggregate understands
    type Event: EventPayload;

    /// Aggregate type tag stored with every event row
    fn aggregate_type() -> &'static str;

    /// Identity-only constructor used when replaying history.
    ///
    /// Returning `None` fails the replay with
    /// [`AggregateError::AggregateConstructionFailed`].
    fn new_instance(id: AggregateId) -> Option<Self>;

    fn root(&self) -> &AggregateRoot<Self::Event>;

    fn root_mut(&mut self) -> &mut AggregateRoot<Self::Event>;

    /// Variant-specific state change. Variants an aggregate does not care
    /// about are simply ignored.
    fn handle(&mut self, event: &DomainEvent<Self::Event>) {
        let _ = event;
    }

    fn id(&self) -> &AggregateId {
        self.root().id()
    }

    fn version(&self) -> u64 {
        self.root().version()
    }

    fn is_deleted(&self) -> bool {
        self.root().is_deleted()
    }

    fn key(&self) -> AggregateKey {
        AggregateKey {
            aggregate_type: Self::aggregate_type(),
            id: self.id().clone(),
        }
    }

    /// Events applied since the last save
    fn changes(&self) -> &[DomainEvent<Self::Event>] {
        self.root().pending()
    }

    fn has_changes(&self) -> bool {
        !self.changes().is_empty()
    }

    fn clear_changes(&mut self) {
        self.root_mut().pending.clear();
    }

    /// Fill in the unset envelope fields, apply the event and queue it for
    /// the next save.
    ///
    /// Defaults: a new event id, this aggregate's id, the next version, the
    /// given actor (or the system actor) and the given time (or now).
    fn apply_change(
        &mut self,
        event: DomainEvent<Self::Event>,
        actor_id: Option<ActorId>,
        occurred_on: Option<DateTime<Utc>>,
    ) -> Result<(), AggregateError> {
        let root = self.root();
        let event = DomainEvent {
            id: event.id.or_else(|| Some(Uuid::new_v4())),
            aggregate_id: event.aggregate_id.or_else(|| Some(root.id().clone())),
            version: event.version.or(Some(root.version() + 1)),
            actor_id: event
                .actor_id
                .or(actor_id)
                .or_else(|| Some(ActorId::system())),
            occurred_on: event.occurred_on.or(occurred_on).or_else(|| Some(Utc::now())),
            delete_action: event.delete_action,
            payload: event.payload,
        };

        dispatch(self, &event)?;
        self.root_mut().pending.push(event);
        Ok(())
    }

    /// Apply a new event built from a bare payload
    fn raise(&mut self, payload: Self::Event) -> Result<(), AggregateError> {
        self.apply_change(DomainEvent::new(payload), None, None)
    }

    /// Rebuild an aggregate from its history.
    ///
    /// Events are replayed in ascending version order; the result has no
    /// pending changes.
    fn load_from_changes<I>(id: AggregateId, events: I) -> Result<Self, AggregateError>
    where
        I: IntoIterator<Item = DomainEvent<Self::Event>>,
    {
        let mut aggregate =
            Self::new_instance(id.clone()).ok_or_else(|| AggregateError::AggregateConstructionFailed {
                aggregate_type: Self::aggregate_type(),
                aggregate_id: id.to_string(),
            })?;

        let mut events: Vec<_> = events.into_iter().collect();
        events.sort_by_key(|event| event.version());

        for event in &events {
            dispatch(&mut aggregate, event)?;
        }

        Ok(aggregate)
    }
}

/// Envelope checks, then the variant handler, then version and deletion bookkeeping.
fn dispatch<A: Aggregate>(aggregate: &mut A, event: &DomainEvent<A::Event>) -> Result<(), AggregateError> {
    let root = aggregate.root();
    let event_version = event.version();

    if event.aggregate_id.as_ref() != Some(root.id()) {
        return Err(AggregateError::EventAggregateMismatch {
            aggregate_type: A::aggregate_type(),
            aggregate_id: root.id().to_string(),
            event_aggregate_id: event.aggregate_id.as_ref().map(ToString::to_string),
            event_id: event.id,
            event_type: event.event_type(),
            event_version,
        });
    }

    // Equal versions are only legal before anything has been applied.
    let current = root.version();
    if event_version < current || (event_version == current && root.applied) {
        return Err(AggregateError::CannotApplyPastEvent {
            aggregate_type: A::aggregate_type(),
            aggregate_id: root.id().to_string(),
            aggregate_version: current,
            event_id: event.id,
            event_type: event.event_type(),
            event_version,
        });
    }

    tracing::trace!(
        aggregate_type = A::aggregate_type(),
        aggregate_id = %root.id(),
        event_type = event.event_type(),
        version = event_version,
        "Dispatching event"
    );

    aggregate.handle(event);

    let root = aggregate.root_mut();
    root.version = event_version;
    root.applied = true;
    match event.delete_action {
        DeleteAction::None => {}
        DeleteAction::Delete => root.is_deleted = true,
        DeleteAction::Undelete => root.is_deleted = false,
    }

    Ok(())
}

/// Implements `PartialEq`, `Eq` and `Hash` for an aggregate type from its
/// [`AggregateKey`], so equality means "same type, same identity".
#[macro_export]
macro_rules! impl_aggregate_identity {
    ($ty:ty) => {
        impl ::std::cmp::PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                $crate::Aggregate::key(self) == $crate::Aggregate::key(other)
            }
        }

        impl ::std::cmp::Eq for $ty {}

        impl ::std::hash::Hash for $ty {
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                ::std::hash::Hash::hash(&$crate::Aggregate::key(self), state);
            }
        }
    };
}

/// Aggregate error
///
/// Every variant is an invariant violation: a programming error or a corrupt
/// replay sequence, never a transient fault.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("Invalid aggregate identity: {0}")]
    InvalidIdentity(#[from] IdentityError),

    #[error(
        "Event {event_type} (id {event_id:?}, version {event_version}) belongs to aggregate {event_aggregate_id:?}, not {aggregate_type} {aggregate_id}"
    )]
    EventAggregateMismatch {
        aggregate_type: &'static str,
        aggregate_id: String,
        event_aggregate_id: Option<String>,
        event_id: Option<Uuid>,
        event_type: &'static str,
        event_version: u64,
    },

    #[error(
        "Cannot apply {event_type} (id {event_id:?}) at version {event_version} to {aggregate_type} {aggregate_id} at version {aggregate_version}"
    )]
    CannotApplyPastEvent {
        aggregate_type: &'static str,
        aggregate_id: String,
        aggregate_version: u64,
        event_id: Option<Uuid>,
        event_type: &'static str,
        event_version: u64,
    },

    #[error("Constructing {aggregate_type} {aggregate_id} returned nothing")]
    AggregateConstructionFailed {
        aggregate_type: &'static str,
        aggregate_id: String,
    },
}
