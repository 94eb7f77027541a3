//! Event Bus implementation

use crate::event::{DynEventHandler, Event, EventHandlerError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Destination for newly appended events.
///
/// The repository calls this once per event, in append order, after the
/// storage write succeeded.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_event(&self, event: Arc<dyn Event>) -> Result<(), EventBusError>;
}

/// In-process publish/subscribe bus keyed by concrete event type
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<DashMap<TypeId, Vec<Arc<dyn DynEventHandler>>>>,
    config: Arc<EventBusConfig>,
}

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Run each handler on its own task
    pub async_handling: bool,

    /// Keep invoking handlers after one fails
    pub continue_on_error: bool,

    /// Emit tracing events for subscribe/publish
    pub enable_logging: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            async_handling: true,
            continue_on_error: true,
            enable_logging: true,
        }
    }
}

impl EventBus {
    /// Create new event bus
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create event bus with custom config
    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            handlers: Arc::new(DashMap::new()),
            config: Arc::new(config),
        }
    }

    /// Subscribe a handler to an event type
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let bus = EventBus::new();
    /// bus.subscribe::<DomainEvent<AccountEvent>, _>(TypedEventHandler::new(AuditHandler));
    /// ```
    pub fn subscribe<E, H>(&self, handler: H)
    where
        E: Event,
        H: DynEventHandler + 'static,
    {
        let type_id = TypeId::of::<E>();
        self.handlers
            .entry(type_id)
            .or_default()
            .push(Arc::new(handler));

        if self.config.enable_logging {
            debug!(
                event_type = std::any::type_name::<E>(),
                "Subscribed event handler"
            );
        }
    }

    /// Publish an event to every handler registered for its type
    pub async fn publish<E: Event>(&self, event: E) -> Result<(), EventBusError> {
        self.publish_shared(Arc::new(event)).await
    }

    /// Publish an already type-erased event
    pub async fn publish_shared(&self, event: Arc<dyn Event>) -> Result<(), EventBusError> {
        let type_id = Any::type_id(event.as_any());

        if self.config.enable_logging {
            info!(
                event_name = event.event_name(),
                event_id = %event.event_id(),
                "Publishing event"
            );
        }

        let handlers = match self.handlers.get(&type_id) {
            Some(handlers) => handlers.clone(),
            None => {
                if self.config.enable_logging {
                    warn!(
                        event_name = event.event_name(),
                        "No handlers registered for event"
                    );
                }
                return Ok(());
            }
        };

        let mut errors = Vec::new();

        if self.config.async_handling {
            let mut tasks = Vec::with_capacity(handlers.len());

            for handler in handlers.iter() {
                let handler = handler.clone();
                let event = event.clone();
                tasks.push(tokio::spawn(async move {
                    handler.handle_dyn(event.as_ref()).await
                }));
            }

            for task in tasks {
                let outcome = match task.await {
                    Ok(result) => result,
                    Err(e) => Err(EventHandlerError::HandlerFailed(e.to_string())),
                };

                if let Err(e) = outcome {
                    error!(error = %e, "Event handler failed");
                    errors.push(e);
                    if !self.config.continue_on_error {
                        break;
                    }
                }
            }
        } else {
            for handler in handlers.iter() {
                if let Err(e) = handler.handle_dyn(event.as_ref()).await {
                    error!(error = %e, "Event handler failed");
                    errors.push(e);
                    if !self.config.continue_on_error {
                        break;
                    }
                }
            }
        }

        if !errors.is_empty() && !self.config.continue_on_error {
            return Err(EventBusError::HandlersFailed(errors));
        }

        if self.config.enable_logging {
            debug!(event_name = event.event_name(), "Event published");
        }

        Ok(())
    }

    /// Unsubscribe all handlers for an event type
    pub fn unsubscribe<E: Event>(&self) {
        self.handlers.remove(&TypeId::of::<E>());

        if self.config.enable_logging {
            debug!(
                event_type = std::any::type_name::<E>(),
                "Unsubscribed all handlers"
            );
        }
    }

    /// Clear all handlers
    pub fn clear(&self) {
        self.handlers.clear();
        if self.config.enable_logging {
            info!("Cleared all event handlers");
        }
    }

    /// Get handler count for an event type
    pub fn handler_count<E: Event>(&self) -> usize {
        self.handlers
            .get(&TypeId::of::<E>())
            .map(|h| h.len())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish_event(&self, event: Arc<dyn Event>) -> Result<(), EventBusError> {
        self.publish_shared(event).await
    }
}

/// Event bus errors
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("One or more handlers failed")]
    HandlersFailed(Vec<EventHandlerError>),

    #[error("Event publishing failed: {0}")]
    PublishFailed(String),
}

/// Event bus builder
pub struct EventBusBuilder {
    config: EventBusConfig,
}

impl EventBusBuilder {
    /// Create new event bus builder
    pub fn new() -> Self {
        Self {
            config: EventBusConfig::default(),
        }
    }

    /// Enable/disable async handling
    pub fn async_handling(mut self, enabled: bool) -> Self {
        self.config.async_handling = enabled;
        self
    }

    /// Enable/disable continue on error
    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.config.continue_on_error = enabled;
        self
    }

    /// Enable/disable logging
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    /// Build the event bus
    pub fn build(self) -> EventBus {
        EventBus::with_config(self.config)
    }
}

impl Default for EventBusBuilder {
    fn default() -> Self {
        Self::new()
    }
}
