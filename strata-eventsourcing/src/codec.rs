//! Event body codecs
//!
//! A codec turns a payload into the `(event type, body)` pair stored in an
//! event row and back again.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use strata_events::EventPayload;

/// A payload as it is written to storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedEvent {
    pub event_type: String,
    pub body: String,
}

/// Event codec trait
pub trait EventCodec<P>: Send + Sync {
    fn serialize(&self, payload: &P) -> Result<EncodedEvent, CodecError>;

    fn deserialize(&self, event_type: &str, body: &str) -> Result<P, CodecError>;
}

/// JSON codec for serde-derived payload enums.
///
/// The type tag is the variant name as serde sees it (honouring `rename`) and
/// the body is the variant's content. Unit variants store a `null` body.
/// Only tags listed in [`EventPayload::EVENT_TYPES`] are decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventCodec;

impl<P> EventCodec<P> for JsonEventCodec
where
    P: EventPayload + Serialize + DeserializeOwned,
{
    fn serialize(&self, payload: &P) -> Result<EncodedEvent, CodecError> {
        let value = serde_json::to_value(payload).map_err(|e| CodecError::Serialize {
            event_type: payload.event_type(),
            reason: e.to_string(),
        })?;

        let (event_type, body) = split_tag(value).ok_or_else(|| CodecError::Serialize {
            event_type: payload.event_type(),
            reason: "payload is not an externally tagged enum".to_string(),
        })?;

        Ok(EncodedEvent {
            event_type,
            body: body.to_string(),
        })
    }

    fn deserialize(&self, event_type: &str, body: &str) -> Result<P, CodecError> {
        if !P::EVENT_TYPES.contains(&event_type) {
            return Err(CodecError::EventTypeNotFound {
                event_type: event_type.to_string(),
            });
        }

        let malformed = |source| CodecError::Malformed {
            event_type: event_type.to_string(),
            source,
        };

        let body: Value = serde_json::from_str(body).map_err(malformed)?;

        if body.is_null() {
            // Unit variants are plain strings; fall back to the tagged form for
            // newtype variants holding `null`.
            if let Ok(payload) = serde_json::from_value(Value::String(event_type.to_string())) {
                return Ok(payload);
            }
        }

        let mut tagged = Map::with_capacity(1);
        tagged.insert(event_type.to_string(), body);
        serde_json::from_value(Value::Object(tagged)).map_err(malformed)
    }
}

/// Split an externally tagged enum value into its tag and content
fn split_tag(value: Value) -> Option<(String, Value)> {
    match value {
        Value::String(tag) => Some((tag, Value::Null)),
        Value::Object(map) if map.len() == 1 => map.into_iter().next(),
        _ => None,
    }
}

/// Codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Unknown event type: {event_type}")]
    EventTypeNotFound { event_type: String },

    #[error("Malformed {event_type} body: {source}")]
    Malformed {
        event_type: String,
        source: serde_json::Error,
    },

    #[error("Cannot serialize {event_type}: {reason}")]
    Serialize {
        event_type: &'static str,
        reason: String,
    },
}
