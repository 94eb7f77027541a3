//! Aggregate and actor identities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Longest identity accepted, counted in characters after trimming.
pub const MAX_IDENTITY_LENGTH: usize = 255;

/// Which identity a validation error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Aggregate,
    Actor,
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKind::Aggregate => write!(f, "aggregate"),
            IdentityKind::Actor => write!(f, "actor"),
        }
    }
}

/// Identity validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("{kind} id must not be empty")]
    Empty { kind: IdentityKind },

    #[error("{kind} id is {length} characters long, maximum is {max}")]
    TooLong {
        kind: IdentityKind,
        length: usize,
        max: usize,
    },
}

fn normalize(kind: IdentityKind, value: &str) -> Result<String, IdentityError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(IdentityError::Empty { kind });
    }

    let length = trimmed.chars().count();
    if length > MAX_IDENTITY_LENGTH {
        return Err(IdentityError::TooLong {
            kind,
            length,
            max: MAX_IDENTITY_LENGTH,
        });
    }

    Ok(trimmed.to_string())
}

/// Implements the string plumbing shared by both identity types.
macro_rules! identity_conversions {
    ($ty:ident, $kind:expr) => {
        impl $ty {
            /// Borrow the trimmed identity text
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $ty {
            type Err = IdentityError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                normalize($kind, s).map($ty)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = IdentityError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl TryFrom<&str> for $ty {
            type Error = IdentityError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$ty> for String {
            fn from(id: $ty) -> Self {
                id.0
            }
        }
    };
}

/// Identity of an aggregate.
///
/// Always trimmed, never empty, at most [`MAX_IDENTITY_LENGTH`] characters.
/// Two ids are equal when their trimmed text is equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AggregateId(String);

impl AggregateId {
    /// Validate and wrap an identity
    pub fn new(value: impl AsRef<str>) -> Result<Self, IdentityError> {
        value.as_ref().parse()
    }

    /// Generate a fresh random identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

identity_conversions!(AggregateId, IdentityKind::Aggregate);

/// Identity of whoever caused an event.
///
/// Absent actors are recorded as [`ActorId::SYSTEM`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActorId(String);

impl ActorId {
    /// Sentinel recorded when no actor is known
    pub const SYSTEM: &'static str = "SYSTEM";

    /// Validate and wrap an identity
    pub fn new(value: impl AsRef<str>) -> Result<Self, IdentityError> {
        value.as_ref().parse()
    }

    /// The system actor
    pub fn system() -> Self {
        Self(Self::SYSTEM.to_string())
    }

    /// Wrap an optional actor, falling back to the system actor when the
    /// value is missing or blank.
    pub fn from_optional(value: Option<&str>) -> Result<Self, IdentityError> {
        match value {
            Some(raw) if !raw.trim().is_empty() => Self::new(raw),
            _ => Ok(Self::system()),
        }
    }

    /// Whether this is the system actor
    pub fn is_system(&self) -> bool {
        self.0 == Self::SYSTEM
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::system()
    }
}

identity_conversions!(ActorId, IdentityKind::Actor);
