//! Business-level reply envelope.
//!
//! Every query endpoint answers `{success: true, ...}` or
//! `{success: false, message|error}`. The second form is a value the caller
//! inspects, never an `Err`.

use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{Result, SdkError};

/// Message used when the server reports a failure without saying why.
pub const FALLBACK_ERROR: &str = "There was an error. Please try again later.";

/// A server-reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFailure {
    pub error: String,
}

impl ServerFailure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Build a failure from a `success: false` reply body.
    ///
    /// Prefers `message`, then `error`; empty strings count as absent.
    pub fn from_reply(reply: &Value) -> Self {
        let text = |key: &str| {
            reply
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            error: text("message")
                .or_else(|| text("error"))
                .unwrap_or_else(|| FALLBACK_ERROR.to_string()),
        }
    }
}

impl Serialize for ServerFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ServerFailure", 2)?;
        state.serialize_field("success", &false)?;
        state.serialize_field("error", &self.error)?;
        state.end()
    }
}

/// Result of a query endpoint at the business level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    Success(T),
    Failure(ServerFailure),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The success payload, if any.
    pub fn success(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&ServerFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Failure(failure) => Outcome::Failure(failure),
        }
    }

    pub fn into_result(self) -> std::result::Result<T, ServerFailure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl<T: DeserializeOwned> Outcome<T> {
    /// Interpret a reply body.
    ///
    /// Only an explicit `success: true` counts as success; anything else is a
    /// [`ServerFailure`]. A success body that does not decode as `T` is an
    /// error, not a failure.
    pub fn from_reply(reply: Value, what: &'static str) -> Result<Self> {
        if reply.get("success").and_then(Value::as_bool) != Some(true) {
            return Ok(Self::Failure(ServerFailure::from_reply(&reply)));
        }

        serde_json::from_value(reply)
            .map(Self::Success)
            .map_err(|source| SdkError::Decode { what, source })
    }
}

impl std::fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error)
    }
}
