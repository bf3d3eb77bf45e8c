//! Generic keyed record.
//!
//! # Responsibility
//! - Hold one persisted item: an explicit id plus an opaque JSON payload.
//! - Convert between raw payloads and typed domain views.
//!
//! # Invariants
//! - `id` is always caller-provided; storage never assigns ids.
//! - `payload` is a JSON object, never a scalar or array.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Identifier of a record inside its owning collection.
pub type RecordId = i64;

/// Domain payload stored under a record id.
pub type Payload = Map<String, Value>;

/// Error raised when a payload cannot be mapped to or from a typed view.
#[derive(Debug)]
pub enum PayloadError {
    /// Serialized value was not a JSON object.
    NotAnObject,
    /// Field shape did not match the typed view.
    Json(serde_json::Error),
}

impl Display for PayloadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "record payload must be a JSON object"),
            Self::Json(err) => write!(f, "invalid record payload: {err}"),
        }
    }
}

impl Error for PayloadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotAnObject => None,
            Self::Json(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for PayloadError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// One persisted item of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub payload: Payload,
}

impl Record {
    pub fn new(id: RecordId, payload: Payload) -> Self {
        Self { id, payload }
    }

    /// Builds a record from a typed domain view.
    ///
    /// # Errors
    /// - Returns `PayloadError::NotAnObject` when `value` serializes to a
    ///   non-object JSON value.
    pub fn from_typed<T: Serialize>(id: RecordId, value: &T) -> Result<Self, PayloadError> {
        Ok(Self::new(id, to_payload(value)?))
    }

    /// Decodes the payload into a typed domain view.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        Ok(serde_json::from_value(Value::Object(self.payload.clone()))?)
    }
}

/// Serializes a typed value into a record payload.
pub fn to_payload<T: Serialize>(value: &T) -> Result<Payload, PayloadError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(PayloadError::NotAnObject),
    }
}

/// Interprets a raw stored value as a payload.
pub fn payload_from_value(value: Value) -> Result<Payload, PayloadError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(PayloadError::NotAnObject),
    }
}
