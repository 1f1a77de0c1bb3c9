use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// A single event as stored in an aggregate stream and delivered on a feed.
///
/// `data` is owned by whoever produced the event; the client never looks
/// inside it. A `null` payload is left out of the request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "eventId")]
    pub id: String,
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(
        rename = "encryptedData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub encrypted_data: Option<String>,
}

impl Event {
    /// Builds an event with a freshly generated id from any serializable payload.
    pub fn new(event_type: impl Into<String>, data: &impl Serialize) -> Result<Self> {
        Self::with_id(uuid::Uuid::new_v4().to_string(), event_type, data)
    }

    /// Builds an event with a caller-chosen id.
    pub fn with_id(
        id: impl Into<String>,
        event_type: impl Into<String>,
        data: &impl Serialize,
    ) -> Result<Self> {
        Ok(Self {
            id: id.into(),
            event_type: event_type.into(),
            data: serde_json::to_value(data).map_err(Error::Encode)?,
            encrypted_data: None,
        })
    }

    /// Decodes the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.data).map_err(Error::Decode)
    }
}
