//! The app talks to its backend only through [`Backend`], so the hosted
//! services can be replaced without touching the flows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gateway::ByteStream;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Prescriptions,
    UserSettings,
    Orders,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prescriptions => "prescriptions",
            Self::UserSettings => "user_settings",
            Self::Orders => "orders",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Reply of a serverless function
pub enum FunctionReply {
    Json(Value),
    /// Server-sent events body
    Stream(ByteStream),
}

impl FunctionReply {
    /// Decode a JSON reply; a streamed reply is a decode error
    pub fn json<T: DeserializeOwned>(self) -> Result<T, BackendError> {
        match self {
            Self::Json(value) => {
                serde_json::from_value(value).map_err(|e| BackendError::Decode(e.to_string()))
            }
            Self::Stream(_) => Err(BackendError::Decode(
                "expected a JSON reply, got a stream".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for FunctionReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Unexpected reply: {0}")]
    Decode(String),

    #[error("{0} does not support this operation")]
    Unsupported(&'static str),
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Rows of `table` owned by the signed-in user
    async fn query_table(&self, table: Table) -> Result<Vec<Value>, BackendError>;

    /// Insert `row`, returning the stored row
    async fn insert_row(&self, table: Table, row: Value) -> Result<Value, BackendError>;

    async fn delete_row(&self, table: Table, id: &str) -> Result<(), BackendError>;

    /// Store an object, returning its key
    async fn upload_object(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, BackendError>;

    async fn invoke_function(&self, name: &str, body: Value) -> Result<FunctionReply, BackendError>;
}

/// Decode rows returned by [`Backend::query_table`]
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, BackendError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(|e| BackendError::Decode(e.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn stream_reply_is_not_json() {
        let reply = FunctionReply::Stream(Box::pin(futures::stream::empty()));
        assert!(matches!(
            reply.json::<Value>(),
            Err(BackendError::Decode(_))
        ));

        let reply = FunctionReply::Json(json!({"response": "hi"}));
        assert_eq!(reply.json::<Value>().unwrap()["response"], "hi");
    }

    #[test]
    fn bad_rows_fail_to_decode() {
        let rows = vec![json!({"user_id": 1})];
        assert!(decode_rows::<Session>(rows).is_err());
    }
}
