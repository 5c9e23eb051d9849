//! Forest Bus Response Types
//!
//! This module defines the RPC response envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::{ForestBusError, Result};
use super::methods::ResultInfo;
use super::RequestId;

/// RPC method result (JSON value)
pub type RpcResult = serde_json::Value;

/// An RPC response returned from a node to the client.
///
/// # Fields
///
/// - `id`: The request ID this response corresponds to. A client with many
///   requests in flight on one connection uses it to route the reply.
/// - `result`: The reply value (present on success)
/// - `error`: Error message. Absent, null or empty means success.
///
/// # Example
///
/// ```
/// use forestbus_common::protocol::responses::Response;
/// use serde_json::json;
///
/// let ok = Response::success(123, json!({"CommitIndex": 42}));
/// assert!(!ok.is_error());
///
/// let failed = Response::error(123, "topic not found");
/// assert_eq!(failed.error_message(), Some("topic not found"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<RpcResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(id: RequestId, result: RpcResult) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: RequestId, error: impl Into<String>) -> Self {
        Response {
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Returns `true` if the node reported an error string.
    pub fn is_error(&self) -> bool {
        self.error_message().is_some()
    }

    /// The error string, treating an empty string the same as no error.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// Reads the `Result` object of the reply without decoding its payload.
    ///
    /// A missing or null result, or one without a `Result` object, is
    /// successful. A result that is not an object is rejected.
    pub fn result_info(&self) -> Result<ResultInfo> {
        self.decode_result::<ReplyStatus>().map(|status| status.result)
    }

    /// Decodes the result into a typed reply.
    ///
    /// A missing or null result decodes as an empty object, so it only
    /// succeeds for replies whose fields all have defaults.
    pub fn decode_result<T: DeserializeOwned>(&self) -> Result<T> {
        let value = match &self.result {
            Some(serde_json::Value::Null) | None => serde_json::Value::Object(Default::default()),
            Some(v) => v.clone(),
        };
        serde_json::from_value(value).map_err(|e| ForestBusError::InvalidResponse(e.to_string()))
    }
}

#[derive(Deserialize)]
struct ReplyStatus {
    #[serde(rename = "Result", default)]
    result: ResultInfo,
}
