//! Forest Bus Common Types and Transport
//!
//! This crate provides the wire protocol and TCP transport shared by the
//! Forest Bus client and by in-process nodes used in tests.
//!
//! # Overview
//!
//! A Forest Bus cluster is a set of nodes that each store a replicated,
//! append-only log per topic. Clients talk to nodes over a simple
//! request/response protocol:
//!
//! - **Protocol Layer**: the request/response envelope, the closed set of
//!   remote methods with their typed arguments and replies, and result codes
//! - **Transport Layer**: length-prefixed JSON frames over TCP, plus a small
//!   async server
//!
//! # Architecture
//!
//! - **Transport**: TCP, one long-lived connection per node, many requests in
//!   flight on it at once (responses are matched by request id)
//! - **Serialization**: JSON, message payloads as base64 strings
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Max Message Size**: 100 MB
//!
//! # Example
//!
//! ```
//! use forestbus_common::{Method, Request, Response, SendMessagesArgs};
//! use serde_json::json;
//!
//! let args = SendMessagesArgs {
//!     topic: "orders".to_string(),
//!     sent_messages: vec![b"hello".to_vec()],
//!     wait_for_commit: false,
//! };
//! let request = Request::new(Method::SendMessages, serde_json::to_value(&args).unwrap());
//! let response = Response::success(request.id, json!({"Result": {"Code": 0}, "IDs": [7]}));
//! assert!(!response.is_error());
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
