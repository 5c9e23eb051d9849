use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use super::methods::Method;

pub type RequestId = u64;
pub type RpcArgs = serde_json::Value;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A request sent from a client to a node.
///
/// `method` is kept as the wire string so that nodes can answer unknown
/// methods with an error instead of failing to decode the frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub args: RpcArgs,
}

impl Request {
    pub fn new(method: Method, args: RpcArgs) -> Self {
        Request {
            id: generate_request_id(),
            method: method.name().to_string(),
            args,
        }
    }

    /// The typed method, if the name is one this protocol knows.
    pub fn method(&self) -> Option<Method> {
        Method::from_name(&self.method)
    }
}

fn generate_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

    // Upper 32 bits from the clock, lower 32 bits from the counter
    (timestamp & 0xFFFFFFFF00000000) | (counter & 0xFFFFFFFF)
}
