//! Remote methods exposed by Forest Bus nodes.
//!
//! Each method is a variant of [`Method`] paired with a typed argument struct
//! and a typed reply struct. The argument struct names its method through
//! [`RemoteCall`], so a caller can never pair arguments with the wrong method
//! name or decode a reply into the wrong shape.
//!
//! Field names on the wire are PascalCase. Message payloads travel as base64
//! strings.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of remote methods this protocol speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    ReceiveMessages,
    GetTopicDetails,
    SendMessages,
    GetClusterDetails,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::ReceiveMessages,
        Method::GetTopicDetails,
        Method::SendMessages,
        Method::GetClusterDetails,
    ];

    /// Wire name of the method.
    pub const fn name(self) -> &'static str {
        match self {
            Method::ReceiveMessages => "RPCHandler.ReceiveMessages",
            Method::GetTopicDetails => "RPCHandler.GetTopicDetails",
            Method::SendMessages => "RPCHandler.SendMessages",
            Method::GetClusterDetails => "RPCHandler.GetClusterDetails",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome code carried in the `Result.Code` field of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ResultCode {
    #[default]
    Success,
    Failure,
    /// The node is not the leader for the topic
    NotLeader,
    TopicNotFound,
    /// No leader has been elected yet
    NoLeader,
    Unknown(i64),
}

impl ResultCode {
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }

    /// Codes that mean "this node cannot serve the write right now, another
    /// node may".
    pub fn is_leadership(self) -> bool {
        matches!(self, ResultCode::NotLeader | ResultCode::NoLeader)
    }
}

impl From<i64> for ResultCode {
    fn from(code: i64) -> Self {
        match code {
            0 => ResultCode::Success,
            1 => ResultCode::Failure,
            2 => ResultCode::NotLeader,
            3 => ResultCode::TopicNotFound,
            4 => ResultCode::NoLeader,
            other => ResultCode::Unknown(other),
        }
    }
}

impl From<ResultCode> for i64 {
    fn from(code: ResultCode) -> Self {
        match code {
            ResultCode::Success => 0,
            ResultCode::Failure => 1,
            ResultCode::NotLeader => 2,
            ResultCode::TopicNotFound => 3,
            ResultCode::NoLeader => 4,
            ResultCode::Unknown(other) => other,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => f.write_str("success"),
            ResultCode::Failure => f.write_str("failure"),
            ResultCode::NotLeader => f.write_str("not leader"),
            ResultCode::TopicNotFound => f.write_str("topic not found"),
            ResultCode::NoLeader => f.write_str("no leader"),
            ResultCode::Unknown(code) => write!(f, "unknown result code {}", code),
        }
    }
}

/// The nested `Result` object of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultInfo {
    #[serde(rename = "Code", default)]
    pub code: ResultCode,
}

impl ResultInfo {
    pub fn new(code: ResultCode) -> Self {
        Self { code }
    }
}

/// A typed reply.
///
/// Every reply may carry a `Result` object; a reply without one is
/// successful. The payload fields are only present on success, so the code is
/// read with [`Response::result_info`](super::responses::Response::result_info)
/// before the reply itself is decoded.
pub trait RemoteReply: DeserializeOwned + Send + 'static {}

/// Typed arguments of one remote method.
pub trait RemoteCall: Serialize + Send + Sync {
    const METHOD: Method;
    type Reply: RemoteReply;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveMessagesArgs {
    #[serde(rename = "ClusterID")]
    pub cluster_id: String,
    #[serde(rename = "Topic")]
    pub topic: String,
    /// First index to return
    #[serde(rename = "ID")]
    pub id: u64,
    #[serde(rename = "Quantity")]
    pub quantity: u64,
    #[serde(rename = "WaitForMessages")]
    pub wait_for_messages: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReceiveMessagesReply {
    #[serde(rename = "Result", default)]
    pub result: ResultInfo,
    /// Required, but may be null when there is nothing to return
    #[serde(rename = "ReceivedMessages", with = "base64_messages")]
    pub received_messages: Vec<Vec<u8>>,
    #[serde(rename = "NextID")]
    pub next_id: u64,
}

impl RemoteCall for ReceiveMessagesArgs {
    const METHOD: Method = Method::ReceiveMessages;
    type Reply = ReceiveMessagesReply;
}

impl RemoteReply for ReceiveMessagesReply {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetTopicDetailsArgs {
    #[serde(rename = "Topic")]
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TopicDetailsReply {
    #[serde(rename = "Result", default)]
    pub result: ResultInfo,
    #[serde(rename = "CommitIndex")]
    pub commit_index: u64,
}

impl RemoteCall for GetTopicDetailsArgs {
    const METHOD: Method = Method::GetTopicDetails;
    type Reply = TopicDetailsReply;
}

impl RemoteReply for TopicDetailsReply {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessagesArgs {
    #[serde(rename = "Topic")]
    pub topic: String,
    #[serde(rename = "SentMessages", with = "base64_messages")]
    pub sent_messages: Vec<Vec<u8>>,
    #[serde(rename = "WaitForCommit")]
    pub wait_for_commit: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SendMessagesReply {
    #[serde(rename = "Result", default)]
    pub result: ResultInfo,
    #[serde(rename = "IDs")]
    pub ids: Vec<u64>,
}

impl RemoteCall for SendMessagesArgs {
    const METHOD: Method = Method::SendMessages;
    type Reply = SendMessagesReply;
}

impl RemoteReply for SendMessagesReply {}

/// Arguments of the cluster identity check. Serializes as `{}`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GetClusterDetailsArgs {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClusterDetailsReply {
    #[serde(rename = "Result", default)]
    pub result: ResultInfo,
    #[serde(rename = "ClusterID")]
    pub cluster_id: String,
    #[serde(rename = "Peers", default)]
    pub peers: Vec<String>,
    #[serde(rename = "Topics", default)]
    pub topics: Vec<String>,
}

impl RemoteCall for GetClusterDetailsArgs {
    const METHOD: Method = Method::GetClusterDetails;
    type Reply = ClusterDetailsReply;
}

impl RemoteReply for ClusterDetailsReply {}

/// Serde adapter carrying a list of byte payloads as base64 strings.
mod base64_messages {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(messages: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(messages.iter().map(|m| STANDARD.encode(m)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
        encoded
            .iter()
            .map(|m| STANDARD.decode(m).map_err(serde::de::Error::custom))
            .collect()
    }
}
