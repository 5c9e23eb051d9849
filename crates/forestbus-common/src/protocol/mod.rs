pub mod error;
pub mod methods;
pub mod requests;
pub mod responses;


pub use error::{ForestBusError, Result};
pub use methods::{
    ClusterDetailsReply, GetClusterDetailsArgs, GetTopicDetailsArgs, Method, ReceiveMessagesArgs,
    ReceiveMessagesReply, RemoteCall, RemoteReply, ResultCode, ResultInfo, SendMessagesArgs,
    SendMessagesReply, TopicDetailsReply,
};
pub use requests::{Request, RequestId, RpcArgs};
pub use responses::{Response, RpcResult};
