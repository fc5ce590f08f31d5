//! RPC 消息能力：请求校验与日志渲染

use std::fmt;

use rpcmw_errors::AppResult;

/// 经过拦截器的请求/响应消息
///
/// 两个方法都有默认实现：校验默认通过，渲染默认使用 `Debug`。
/// 需要字段校验或脱敏输出的消息覆盖对应方法即可。
pub trait RpcMessage: fmt::Debug {
    fn validate(&self) -> AppResult<()> {
        Ok(())
    }

    fn rpc_string(&self) -> String {
        format!("{:?}", self)
    }
}

impl RpcMessage for () {}

impl<T: RpcMessage> RpcMessage for tonic::Request<T> {
    fn validate(&self) -> AppResult<()> {
        self.get_ref().validate()
    }

    fn rpc_string(&self) -> String {
        self.get_ref().rpc_string()
    }
}

impl<T: RpcMessage> RpcMessage for tonic::Response<T> {
    fn validate(&self) -> AppResult<()> {
        self.get_ref().validate()
    }

    fn rpc_string(&self) -> String {
        self.get_ref().rpc_string()
    }
}

/// 为消息类型批量实现默认的 `RpcMessage`
///
/// ```ignore
/// rpc_message!(GetUserResp, ListUsersReq, ListUsersResp);
/// ```
#[macro_export]
macro_rules! rpc_message {
    ($($ty:ty),+ $(,)?) => {
        $(impl $crate::RpcMessage for $ty {})+
    };
}
