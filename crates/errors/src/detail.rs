//! 线上错误详情
//!
//! 失败的调用以 `tonic::Status` 返回，details 中携带 prost 编码的
//! `RpcStatus`，其中包含完整的数字错误码和 `ErrorInfo`。

use prost::Message;
use thiserror::Error;

pub const ERROR_INFO_TYPE_URL: &str = "type.googleapis.com/rpcmw.errinfo.ErrorInfo";

/// 错误详情，唯一字段为原始错误文本
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct ErrorInfo {
    #[prost(string, tag = "1")]
    pub cause: String,
}

/// details 中携带的完整状态
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcStatus {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<prost_types::Any>,
}

#[derive(Debug, Error)]
pub enum DetailError {
    #[error("encode status details: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("decode status details: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("status details carry no ErrorInfo")]
    MissingErrorInfo,
}

/// 归一化后的错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedError {
    pub code: u32,
    pub message: String,
    pub cause: ErrorInfo,
}

impl NormalizedError {
    /// 以原始错误文本同时作为消息和详情
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code,
            cause: ErrorInfo {
                cause: message.clone(),
            },
            message,
        }
    }

    /// 传输层原生状态码；超出 gRPC 范围的业务码映射为 `Unknown`
    pub fn transport_code(&self) -> tonic::Code {
        transport_code(self.code)
    }
}

pub fn transport_code(code: u32) -> tonic::Code {
    i32::try_from(code)
        .map(tonic::Code::from_i32)
        .unwrap_or(tonic::Code::Unknown)
}

/// 构造线上状态，附加详情可能失败
pub trait StatusBuilder: Send + Sync {
    fn build(&self, error: &NormalizedError) -> Result<tonic::Status, DetailError>;
}

/// 基于 prost 编码的默认实现
#[derive(Debug, Clone, Copy, Default)]
pub struct ProstStatusBuilder;

impl StatusBuilder for ProstStatusBuilder {
    fn build(&self, error: &NormalizedError) -> Result<tonic::Status, DetailError> {
        let mut info = Vec::with_capacity(error.cause.encoded_len());
        error.cause.encode(&mut info)?;

        let status = RpcStatus {
            code: error.code,
            message: error.message.clone(),
            details: vec![prost_types::Any {
                type_url: ERROR_INFO_TYPE_URL.to_string(),
                value: info,
            }],
        };
        let mut details = Vec::with_capacity(status.encoded_len());
        status.encode(&mut details)?;

        Ok(tonic::Status::with_details(
            error.transport_code(),
            error.message.clone(),
            details.into(),
        ))
    }
}

/// 调用方解出的远端错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub code: u32,
    pub message: String,
    pub cause: ErrorInfo,
}

impl RemoteError {
    /// 从 `tonic::Status` 的 details 中解出错误码与 `ErrorInfo`
    pub fn from_status(status: &tonic::Status) -> Result<Self, DetailError> {
        let decoded = RpcStatus::decode(status.details())?;
        let any = decoded
            .details
            .iter()
            .find(|any| any.type_url == ERROR_INFO_TYPE_URL)
            .ok_or(DetailError::MissingErrorInfo)?;
        let cause = ErrorInfo::decode(any.value.as_slice())?;

        Ok(Self {
            code: decoded.code,
            message: decoded.message,
            cause,
        })
    }
}
