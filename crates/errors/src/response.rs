//! HTTP 网关使用的统一响应体

use serde::{Deserialize, Serialize};

use crate::{CodeError, NormalizedError};

/// `{"errCode":0,"errMsg":"","errDlt":"","data":...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T = serde_json::Value> {
    pub err_code: i64,
    pub err_msg: String,
    #[serde(default)]
    pub err_dlt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            err_code: 0,
            err_msg: String::new(),
            err_dlt: String::new(),
            data: Some(data),
        }
    }

    pub fn is_success(&self) -> bool {
        self.err_code == 0
    }
}

impl ApiResponse {
    /// 由归一化错误构造
    pub fn from_normalized(error: &NormalizedError) -> Self {
        Self {
            err_code: error.code as i64,
            err_msg: error.message.clone(),
            err_dlt: error.cause.cause.clone(),
            data: None,
        }
    }

    pub fn from_code_error(error: &CodeError) -> Self {
        Self {
            err_code: error.code(),
            err_msg: error.msg().to_string(),
            err_dlt: error.detail().unwrap_or_default().to_string(),
            data: None,
        }
    }
}
