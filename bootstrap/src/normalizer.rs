//! 错误归一化
//!
//! 把处理器返回的任意错误转换为带数字错误码和 `ErrorInfo` 详情的 `Status`

use std::error::Error as StdError;
use std::sync::Arc;

use rpcmw_config::{CodeConfig, ConfigError};
use rpcmw_errors::{
    CodeMapper, CodeRegistry, NormalizedError, ProstStatusBuilder, StackFormatter, StatusBuilder,
    root_cause,
};
use tonic::Status;
use tracing::{error, warn};

use crate::interceptor::extract_function_name;

/// 合法错误码范围 `(0, max_code]` 与兜底内部错误码
///
/// 兜底码必须落在范围内，否则错误可能以 `Code::Ok` 返回
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeBounds {
    max_code: u32,
    internal_code: u32,
}

impl CodeBounds {
    pub fn new(max_code: u32, internal_code: u32) -> Result<Self, ConfigError> {
        Self::try_from(&CodeConfig {
            max_code,
            internal_code,
        })
    }

    pub fn max_code(&self) -> u32 {
        self.max_code
    }

    pub fn internal_code(&self) -> u32 {
        self.internal_code
    }

    pub fn accept(&self, code: i64) -> Option<u32> {
        if code > 0 && code <= i64::from(self.max_code) {
            u32::try_from(code).ok()
        } else {
            None
        }
    }
}

impl Default for CodeBounds {
    fn default() -> Self {
        let config = CodeConfig::default();
        Self {
            max_code: config.max_code,
            internal_code: config.internal_code,
        }
    }
}

impl TryFrom<&CodeConfig> for CodeBounds {
    type Error = ConfigError;

    fn try_from(config: &CodeConfig) -> Result<Self, Self::Error> {
        config.validate()?;
        Ok(Self {
            max_code: config.max_code,
            internal_code: config.internal_code,
        })
    }
}

/// 错误归一化器
#[derive(Clone)]
pub struct ErrorNormalizer {
    codes: Arc<dyn CodeMapper>,
    bounds: CodeBounds,
    status_builder: Arc<dyn StatusBuilder>,
    formatter: StackFormatter,
}

impl ErrorNormalizer {
    pub fn new(bounds: CodeBounds) -> Self {
        Self {
            codes: Arc::new(CodeRegistry::default()),
            bounds,
            status_builder: Arc::new(ProstStatusBuilder),
            formatter: StackFormatter::default(),
        }
    }

    pub fn with_code_mapper(mut self, codes: Arc<dyn CodeMapper>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_status_builder(mut self, status_builder: Arc<dyn StatusBuilder>) -> Self {
        self.status_builder = status_builder;
        self
    }

    pub fn with_formatter(mut self, formatter: StackFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn bounds(&self) -> CodeBounds {
        self.bounds
    }

    pub fn formatter(&self) -> &StackFormatter {
        &self.formatter
    }

    /// 解析最终错误码
    ///
    /// 根因无映射或映射越界时记录 error 日志并回退到内部错误码
    pub fn resolve_code(&self, func_name: &str, request: &str, err: &(dyn StdError + 'static)) -> u32 {
        let code = match self.codes.code_for(root_cause(err)) {
            Some(code) => code,
            None => {
                error!(
                    func_name,
                    req = request,
                    error = %self.formatter.format_error(err),
                    "rpc InternalServer error"
                );
                i64::from(self.bounds.internal_code)
            }
        };

        match self.bounds.accept(code) {
            Some(code) => code,
            None => {
                error!(
                    func_name,
                    unknown_code = code,
                    error = %self.formatter.format_error(err),
                    "rpc UnknownError"
                );
                self.bounds.internal_code
            }
        }
    }

    /// 归一化为线上状态，消息与详情始终为原始错误文本
    pub fn normalize(&self, func_name: &str, request: &str, err: &(dyn StdError + 'static)) -> Status {
        let code = self.resolve_code(func_name, request, err);
        let normalized = NormalizedError::new(code, error_message(err));

        match self.status_builder.build(&normalized) {
            Ok(status) => {
                warn!(
                    func_name,
                    req = request,
                    code,
                    error = %self.formatter.format_error(err),
                    "RPC Server Response Error - {}",
                    extract_function_name(func_name)
                );
                status
            }
            Err(detail_err) => {
                warn!(func_name, error = %detail_err, "rpc server resp WithDetails error");
                Status::unknown(format!("rpc server resp WithDetails error: {}", detail_err))
            }
        }
    }
}

/// `Status` 取其 message，其余错误取 `Display`
fn error_message(err: &(dyn StdError + 'static)) -> String {
    match err.downcast_ref::<Status>() {
        Some(status) => status.message().to_string(),
        None => err.to_string(),
    }
}

impl Default for ErrorNormalizer {
    fn default() -> Self {
        Self::new(CodeBounds::default())
    }
}
