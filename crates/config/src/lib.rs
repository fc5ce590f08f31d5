//! rpcmw-config - 配置加载库

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 输出 JSON 日志；生产环境总是输出 JSON
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
        }
    }
}

/// 元数据键名
///
/// gRPC 元数据键在传输中统一为小写
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetadataKeys {
    #[serde(default = "default_operation_id_key")]
    pub operation_id: String,
    #[serde(default = "default_custom_header_key")]
    pub custom_header: String,
    #[serde(default = "default_op_user_id_key")]
    pub op_user_id: String,
    #[serde(default = "default_op_user_platform_key")]
    pub op_user_platform: String,
    #[serde(default = "default_conn_id_key")]
    pub conn_id: String,
}

fn default_operation_id_key() -> String {
    "operationid".to_string()
}

fn default_custom_header_key() -> String {
    "customheader".to_string()
}

fn default_op_user_id_key() -> String {
    "opuserid".to_string()
}

fn default_op_user_platform_key() -> String {
    "platform".to_string()
}

fn default_conn_id_key() -> String {
    "connid".to_string()
}

impl Default for MetadataKeys {
    fn default() -> Self {
        Self {
            operation_id: default_operation_id_key(),
            custom_header: default_custom_header_key(),
            op_user_id: default_op_user_id_key(),
            op_user_platform: default_op_user_platform_key(),
            conn_id: default_conn_id_key(),
        }
    }
}

/// 错误码边界
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CodeConfig {
    /// 合法错误码上限（含）
    #[serde(default = "default_max_code")]
    pub max_code: u32,
    /// 无映射或越界时使用的内部错误码
    #[serde(default = "default_internal_code")]
    pub internal_code: u32,
}

fn default_max_code() -> u32 {
    u32::MAX
}

fn default_internal_code() -> u32 {
    500
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            max_code: default_max_code(),
            internal_code: default_internal_code(),
        }
    }
}

impl CodeConfig {
    /// 兜底码必须落在 `(0, max_code]` 内
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.internal_code == 0 {
            return Err(ConfigError::Invalid(
                "interceptor.codes.internal_code must be positive".to_string(),
            ));
        }
        if self.internal_code > self.max_code {
            return Err(ConfigError::Invalid(format!(
                "interceptor.codes.internal_code {} exceeds max_code {}",
                self.internal_code, self.max_code
            )));
        }
        Ok(())
    }
}

/// 调用栈格式化配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StackConfig {
    /// 需要过滤的运行时帧标记；未配置时使用内置列表
    #[serde(default)]
    pub internal_markers: Option<Vec<String>>,
}

/// 拦截器配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InterceptorConfig {
    #[serde(default)]
    pub metadata: MetadataKeys,
    #[serde(default)]
    pub codes: CodeConfig,
    #[serde(default)]
    pub stack: StackConfig,
}

impl InterceptorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.codes.validate()?;
        if self.metadata.operation_id.is_empty() {
            return Err(ConfigError::Invalid(
                "interceptor.metadata.operation_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub interceptor: InterceptorConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 环境变量以 `RPCMW_` 为前缀，`__` 分隔层级，
    /// 例如 `RPCMW_INTERCEPTOR__CODES__INTERNAL_CODE=9999`
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config: Self = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("RPCMW_").split("__"))
            .extract()?;

        config.interceptor.validate()?;
        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
