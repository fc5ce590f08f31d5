//! 服务运行时

use rpcmw_config::{AppConfig, ConfigError};
use rpcmw_telemetry::{TelemetryError, init_tracing, init_tracing_json};
use thiserror::Error;
use tracing::info;

use crate::interceptor::RpcServerInterceptor;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// 初始化日志并按配置构造拦截器
///
/// 配置不合法时在安装 subscriber 之前返回
pub fn init_runtime(config: &AppConfig) -> Result<RpcServerInterceptor, RuntimeError> {
    let interceptor = RpcServerInterceptor::new(&config.interceptor)?;

    if config.is_production() || config.telemetry.json {
        init_tracing_json(&config.telemetry.log_level)?;
    } else {
        init_tracing(&config.telemetry.log_level)?;
    }

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        operation_id_key = %config.interceptor.metadata.operation_id,
        "Runtime initialized"
    );

    Ok(interceptor)
}
