//! Metrics 模块
//!
//! 拦截器的调用计数与耗时，由全局 recorder（见 `rpcmw_telemetry::init_metrics`）导出

use metrics::{counter, histogram};

/// 记录一次一元调用
pub fn record_rpc_call(method: &str, outcome: &str, code: tonic::Code, duration_ms: f64) {
    let labels = [
        ("method", method.to_string()),
        ("outcome", outcome.to_string()),
        ("code", i32::from(code).to_string()),
    ];

    let duration_labels = [
        ("method", method.to_string()),
        ("outcome", outcome.to_string()),
    ];

    counter!("rpc_server_requests_total", &labels).increment(1);
    histogram!("rpc_server_request_duration_ms", &duration_labels).record(duration_ms);
}
