//! rpcmw-bootstrap - 一元 RPC 服务端拦截器
//!
//! 所有服务复用的调用拦截逻辑

mod context;
mod interceptor;
mod message;
mod metadata;
mod normalizer;
mod rpc_metrics;
mod runtime;

pub use context::*;
pub use interceptor::*;
pub use message::*;
pub use metadata::*;
pub use normalizer::*;
pub use rpc_metrics::*;
pub use runtime::*;
