//! gRPC Interceptors
//!
//! 一元调用拦截器：元数据校验 → 上下文注入 → 请求日志与校验 →
//! 处理器 → 成功日志或错误归一化

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use rpcmw_config::{ConfigError, InterceptorConfig, MetadataKeys};
use rpcmw_errors::{
    BoxError, CapturedSymbols, CodeMapper, StackFormatter, StackTrace, StatusBuilder,
    SymbolResolver,
};
use tonic::{Request, Response, Status};
use tracing::{Instrument, info, info_span};

use crate::context::{CallContext, enrich_context};
use crate::message::RpcMessage;
use crate::metadata::{CallMetadata, validate_metadata};
use crate::normalizer::{CodeBounds, ErrorNormalizer};
use crate::rpc_metrics::record_rpc_call;

/// `/pkg.Service/Method` → `Method`
pub fn extract_function_name(full_method: &str) -> &str {
    full_method.rsplit('/').next().unwrap_or(full_method)
}

/// 一元 RPC 服务端拦截器
///
/// 无内部可变状态，克隆后可在各服务实现间共享
#[derive(Clone)]
pub struct RpcServerInterceptor {
    keys: Arc<MetadataKeys>,
    normalizer: ErrorNormalizer,
}

impl RpcServerInterceptor {
    /// 按配置构造，配置不合法时返回错误
    pub fn new(config: &InterceptorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let bounds = CodeBounds::try_from(&config.codes)?;

        let formatter = match &config.stack.internal_markers {
            Some(markers) => StackFormatter::new(Arc::new(CapturedSymbols), markers.clone()),
            None => StackFormatter::default(),
        };

        Ok(Self {
            keys: Arc::new(config.metadata.clone()),
            normalizer: ErrorNormalizer::new(bounds).with_formatter(formatter),
        })
    }

    /// 替换错误码映射
    pub fn with_code_mapper(mut self, codes: Arc<dyn CodeMapper>) -> Self {
        self.normalizer = self.normalizer.with_code_mapper(codes);
        self
    }

    /// 替换线上状态构造
    pub fn with_status_builder(mut self, status_builder: Arc<dyn StatusBuilder>) -> Self {
        self.normalizer = self.normalizer.with_status_builder(status_builder);
        self
    }

    /// 替换符号解析器
    pub fn with_symbol_resolver(mut self, resolver: Arc<dyn SymbolResolver>) -> Self {
        let formatter = self.normalizer.formatter().clone().with_resolver(resolver);
        self.normalizer = self.normalizer.with_formatter(formatter);
        self
    }

    /// 登记一种带调用栈的错误类型
    pub fn with_stack_type<E>(mut self) -> Self
    where
        E: std::error::Error + StackTrace + 'static,
    {
        let formatter = self.normalizer.formatter().clone().with_stack_type::<E>();
        self.normalizer = self.normalizer.with_formatter(formatter);
        self
    }

    pub fn keys(&self) -> &MetadataKeys {
        &self.keys
    }

    pub fn normalizer(&self) -> &ErrorNormalizer {
        &self.normalizer
    }

    /// 拦截一次一元调用
    ///
    /// 元数据不合法时直接返回 `InvalidArgument`，不输出日志，也不调用处理器
    pub async fn intercept_unary<Req, Resp, H, Fut, E>(
        &self,
        func_name: &str,
        metadata: Option<&CallMetadata>,
        request: Req,
        handler: H,
    ) -> Result<Resp, Status>
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        H: FnOnce(CallContext, Req) -> Fut,
        Fut: Future<Output = Result<Resp, E>>,
        E: Into<BoxError>,
    {
        let started = Instant::now();
        let result = self.handle(func_name, metadata, request, handler).await;

        let (outcome, code) = match &result {
            Ok(_) => ("ok", tonic::Code::Ok),
            Err(status) => ("error", status.code()),
        };
        record_rpc_call(
            func_name,
            outcome,
            code,
            started.elapsed().as_secs_f64() * 1000.0,
        );

        result
    }

    async fn handle<Req, Resp, H, Fut, E>(
        &self,
        func_name: &str,
        metadata: Option<&CallMetadata>,
        request: Req,
        handler: H,
    ) -> Result<Resp, Status>
    where
        Req: RpcMessage,
        Resp: RpcMessage,
        H: FnOnce(CallContext, Req) -> Fut,
        Fut: Future<Output = Result<Resp, E>>,
        E: Into<BoxError>,
    {
        let metadata = validate_metadata(&self.keys, metadata)?;
        let ctx = enrich_context(&self.keys, metadata)?;

        let method = extract_function_name(func_name);
        let span = info_span!("rpc_server", func_name, operation_id = %ctx.operation_id());

        async move {
            let req = request.rpc_string();
            info!(func_name, req = %req, "RPC Server Request - {}", method);

            request.validate()?;

            let scoped = ctx.clone();
            match scoped.scope(async move { handler(ctx, request).await }).await {
                Ok(resp) => {
                    info!(
                        func_name,
                        resp = %resp.rpc_string(),
                        "RPC Server Response Success - {}",
                        method
                    );
                    Ok(resp)
                }
                Err(err) => {
                    let err: BoxError = err.into();
                    Err(self.normalizer.normalize(func_name, &req, &*err))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// tonic 服务实现使用的入口
    ///
    /// 处理器收到的请求扩展中带有 `CallContext`
    ///
    /// ```ignore
    /// async fn get_user(&self, request: Request<GetUserReq>) -> Result<Response<GetUserResp>, Status> {
    ///     self.interceptor
    ///         .intercept("/im.user.User/GetUser", request, |request| async move {
    ///             let ctx = call_context(&request)?;
    ///             self.users.get(ctx, request.into_inner()).await.map(Response::new)
    ///         })
    ///         .await
    /// }
    /// ```
    pub async fn intercept<T, U, H, Fut, E>(
        &self,
        func_name: &str,
        request: Request<T>,
        handler: H,
    ) -> Result<Response<U>, Status>
    where
        T: RpcMessage,
        U: RpcMessage,
        H: FnOnce(Request<T>) -> Fut,
        Fut: Future<Output = Result<Response<U>, E>>,
        E: Into<BoxError>,
    {
        let metadata = CallMetadata::from_metadata_map(request.metadata());
        self.intercept_unary(func_name, Some(&metadata), request, |ctx, mut request| {
            request.extensions_mut().insert(ctx);
            handler(request)
        })
        .await
    }
}

impl Default for RpcServerInterceptor {
    fn default() -> Self {
        Self {
            keys: Arc::new(MetadataKeys::default()),
            normalizer: ErrorNormalizer::default(),
        }
    }
}
