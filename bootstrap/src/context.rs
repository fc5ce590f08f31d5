//! 调用上下文
//!
//! 每次调用从元数据投影出一个不可变的 `CallContext`，
//! 调用结束即丢弃，不在调用之间共享。

use std::future::Future;

use rpcmw_config::MetadataKeys;
use tonic::metadata::{Ascii, MetadataKey, MetadataMap, MetadataValue};
use tonic::{Request, Status};

use crate::metadata::CallMetadata;

tokio::task_local! {
    static CURRENT_CALL: CallContext;
}

/// 自定义头：键列表及各键对应的值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomHeaders {
    keys: Vec<String>,
    values: Vec<(String, Vec<String>)>,
}

impl CustomHeaders {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, values)| values.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }
}

/// 调用上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    operation_id: String,
    custom_headers: Option<CustomHeaders>,
    op_user_id: Option<String>,
    op_user_platform: Option<String>,
    conn_id: Option<String>,
}

impl CallContext {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            custom_headers: None,
            op_user_id: None,
            op_user_platform: None,
            conn_id: None,
        }
    }

    pub fn with_custom_headers(mut self, headers: CustomHeaders) -> Self {
        self.custom_headers = Some(headers);
        self
    }

    pub fn with_op_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.op_user_id = Some(user_id.into());
        self
    }

    pub fn with_op_user_platform(mut self, platform: impl Into<String>) -> Self {
        self.op_user_platform = Some(platform.into());
        self
    }

    pub fn with_conn_id(mut self, conn_id: impl Into<String>) -> Self {
        self.conn_id = Some(conn_id.into());
        self
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn custom_headers(&self) -> Option<&CustomHeaders> {
        self.custom_headers.as_ref()
    }

    pub fn op_user_id(&self) -> Option<&str> {
        self.op_user_id.as_deref()
    }

    pub fn op_user_platform(&self) -> Option<&str> {
        self.op_user_platform.as_deref()
    }

    pub fn conn_id(&self) -> Option<&str> {
        self.conn_id.as_deref()
    }

    /// 当前任务所在调用的上下文
    pub fn current() -> Option<CallContext> {
        CURRENT_CALL.try_with(Clone::clone).ok()
    }

    /// 在该上下文内运行 future，期间 `CallContext::current()` 可见
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT_CALL.scope(self, fut).await
    }

    /// 写回出站元数据，用于向下游服务传递
    #[allow(clippy::result_large_err)]
    pub fn propagate_into(&self, keys: &MetadataKeys, map: &mut MetadataMap) -> Result<(), Status> {
        append_ascii(map, &keys.operation_id, &self.operation_id)?;
        if let Some(headers) = &self.custom_headers {
            for key in headers.keys() {
                append_ascii(map, &keys.custom_header, key)?;
            }
            for (key, values) in headers.iter() {
                for value in values {
                    append_ascii(map, key, value)?;
                }
            }
        }
        let optional = [
            (&keys.op_user_id, &self.op_user_id),
            (&keys.op_user_platform, &self.op_user_platform),
            (&keys.conn_id, &self.conn_id),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                append_ascii(map, key, value)?;
            }
        }
        Ok(())
    }
}

#[allow(clippy::result_large_err)]
fn append_ascii(map: &mut MetadataMap, name: &str, value: &str) -> Result<(), Status> {
    let key = MetadataKey::<Ascii>::from_bytes(name.as_bytes())
        .map_err(|_| Status::internal(format!("invalid metadata key {}", name)))?;
    let value: MetadataValue<Ascii> = value
        .parse()
        .map_err(|_| Status::internal(format!("invalid metadata value for {}", name)))?;
    map.append(key, value);
    Ok(())
}

/// 从元数据构造调用上下文
///
/// 自定义头列表中任一键缺失时整体失败，不返回部分结果
#[allow(clippy::result_large_err)]
pub fn enrich_context(keys: &MetadataKeys, metadata: &CallMetadata) -> Result<CallContext, Status> {
    let custom_headers = collect_custom_headers(keys, metadata)?;

    let operation_id = metadata
        .get(&keys.operation_id)
        .first()
        .ok_or_else(|| Status::invalid_argument("operationID error"))?;

    let mut ctx = CallContext::new(operation_id.clone());
    if let Some(headers) = custom_headers {
        ctx = ctx.with_custom_headers(headers);
    }
    if let Some(user_id) = single(metadata.get(&keys.op_user_id)) {
        ctx = ctx.with_op_user_id(user_id);
    }
    if let Some(platform) = single(metadata.get(&keys.op_user_platform)) {
        ctx = ctx.with_op_user_platform(platform);
    }
    if let Some(conn_id) = single(metadata.get(&keys.conn_id)) {
        ctx = ctx.with_conn_id(conn_id);
    }
    Ok(ctx)
}

#[allow(clippy::result_large_err)]
fn collect_custom_headers(
    keys: &MetadataKeys,
    metadata: &CallMetadata,
) -> Result<Option<CustomHeaders>, Status> {
    let names = metadata.get(&keys.custom_header);
    if names.is_empty() {
        return Ok(None);
    }

    let mut values = Vec::with_capacity(names.len());
    for name in names {
        let found = metadata.get(name);
        if found.is_empty() {
            return Err(Status::invalid_argument(format!("missing metadata key {}", name)));
        }
        values.push((name.clone(), found.to_vec()));
    }

    Ok(Some(CustomHeaders {
        keys: names.to_vec(),
        values,
    }))
}

fn single(values: &[String]) -> Option<&str> {
    match values {
        [value] => Some(value.as_str()),
        _ => None,
    }
}

/// 从请求扩展中获取调用上下文
#[allow(clippy::result_large_err)]
pub fn call_context<T>(request: &Request<T>) -> Result<&CallContext, Status> {
    request
        .extensions()
        .get::<CallContext>()
        .ok_or_else(|| Status::internal("No call context found in request"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    fn metadata(pairs: &[(&str, &str)]) -> CallMetadata {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_enrich_minimal() {
        let keys = MetadataKeys::default();
        let ctx = enrich_context(&keys, &metadata(&[("operationid", "abc123")])).unwrap();

        assert_eq!(ctx, CallContext::new("abc123"));
        assert!(ctx.custom_headers().is_none());
        assert!(ctx.op_user_id().is_none());
    }

    #[test]
    fn test_enrich_optional_fields_only_when_single_valued() {
        let keys = MetadataKeys::default();
        let md = metadata(&[
            ("operationid", "abc123"),
            ("opuserid", "u-1"),
            ("platform", "ios"),
            ("platform", "android"),
        ]);

        let ctx = enrich_context(&keys, &md).unwrap();

        assert_eq!(ctx.op_user_id(), Some("u-1"));
        assert_eq!(ctx.op_user_platform(), None);
        assert_eq!(ctx.conn_id(), None);
    }

    #[test]
    fn test_enrich_custom_headers() {
        let keys = MetadataKeys::default();
        let md = metadata(&[
            ("operationid", "abc123"),
            ("customheader", "tenant"),
            ("customheader", "region"),
            ("tenant", "acme"),
            ("region", "eu"),
            ("region", "us"),
        ]);

        let ctx = enrich_context(&keys, &md).unwrap();
        let headers = ctx.custom_headers().unwrap();

        assert_eq!(headers.keys(), ["tenant", "region"]);
        assert_eq!(headers.get("tenant").unwrap(), ["acme"]);
        assert_eq!(headers.get("region").unwrap(), ["eu", "us"]);
    }

    #[test]
    fn test_enrich_missing_custom_header_key_fails_whole_call() {
        let keys = MetadataKeys::default();
        let md = metadata(&[
            ("operationid", "abc123"),
            ("customheader", "tenant"),
            ("customheader", "region"),
            ("tenant", "acme"),
        ]);

        let err = enrich_context(&keys, &md).unwrap_err();

        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), "missing metadata key region");
    }

    #[test]
    fn test_propagate_round_trip() {
        let keys = MetadataKeys::default();
        let md = metadata(&[
            ("operationid", "abc123"),
            ("customheader", "tenant"),
            ("tenant", "acme"),
            ("opuserid", "u-1"),
            ("connid", "c-9"),
        ]);
        let ctx = enrich_context(&keys, &md).unwrap();

        let mut outgoing = MetadataMap::new();
        ctx.propagate_into(&keys, &mut outgoing).unwrap();
        let downstream = enrich_context(&keys, &CallMetadata::from(&outgoing)).unwrap();

        assert_eq!(downstream, ctx);
    }

    #[test]
    fn test_propagate_rejects_invalid_key() {
        let keys = MetadataKeys::default();
        let headers = CustomHeaders {
            keys: vec!["bad key".to_string()],
            values: vec![("bad key".to_string(), vec!["v".to_string()])],
        };
        let ctx = CallContext::new("abc").with_custom_headers(headers);

        let err = ctx.propagate_into(&keys, &mut MetadataMap::new()).unwrap_err();
        assert_eq!(err.code(), Code::Internal);
    }

    #[tokio::test]
    async fn test_scope_exposes_current_context() {
        assert!(CallContext::current().is_none());

        let ctx = CallContext::new("abc123").with_conn_id("c-1");
        let seen = ctx.clone().scope(async { CallContext::current() }).await;

        assert_eq!(seen, Some(ctx));
        assert!(CallContext::current().is_none());
    }

    #[test]
    fn test_call_context_from_request_extensions() {
        let mut request = Request::new(());
        assert!(call_context(&request).is_err());

        request.extensions_mut().insert(CallContext::new("abc123"));
        assert_eq!(call_context(&request).unwrap().operation_id(), "abc123");
    }
}
