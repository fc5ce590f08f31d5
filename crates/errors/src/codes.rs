//! 业务错误码

/// 通用内部错误，同时作为兜底码
pub const SERVER_INTERNAL_ERROR: i64 = 500;

pub const ARGS_ERROR: i64 = 1001;
pub const NO_PERMISSION: i64 = 1002;
pub const DUPLICATE_KEY: i64 = 1003;
pub const RECORD_NOT_FOUND: i64 = 1004;
pub const PRECONDITION_FAILED: i64 = 1005;
pub const RESOURCE_EXHAUSTED: i64 = 1006;
pub const NETWORK_ERROR: i64 = 1007;

pub const TOKEN_INVALID: i64 = 1502;
