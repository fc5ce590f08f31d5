//! 错误码注册表

use std::error::Error as StdError;
use std::fmt;

use crate::{AppError, CodeError};

/// 错误码查询能力
///
/// 返回 `None` 表示该错误类型没有已知的错误码
pub trait CodeMapper: Send + Sync {
    fn code_for(&self, err: &(dyn StdError + 'static)) -> Option<i64>;
}

type Mapper = Box<dyn Fn(&(dyn StdError + 'static)) -> Option<i64> + Send + Sync>;

/// 按错误类型注册的错误码表
///
/// 查询时按注册顺序逐一尝试 downcast，第一个命中的映射生效
pub struct CodeRegistry {
    mappers: Vec<Mapper>,
}

impl CodeRegistry {
    /// 创建空注册表
    pub fn empty() -> Self {
        Self {
            mappers: Vec::new(),
        }
    }

    /// 注册一种错误类型的错误码映射
    pub fn register<E, F>(mut self, code_of: F) -> Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> i64 + Send + Sync + 'static,
    {
        self.mappers.push(Box::new(move |err: &(dyn StdError + 'static)| {
            err.downcast_ref::<E>().map(&code_of)
        }));
        self
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}

impl Default for CodeRegistry {
    /// 预注册 `CodeError`、`AppError` 与 `tonic::Status`
    fn default() -> Self {
        Self::empty()
            .register(|err: &CodeError| err.code())
            .register(|err: &AppError| err.code())
            .register(|status: &tonic::Status| status.code() as i64)
    }
}

impl CodeMapper for CodeRegistry {
    fn code_for(&self, err: &(dyn StdError + 'static)) -> Option<i64> {
        self.mappers.iter().find_map(|mapper| mapper(err))
    }
}

impl fmt::Debug for CodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeRegistry")
            .field("mappers", &self.mappers.len())
            .finish()
    }
}
