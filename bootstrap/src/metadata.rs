//! 调用元数据与校验

use rpcmw_config::MetadataKeys;
use tonic::Status;
use tonic::metadata::{KeyAndValueRef, MetadataMap};

/// 有序多值映射，键不区分大小写
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMetadata {
    entries: Vec<(String, Vec<String>)>,
}

impl CallMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个值，键统一转为小写
    pub fn append(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = key.as_ref().to_ascii_lowercase();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value.into()),
            None => self.entries.push((key, vec![value.into()])),
        }
    }

    /// 取出某个键的全部值，不存在时为空
    pub fn get(&self, key: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 从 tonic 元数据构造；二进制键和非可见 ASCII 值被忽略
    pub fn from_metadata_map(map: &MetadataMap) -> Self {
        let mut metadata = Self::new();
        for entry in map.iter() {
            if let KeyAndValueRef::Ascii(key, value) = entry {
                if let Ok(value) = value.to_str() {
                    metadata.append(key.as_str(), value);
                }
            }
        }
        metadata
    }
}

impl From<&MetadataMap> for CallMetadata {
    fn from(map: &MetadataMap) -> Self {
        Self::from_metadata_map(map)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for CallMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Self::new();
        for (key, value) in iter {
            metadata.append(key, value);
        }
        metadata
    }
}

/// 校验元数据
///
/// 必须存在且 operationID 恰好一个值；此阶段不输出日志
#[allow(clippy::result_large_err)]
pub fn validate_metadata<'a>(
    keys: &MetadataKeys,
    metadata: Option<&'a CallMetadata>,
) -> Result<&'a CallMetadata, Status> {
    let metadata = metadata.ok_or_else(|| Status::invalid_argument("missing metadata"))?;
    if metadata.get(&keys.operation_id).len() != 1 {
        return Err(Status::invalid_argument("operationID error"));
    }
    Ok(metadata)
}
