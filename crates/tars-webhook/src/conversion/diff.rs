//! 降级时无法表达的字段，以 JSON 形式暂存在对象注解中

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tars_common::Result;

/// 中心版本相对低版本的差异
///
/// `append` 保存低版本放不下的字段值；`drop` 记录中心版本中原本缺省的字段，
/// 升级时这些字段不再补默认值。
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "PascalCase", bound(deserialize = "A: Deserialize<'de>"))]
pub struct ConversionDiff<A> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<A>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop: Vec<String>,
}

impl<A> Default for ConversionDiff<A> {
    fn default() -> Self {
        Self {
            append: None,
            drop: Vec::new(),
        }
    }
}

impl<A: Default + PartialEq> ConversionDiff<A> {
    /// 构造差异，`append` 为默认值时视为无
    pub fn new(append: A, drop: Vec<String>) -> Self {
        let append = if append == A::default() { None } else { Some(append) };
        Self { append, drop }
    }
}

impl<A> ConversionDiff<A> {
    pub fn is_empty(&self) -> bool {
        self.append.is_none() && self.drop.is_empty()
    }

    /// 字段在中心版本中原本缺省
    pub fn drops(&self, field: &str) -> bool {
        self.drop.iter().any(|f| f == field)
    }
}

/// 取出并移除注解中的差异
///
/// 注解不存在或无法解析时返回空差异。只为承载差异而存在的注解表随之删除，
/// 原本就为空的注解表保持不变。
pub fn take_diff<A: DeserializeOwned>(metadata: &mut ObjectMeta, key: &str) -> ConversionDiff<A> {
    let Some(annotations) = metadata.annotations.as_mut() else {
        return ConversionDiff::default();
    };
    let raw = annotations.remove(key);
    if raw.is_some() && annotations.is_empty() {
        metadata.annotations = None;
    }

    match raw {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("忽略无法解析的转换差异注解 {}: {}", key, e);
            ConversionDiff::default()
        }),
        None => ConversionDiff::default(),
    }
}

/// 写入差异注解；差异为空时删除注解
pub fn put_diff<A: Serialize>(
    metadata: &mut ObjectMeta,
    key: &str,
    diff: &ConversionDiff<A>,
) -> Result<()> {
    if diff.is_empty() {
        if let Some(annotations) = metadata.annotations.as_mut() {
            if annotations.remove(key).is_some() && annotations.is_empty() {
                metadata.annotations = None;
            }
        }
        return Ok(());
    }

    let raw = serde_json::to_string(diff)?;
    metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(key.to_string(), raw);
    Ok(())
}
