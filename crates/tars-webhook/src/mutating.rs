//! 准入修改模块
//!
//! 按 (操作, 资源类型) 分发到各资源的处理函数，产出 JSON Patch。
//! 未注册的组合返回错误，由调用方拒绝请求。

use chrono::{SecondsFormat, Utc};
use json_patch::Patch;
use kube::core::admission::Operation;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use tars_common::crd::{v1beta1, v1beta2, v1beta3, ApiVersion};
use tars_common::{Error, Result};

use crate::admission::{unsupported, AdmissionView, ResourceKind};

pub mod patch;
pub mod resources;
pub mod taccount;
pub mod tconfig;
pub mod tserver;

use patch::PatchBuilder;

/// 当前时间，RFC 3339 格式精确到秒
pub(crate) fn now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// 字段缺失、为 null 或为空字符串
pub(crate) fn is_unset(value: Option<&Value>) -> bool {
    value.map_or(true, |v| v.is_null() || v.as_str() == Some(""))
}

/// 按 JSON Pointer 读取字符串字段
pub(crate) fn str_at<'a>(object: &'a Value, pointer: &str) -> Option<&'a str> {
    object.pointer(pointer).and_then(Value::as_str)
}

/// 按对象声明的版本反序列化一次，拒绝结构不合法的对象
fn ensure_well_formed(view: &AdmissionView) -> Result<()> {
    let object = view.object()?;
    let version = match str_at(object, "/apiVersion") {
        Some(raw) => raw.parse::<ApiVersion>().map_err(|e| Error::Mutation(e.to_string()))?,
        None => ApiVersion::HUB,
    };

    match (view.kind, version) {
        (ResourceKind::TServer, ApiVersion::V1beta1) => decode::<v1beta1::TServer>(object),
        (ResourceKind::TServer, ApiVersion::V1beta2) => decode::<v1beta2::TServer>(object),
        (ResourceKind::TServer, ApiVersion::V1beta3) => decode::<v1beta3::TServer>(object),
        (ResourceKind::TConfig, ApiVersion::V1beta2) => decode::<v1beta2::TConfig>(object),
        (ResourceKind::TConfig, ApiVersion::V1beta3) => decode::<v1beta3::TConfig>(object),
        (ResourceKind::TImage, ApiVersion::V1beta2) => decode::<v1beta2::TImage>(object),
        (ResourceKind::TImage, ApiVersion::V1beta3) => decode::<v1beta3::TImage>(object),
        (ResourceKind::TAccount, ApiVersion::V1beta2) => decode::<v1beta2::TAccount>(object),
        (ResourceKind::TAccount, ApiVersion::V1beta3) => decode::<v1beta3::TAccount>(object),
        (ResourceKind::TTemplate, ApiVersion::V1beta2) => decode::<v1beta2::TTemplate>(object),
        (ResourceKind::TTemplate, ApiVersion::V1beta3) => decode::<v1beta3::TTemplate>(object),
        (ResourceKind::TTree, ApiVersion::V1beta2) => decode::<v1beta2::TTree>(object),
        (ResourceKind::TTree, ApiVersion::V1beta3) => decode::<v1beta3::TTree>(object),
        (ResourceKind::TFrameworkConfig, ApiVersion::V1beta2) => decode::<v1beta2::TFrameworkConfig>(object),
        (ResourceKind::TFrameworkConfig, ApiVersion::V1beta3) => decode::<v1beta3::TFrameworkConfig>(object),
        (kind, version) => Err(Error::Mutation(format!("{kind} is not served at {version}"))),
    }
}

fn decode<K: DeserializeOwned>(object: &Value) -> Result<()> {
    K::deserialize(object)
        .map(drop)
        .map_err(|e| Error::Mutation(format!("malformed object: {e}")))
}

/// 生成修改补丁，无需修改时返回 None
pub fn mutate(view: &AdmissionView) -> Result<Option<Patch>> {
    use Operation::{Create, Update};

    let handler: fn(&AdmissionView) -> Result<PatchBuilder> = match (&view.operation, view.kind) {
        (Create | Update, ResourceKind::TServer) => tserver::mutate,
        (Create, ResourceKind::TConfig) => tconfig::mutate_create,
        (Update, ResourceKind::TConfig) => tconfig::mutate_update,
        (Create | Update, ResourceKind::TImage) => resources::mutate_timage,
        (Create | Update, ResourceKind::TAccount) => taccount::mutate,
        (Create | Update, ResourceKind::TTemplate) => resources::mutate_ttemplate,
        (Create | Update, ResourceKind::TTree) => resources::mutate_ttree,
        (Create | Update, ResourceKind::TFrameworkConfig) => |_| Ok(PatchBuilder::new()),
        _ => return Err(unsupported(view)),
    };
    ensure_well_formed(view)?;
    Ok(handler(view)?.build())
}
