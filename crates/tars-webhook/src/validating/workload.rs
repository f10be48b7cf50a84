use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::admission::Operation;
use serde_json::Value;

use tars_common::crd::GROUP;
use tars_common::Result;

use super::{reject, Validator};
use crate::admission::AdmissionView;

/// 对象由某个 TServer 派生
fn owned_by_tserver(object: &Value) -> Result<bool> {
    let meta: ObjectMeta = match object.get("metadata") {
        Some(meta) => serde_json::from_value(meta.clone())?,
        None => return Ok(false),
    };
    let prefix = format!("{GROUP}/");
    Ok(meta
        .owner_references
        .unwrap_or_default()
        .iter()
        .any(|owner| owner.kind == "TServer" && owner.api_version.starts_with(&prefix)))
}

/// TServer 派生的 StatefulSet、DaemonSet、Service 只允许控制器修改
pub fn validate(validator: &Validator, view: &AdmissionView) -> Result<()> {
    if validator.is_controller(&view.username) {
        return Ok(());
    }
    let object = match view.operation {
        Operation::Delete => view.old_object()?,
        _ => view.object()?,
    };
    if owned_by_tserver(object)? {
        return reject("should be modified through tserver");
    }
    Ok(())
}
