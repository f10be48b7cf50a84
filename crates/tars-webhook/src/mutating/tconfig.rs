use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use tars_common::keys;
use tars_common::Result;

use super::patch::PatchBuilder;
use super::{now, str_at};
use crate::admission::AdmissionView;

/// 主配置的 podSeq
pub const MASTER_POD_SEQ: &str = "m";

/// 配置版本号：`<%Y%m%d%H%M%S>-<crc32(name) 的 8 位十六进制>`
pub fn config_version(name: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}-{:08x}",
        at.format("%Y%m%d%H%M%S"),
        crc32fast::hash(name.as_bytes())
    )
}

fn labels(object: &Value, pod_seq: &str, version: Option<String>) -> Vec<(&'static str, Option<String>)> {
    let activated = object.get("activated").and_then(Value::as_bool).unwrap_or(false);
    vec![
        (keys::SERVER_APP_LABEL, str_at(object, "/app").map(str::to_string)),
        (
            keys::SERVER_NAME_LABEL,
            str_at(object, "/server").filter(|s| !s.is_empty()).map(str::to_string),
        ),
        (keys::CONFIG_NAME_LABEL, str_at(object, "/configName").map(str::to_string)),
        (keys::POD_SEQ_LABEL, Some(pod_seq.to_string())),
        (keys::ACTIVATED_LABEL, Some(activated.to_string())),
        (keys::VERSION_LABEL, version),
    ]
}

/// TConfig 创建：补全 podSeq、生成版本号、打标签
pub fn mutate_create(view: &AdmissionView) -> Result<PatchBuilder> {
    let object = view.object()?;
    let mut builder = PatchBuilder::new();

    let pod_seq = match str_at(object, "/podSeq").filter(|s| !s.is_empty()) {
        Some(seq) => seq.to_string(),
        None => {
            builder.add("/podSeq", json!(MASTER_POD_SEQ));
            MASTER_POD_SEQ.to_string()
        }
    };

    let name = str_at(object, "/metadata/name").unwrap_or(&view.name);
    let version = config_version(name, Utc::now());
    builder.add("/version", json!(version));
    builder.add("/updateTime", now());
    builder.sync_labels(object, &labels(object, &pod_seq, Some(version)));

    Ok(builder)
}

/// TConfig 更新：重新同步标签，激活状态变化时刷新 updateTime
pub fn mutate_update(view: &AdmissionView) -> Result<PatchBuilder> {
    let object = view.object()?;
    let old = view.old_object()?;
    let mut builder = PatchBuilder::new();

    let pod_seq = str_at(object, "/podSeq").unwrap_or(MASTER_POD_SEQ).to_string();
    let version = str_at(object, "/version").map(str::to_string);
    builder.sync_labels(object, &labels(object, &pod_seq, version));

    if object.get("activated") != old.get("activated") {
        builder.add("/updateTime", now());
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::tests::view;
    use crate::admission::ResourceKind;
    use chrono::TimeZone;
    use kube::core::admission::Operation;
    use regex::Regex;

    fn config() -> Value {
        json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TConfig",
            "metadata": {"name": "test-hello-conf-abcde", "namespace": "tars"},
            "app": "Test",
            "server": "Hello",
            "configName": "hello.conf",
            "configContent": "<tars/>",
            "activated": true
        })
    }

    #[test]
    fn test_config_version_format() {
        let at = Utc.with_ymd_and_hms(2023, 6, 1, 8, 30, 5).unwrap();
        let version = config_version("test-hello-conf-abcde", at);
        assert!(version.starts_with("20230601083005-"));
        assert!(Regex::new(r"^\d{14}-[0-9a-f]{8}$").unwrap().is_match(&version));
        assert_eq!(version, config_version("test-hello-conf-abcde", at));
    }

    #[test]
    fn test_create_fills_defaults_and_labels() {
        let object = config();
        let view = view(Operation::Create, ResourceKind::TConfig, Some(object.clone()), None);
        let patch = mutate_create(&view).unwrap().build().unwrap();

        let mut out = object;
        json_patch::patch(&mut out, &patch).unwrap();
        assert_eq!(out["podSeq"], json!("m"));
        assert!(out["updateTime"].is_string());
        let labels = &out["metadata"]["labels"];
        assert_eq!(labels["tars.io/PodSeq"], json!("m"));
        assert_eq!(labels["tars.io/Activated"], json!("true"));
        assert_eq!(labels["tars.io/ConfigName"], json!("hello.conf"));
        assert_eq!(labels["tars.io/Version"], out["version"]);
    }

    #[test]
    fn test_app_level_config_has_no_server_label() {
        let mut object = config();
        object["server"] = json!("");
        let view = view(Operation::Create, ResourceKind::TConfig, Some(object.clone()), None);
        let patch = mutate_create(&view).unwrap().build().unwrap();

        let mut out = object;
        json_patch::patch(&mut out, &patch).unwrap();
        assert!(out["metadata"]["labels"].get("tars.io/ServerName").is_none());
    }

    #[test]
    fn test_update_refreshes_time_on_activation_change() {
        let mut old = config();
        old["podSeq"] = json!("m");
        old["version"] = json!("20230601083005-0badf00d");
        old["activated"] = json!(false);
        let new = {
            let mut new = old.clone();
            new["activated"] = json!(true);
            new
        };

        let view = view(Operation::Update, ResourceKind::TConfig, Some(new.clone()), Some(old));
        let patch = mutate_update(&view).unwrap().build().unwrap();
        let mut out = new;
        json_patch::patch(&mut out, &patch).unwrap();
        assert!(out["updateTime"].is_string());
        assert_eq!(out["metadata"]["labels"]["tars.io/Activated"], json!("true"));
    }
}
