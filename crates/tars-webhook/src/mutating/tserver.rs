use serde_json::{json, Value};

use tars_common::keys;
use tars_common::{Error, Result};

use super::patch::PatchBuilder;
use super::{is_unset, now, str_at};
use crate::admission::AdmissionView;

/// 读取副本数注解，缺失返回 None，格式错误返回错误
fn replicas_annotation(object: &Value, key: &str) -> Result<Option<i32>> {
    let Some(raw) = object
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(key))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };
    raw.trim()
        .parse::<i32>()
        .map(Some)
        .map_err(|_| Error::Mutation(format!("bad annotation {key}={raw}, expect an integer")))
}

/// 计算期望副本数
///
/// 没有发布时为 0；否则限制在 MinReplicas、MaxReplicas 之间。
pub fn desired_replicas(object: &Value) -> Result<i32> {
    let replicas = match object.pointer("/spec/k8s/replicas").and_then(Value::as_i64) {
        Some(replicas) => i32::try_from(replicas)
            .map_err(|_| Error::Mutation(format!("replicas {replicas} out of range")))?,
        None => 0,
    };

    let max = replicas_annotation(object, keys::MAX_REPLICAS)?;
    let min = replicas_annotation(object, keys::MIN_REPLICAS)?;
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(Error::Mutation(format!(
                "{} {min} is greater than {} {max}",
                keys::MIN_REPLICAS,
                keys::MAX_REPLICAS
            )));
        }
    }

    let has_release = object.pointer("/spec/release").map_or(false, |r| !r.is_null());
    if !has_release {
        return Ok(0);
    }

    let mut desired = replicas;
    if let Some(max) = max {
        desired = desired.min(max);
    }
    if let Some(min) = min {
        desired = desired.max(min);
    }
    Ok(desired)
}

/// TServer 创建与更新
pub fn mutate(view: &AdmissionView) -> Result<PatchBuilder> {
    let object = view.object()?;
    let mut builder = PatchBuilder::new();

    let sub_type = str_at(object, "/spec/subType").unwrap_or("tars");
    let template = if sub_type == "tars" {
        str_at(object, "/spec/tars/template").map(str::to_string)
    } else {
        None
    };
    builder.sync_labels(
        object,
        &[
            (keys::SERVER_APP_LABEL, str_at(object, "/spec/app").map(str::to_string)),
            (keys::SERVER_NAME_LABEL, str_at(object, "/spec/server").map(str::to_string)),
            (keys::SUB_TYPE_LABEL, Some(sub_type.to_string())),
            (keys::TEMPLATE_LABEL, template),
        ],
    );

    let desired = desired_replicas(object)?;
    let current = object.pointer("/spec/k8s/replicas").and_then(Value::as_i64);
    if current != Some(desired as i64) {
        if object.pointer("/spec/k8s").map_or(true, Value::is_null) {
            builder.add("/spec/k8s", json!({ "replicas": desired }));
        } else {
            builder.add("/spec/k8s/replicas", json!(desired));
        }
    }

    let release = object.pointer("/spec/release").filter(|r| !r.is_null());
    if let Some(release) = release {
        if is_unset(release.get("time")) {
            builder.add("/spec/release/time", now());
        }
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::tests::view;
    use crate::admission::ResourceKind;
    use kube::core::admission::Operation;
    use rstest::rstest;

    fn server(replicas: i32, annotations: Value, release: bool) -> Value {
        let mut object = json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TServer",
            "metadata": {"name": "test-hello", "namespace": "tars", "annotations": annotations},
            "spec": {
                "app": "Test",
                "server": "Hello",
                "subType": "tars",
                "tars": {"template": "tars.cpp", "servants": []},
                "k8s": {"replicas": replicas}
            }
        });
        if release {
            object["spec"]["release"] = json!({"id": "10001", "image": "test:10001"});
        }
        object
    }

    #[rstest]
    #[case(3, json!({}), 3)]
    #[case(10, json!({"tars.io/MaxReplicas": "5"}), 5)]
    #[case(1, json!({"tars.io/MinReplicas": "2"}), 2)]
    #[case(4, json!({"tars.io/MinReplicas": "2", "tars.io/MaxReplicas": "5"}), 4)]
    #[case(0, json!({"tars.io/MinReplicas": "3", "tars.io/MaxReplicas": "3"}), 3)]
    fn test_replicas_clamped(#[case] replicas: i32, #[case] annotations: Value, #[case] expected: i32) {
        assert_eq!(desired_replicas(&server(replicas, annotations, true)).unwrap(), expected);
    }

    #[rstest]
    #[case(json!({"tars.io/MaxReplicas": "five"}))]
    #[case(json!({"tars.io/MinReplicas": "6", "tars.io/MaxReplicas": "5"}))]
    fn test_bad_annotations_rejected(#[case] annotations: Value) {
        let err = desired_replicas(&server(3, annotations, true)).unwrap_err();
        assert!(matches!(err, Error::Mutation(_)));
    }

    #[test]
    fn test_replicas_out_of_range_rejected() {
        let mut object = server(0, json!({}), true);
        object["spec"]["k8s"]["replicas"] = json!(i64::from(i32::MAX) + 1);
        let err = desired_replicas(&object).unwrap_err();
        assert!(matches!(err, Error::Mutation(_)));
    }

    #[test]
    fn test_no_release_means_zero_replicas() {
        let object = server(5, json!({"tars.io/MinReplicas": "2"}), false);
        assert_eq!(desired_replicas(&object).unwrap(), 0);
    }

    #[test]
    fn test_patch_sets_labels_replicas_and_release_time() {
        let object = server(10, json!({"tars.io/MaxReplicas": "4"}), true);
        let view = view(Operation::Create, ResourceKind::TServer, Some(object.clone()), None);
        let patch = mutate(&view).unwrap().build().unwrap();

        let mut out = object;
        json_patch::patch(&mut out, &patch).unwrap();
        assert_eq!(out["spec"]["k8s"]["replicas"], json!(4));
        assert_eq!(out["metadata"]["labels"]["tars.io/ServerApp"], json!("Test"));
        assert_eq!(out["metadata"]["labels"]["tars.io/Template"], json!("tars.cpp"));
        assert_eq!(out["metadata"]["labels"]["tars.io/SubType"], json!("tars"));
        assert!(out["spec"]["release"]["time"].is_string());
    }

    #[test]
    fn test_normal_server_drops_template_label() {
        let mut object = server(0, json!({}), false);
        object["spec"]["subType"] = json!("normal");
        object["metadata"]["labels"] = json!({"tars.io/Template": "tars.cpp"});
        let view = view(Operation::Update, ResourceKind::TServer, Some(object.clone()), Some(object.clone()));
        let patch = mutate(&view).unwrap().build().unwrap();

        let mut out = object;
        json_patch::patch(&mut out, &patch).unwrap();
        assert!(out["metadata"]["labels"].get("tars.io/Template").is_none());
        assert_eq!(out["metadata"]["labels"]["tars.io/SubType"], json!("normal"));
    }
}
