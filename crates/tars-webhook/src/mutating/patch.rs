//! JSON Patch 构造

use json_patch::{AddOperation, Patch, PatchOperation, RemoveOperation, ReplaceOperation};
use serde_json::Value;

use tars_common::keys::escape_json_pointer;

/// 逐条收集补丁操作
#[derive(Debug, Default)]
pub struct PatchBuilder {
    operations: Vec<PatchOperation>,
}

impl PatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加字段；字段已存在时 add 等价于替换
    pub fn add(&mut self, path: impl Into<String>, value: Value) -> &mut Self {
        self.operations.push(PatchOperation::Add(AddOperation {
            path: path.into(),
            value,
        }));
        self
    }

    pub fn replace(&mut self, path: impl Into<String>, value: Value) -> &mut Self {
        self.operations.push(PatchOperation::Replace(ReplaceOperation {
            path: path.into(),
            value,
        }));
        self
    }

    pub fn remove(&mut self, path: impl Into<String>) -> &mut Self {
        self.operations.push(PatchOperation::Remove(RemoveOperation { path: path.into() }));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// 让 `metadata.labels` 与给定的键值一致，值为 None 的键会被删除
    pub fn sync_labels(&mut self, object: &Value, labels: &[(&str, Option<String>)]) -> &mut Self {
        match object.pointer("/metadata/labels").and_then(Value::as_object) {
            None => {
                let wanted: serde_json::Map<String, Value> = labels
                    .iter()
                    .filter_map(|(k, v)| v.as_ref().map(|v| (k.to_string(), Value::String(v.clone()))))
                    .collect();
                if !wanted.is_empty() {
                    self.add("/metadata/labels", Value::Object(wanted));
                }
            }
            Some(current) => {
                for (key, value) in labels {
                    let path = format!("/metadata/labels/{}", escape_json_pointer(key));
                    match (current.get(*key).and_then(Value::as_str), value) {
                        (Some(old), Some(new)) if old == new => {}
                        (_, Some(new)) => {
                            self.add(path, Value::String(new.clone()));
                        }
                        (Some(_), None) => {
                            self.remove(path);
                        }
                        (None, None) => {}
                    }
                }
            }
        }
        self
    }

    /// 删除注解，不存在时不产生操作
    pub fn remove_annotation(&mut self, object: &Value, key: &str) -> &mut Self {
        let exists = object
            .pointer("/metadata/annotations")
            .and_then(Value::as_object)
            .map_or(false, |annotations| annotations.contains_key(key));
        if exists {
            self.remove(format!("/metadata/annotations/{}", escape_json_pointer(key)));
        }
        self
    }

    /// 没有任何操作时返回 None
    pub fn build(self) -> Option<Patch> {
        if self.operations.is_empty() {
            None
        } else {
            Some(Patch(self.operations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(object: &Value, builder: PatchBuilder) -> Value {
        let mut out = object.clone();
        if let Some(patch) = builder.build() {
            json_patch::patch(&mut out, &patch).unwrap();
        }
        out
    }

    #[test]
    fn test_sync_labels_creates_map() {
        let object = json!({"metadata": {"name": "x"}});
        let mut builder = PatchBuilder::new();
        builder.sync_labels(&object, &[("tars.io/ServerApp", Some("Test".into())), ("tars.io/Template", None)]);
        let out = apply(&object, builder);
        assert_eq!(out["metadata"]["labels"], json!({"tars.io/ServerApp": "Test"}));
    }

    #[test]
    fn test_sync_labels_updates_and_removes() {
        let object = json!({"metadata": {"labels": {
            "tars.io/ServerApp": "Old",
            "tars.io/Template": "tars.cpp",
            "team": "infra"
        }}});
        let mut builder = PatchBuilder::new();
        builder.sync_labels(
            &object,
            &[("tars.io/ServerApp", Some("Test".into())), ("tars.io/Template", None)],
        );
        let out = apply(&object, builder);
        assert_eq!(out["metadata"]["labels"], json!({"tars.io/ServerApp": "Test", "team": "infra"}));
    }

    #[test]
    fn test_unchanged_labels_produce_no_patch() {
        let object = json!({"metadata": {"labels": {"tars.io/ServerApp": "Test"}}});
        let mut builder = PatchBuilder::new();
        builder.sync_labels(&object, &[("tars.io/ServerApp", Some("Test".into()))]);
        assert!(builder.build().is_none());
    }

    #[test]
    fn test_remove_annotation() {
        let object = json!({"metadata": {"annotations": {
            "kubectl.kubernetes.io/last-applied-configuration": "{}"
        }}});
        let mut builder = PatchBuilder::new();
        builder.remove_annotation(&object, "kubectl.kubernetes.io/last-applied-configuration");
        builder.remove_annotation(&object, "missing");
        let out = apply(&object, builder);
        assert_eq!(out["metadata"]["annotations"], json!({}));
    }
}
