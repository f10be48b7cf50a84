//! 工作负载翻译器
//!
//! 由 TServer 规格确定性地派生 StatefulSet、DaemonSet、Service、TEndpoint
//! 与 TExitedRecord。`sync_*` 只覆盖翻译器拥有的字段，其余字段（状态、
//! 其他组件注入的容器等）保持原样；`equal_*` 与 `dry_run_sync_*` 都以
//! `sync_*` 为准，保证“相等”恰好意味着“同步不会改变任何内容”。

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;

use tars_common::crd::v1beta3::TServer;
use tars_common::{keys, Result};

mod pod;
mod service;
mod workload;

/// 未配置节点镜像时使用的占位值
pub const NODE_IMAGE_PLACEHOLDER: &str = "NodeImagePlaceholder";
/// 尚未发布时业务容器使用的占位镜像
pub const SERVICE_IMAGE_PLACEHOLDER: &str = "ServiceImagePlaceholder";

/// 集群级缺省 tarsnode 镜像的来源
pub trait NodeImageProvider: Send + Sync {
    /// 返回 (镜像, 拉取密钥)；未配置时镜像为 [`NODE_IMAGE_PLACEHOLDER`]
    fn default_node_image(&self, namespace: &str) -> (String, String);
}

/// 固定镜像，测试与单集群部署使用
pub struct StaticNodeImage {
    pub image: String,
    pub secret: String,
}

impl NodeImageProvider for StaticNodeImage {
    fn default_node_image(&self, _namespace: &str) -> (String, String) {
        (self.image.clone(), self.secret.clone())
    }
}

/// 翻译器使用的集群级配置
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatorConfig {
    /// TLocalVolume 与 host-bind 声明使用的存储类
    pub local_storage_class: String,
    /// 工作负载保留的历史版本数
    pub revision_history_limit: i32,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            local_storage_class: "tars-storage-class".to_string(),
            revision_history_limit: 5,
        }
    }
}

/// TServer 工作负载翻译器
pub struct Translator {
    config: TranslatorConfig,
    node_images: Arc<dyn NodeImageProvider>,
}

impl Translator {
    pub fn new(config: TranslatorConfig, node_images: Arc<dyn NodeImageProvider>) -> Self {
        Self {
            config,
            node_images,
        }
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }
}

pub(crate) fn namespace(ts: &TServer) -> String {
    ts.namespace().unwrap_or_default()
}

/// 选择器标签
pub(crate) fn selector_labels(ts: &TServer) -> BTreeMap<String, String> {
    BTreeMap::from([
        (keys::SERVER_APP_LABEL.to_string(), ts.spec.app.clone()),
        (keys::SERVER_NAME_LABEL.to_string(), ts.spec.server.clone()),
    ])
}

/// 派生对象与 Pod 模板上的标签
pub(crate) fn owned_labels(ts: &TServer) -> BTreeMap<String, String> {
    let mut labels = selector_labels(ts);
    labels.insert(
        keys::SERVER_ID_LABEL.to_string(),
        format!("{}.{}", ts.spec.app, ts.spec.server),
    );
    labels
}

/// 派生对象的元数据：同名、同命名空间，由 TServer 控制
pub(crate) fn owned_meta(ts: &TServer) -> ObjectMeta {
    ObjectMeta {
        name: Some(ts.name_any()),
        namespace: ts.namespace(),
        labels: Some(owned_labels(ts)),
        owner_references: owner_references(ts),
        ..Default::default()
    }
}

fn owner_references(ts: &TServer) -> Option<Vec<OwnerReference>> {
    ts.controller_owner_ref(&()).map(|owner| vec![owner])
}

/// 把翻译器拥有的标签合并进现有标签，其他标签保留
pub(crate) fn merge_labels(live: &mut Option<BTreeMap<String, String>>, owned: BTreeMap<String, String>) {
    live.get_or_insert_with(BTreeMap::new).extend(owned);
}

/// 在副本上执行同步，有变化时返回同步后的副本
pub(crate) fn dry_run<T: Clone + PartialEq>(
    live: &T,
    sync: impl FnOnce(&mut T) -> Result<()>,
) -> Result<(bool, Option<T>)> {
    let mut copy = live.clone();
    sync(&mut copy)?;
    if copy == *live {
        Ok((false, None))
    } else {
        Ok((true, Some(copy)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::{json, Value};

    pub const NODE_IMAGE: &str = "tarscloud/tars.tarsnode:v1.3.0";

    pub fn translator() -> Translator {
        Translator::new(
            TranslatorConfig::default(),
            Arc::new(StaticNodeImage {
                image: NODE_IMAGE.to_string(),
                secret: "tars-image-secret".to_string(),
            }),
        )
    }

    pub fn tserver(spec: Value) -> TServer {
        let mut object = json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TServer",
            "metadata": {
                "name": "test-helloserver",
                "namespace": "tars",
                "uid": "3c1a0f58-9c3e-4c47-8d6e-7e7a4f2b5c10"
            },
            "spec": {
                "app": "Test",
                "server": "HelloServer",
                "subType": "tars",
                "tars": {
                    "template": "tars.cpp",
                    "servants": [{"name": "HelloObj", "port": 10000, "isTars": true, "isTcp": true}]
                },
                "k8s": {"replicas": 2},
                "release": {"id": "10001", "image": "test/helloserver:10001", "secret": "release-secret"}
            }
        });
        if let (Some(base), Some(patch)) = (object["spec"].as_object_mut(), spec.as_object()) {
            for (key, value) in patch {
                base.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(object).unwrap()
    }

    #[test]
    fn test_owned_meta() {
        let ts = tserver(json!({}));
        let meta = owned_meta(&ts);
        assert_eq!(meta.name.as_deref(), Some("test-helloserver"));
        assert_eq!(meta.labels.unwrap()[keys::SERVER_ID_LABEL], "Test.HelloServer");

        let owner = &meta.owner_references.unwrap()[0];
        assert_eq!(owner.kind, "TServer");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
    }

    #[test]
    fn test_merge_labels_keeps_foreign() {
        let mut live = Some(BTreeMap::from([("team".to_string(), "infra".to_string())]));
        merge_labels(&mut live, owned_labels(&tserver(json!({}))));
        let live = live.unwrap();
        assert_eq!(live["team"], "infra");
        assert_eq!(live[keys::SERVER_APP_LABEL], "Test");
    }
}
