//! 框架配置
//!
//! 每个命名空间的 `tars-framework` TFrameworkConfig 给出缺省的 tarsnode 镜像，
//! 由 reflector 缓存后提供给翻译器。

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::watcher;
use kube::{Api, Client};
use tracing::warn;

use tars_common::crd::v1beta3::TFrameworkConfig;
use tars_common::keys;
use tars_controller::{NodeImageProvider, NODE_IMAGE_PLACEHOLDER};

/// 基于 TFrameworkConfig 缓存的节点镜像来源
pub struct FrameworkNodeImages {
    store: Store<TFrameworkConfig>,
}

impl FrameworkNodeImages {
    pub fn new(store: Store<TFrameworkConfig>) -> Self {
        Self { store }
    }

    /// 监听全部命名空间的框架配置，返回的任务需要在后台运行
    pub fn watch(client: Client) -> (Self, BoxFuture<'static, ()>) {
        let (store, writer) = reflector::store();
        let api: Api<TFrameworkConfig> = Api::all(client);
        let task = reflector::reflector(writer, watcher(api, watcher::Config::default()))
            .for_each(|event| async move {
                if let Err(e) = event {
                    warn!("监听 TFrameworkConfig 出错: {}", e);
                }
            })
            .boxed();
        (Self::new(store), task)
    }
}

impl NodeImageProvider for FrameworkNodeImages {
    fn default_node_image(&self, namespace: &str) -> (String, String) {
        let key = ObjectRef::new(keys::FRAMEWORK_CONFIG_NAME).within(namespace);
        self.store
            .get(&key)
            .and_then(|config| config.node_image.clone())
            .filter(|node| !node.image.is_empty())
            .map(|node| (node.image, node.secret.unwrap_or_default()))
            .unwrap_or_else(|| (NODE_IMAGE_PLACEHOLDER.to_string(), String::new()))
    }
}
