//! 跨资源校验使用的只读缓存
//!
//! 缓存由 kube-runtime 的 reflector 维护。首次全量列举完成之前
//! `synced()` 返回 false，依赖缓存的校验一律拒绝。

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use kube::runtime::reflector::{self, Store};
use kube::runtime::watcher;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use tars_common::crd::v1beta3::{TConfig, TServer, TTemplate, TTree};
use tars_common::keys;

/// 校验器可见的资源列表
pub trait ResourceLister: Send + Sync {
    /// 所有缓存均已完成首次同步
    fn synced(&self) -> bool;

    fn tservers(&self, namespace: &str) -> Vec<Arc<TServer>>;

    fn ttemplates(&self, namespace: &str) -> Vec<Arc<TTemplate>>;

    fn tconfigs(&self, namespace: &str) -> Vec<Arc<TConfig>>;

    /// 命名空间内唯一的 TTree
    fn ttree(&self, namespace: &str) -> Option<Arc<TTree>>;

    fn ttemplate(&self, namespace: &str, name: &str) -> Option<Arc<TTemplate>> {
        self.ttemplates(namespace)
            .into_iter()
            .find(|t| t.metadata.name.as_deref() == Some(name))
    }
}

/// 单一资源的缓存
struct Cache<K: Resource<DynamicType = ()> + 'static> {
    store: Store<K>,
    synced: Arc<AtomicBool>,
}

impl<K> Cache<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// 创建缓存，返回的 future 需要被持续驱动
    fn watch(api: Api<K>) -> (Self, BoxFuture<'static, ()>) {
        let (store, writer) = reflector::store::<K>();
        let synced = Arc::new(AtomicBool::new(false));
        let flag = synced.clone();
        let kind = K::kind(&()).to_string();

        let task = reflector::reflector(writer, watcher(api, watcher::Config::default()))
            .for_each(move |event| {
                match event {
                    Ok(watcher::Event::Restarted(objects)) => {
                        if !flag.swap(true, Ordering::SeqCst) {
                            info!("{} 缓存同步完成，共 {} 个对象", kind, objects.len());
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("{} 监听出错: {}", kind, e),
                }
                futures::future::ready(())
            })
            .boxed();

        (Self { store, synced }, task)
    }

    fn synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    fn in_namespace(&self, namespace: &str) -> Vec<Arc<K>> {
        self.store
            .state()
            .into_iter()
            .filter(|o| o.namespace().as_deref() == Some(namespace))
            .collect()
    }
}

/// 基于 reflector 的缓存实现
pub struct ReflectorLister {
    tservers: Cache<TServer>,
    ttemplates: Cache<TTemplate>,
    tconfigs: Cache<TConfig>,
    ttrees: Cache<TTree>,
}

impl ReflectorLister {
    /// 监听全部命名空间，返回缓存与需要后台运行的任务
    pub fn start(client: Client) -> (Arc<Self>, BoxFuture<'static, ()>) {
        let (tservers, a) = Cache::watch(Api::<TServer>::all(client.clone()));
        let (ttemplates, b) = Cache::watch(Api::<TTemplate>::all(client.clone()));
        let (tconfigs, c) = Cache::watch(Api::<TConfig>::all(client.clone()));
        let (ttrees, d) = Cache::watch(Api::<TTree>::all(client));

        let lister = Arc::new(Self {
            tservers,
            ttemplates,
            tconfigs,
            ttrees,
        });
        let task = futures::future::join4(a, b, c, d).map(|_| ()).boxed();
        (lister, task)
    }
}

impl ResourceLister for ReflectorLister {
    fn synced(&self) -> bool {
        self.tservers.synced()
            && self.ttemplates.synced()
            && self.tconfigs.synced()
            && self.ttrees.synced()
    }

    fn tservers(&self, namespace: &str) -> Vec<Arc<TServer>> {
        self.tservers.in_namespace(namespace)
    }

    fn ttemplates(&self, namespace: &str) -> Vec<Arc<TTemplate>> {
        self.ttemplates.in_namespace(namespace)
    }

    fn tconfigs(&self, namespace: &str) -> Vec<Arc<TConfig>> {
        self.tconfigs.in_namespace(namespace)
    }

    fn ttree(&self, namespace: &str) -> Option<Arc<TTree>> {
        self.ttrees
            .in_namespace(namespace)
            .into_iter()
            .find(|t| t.metadata.name.as_deref() == Some(keys::TREE_NAME))
    }
}
