//! 准入校验模块
//!
//! 与修改模块使用相同的分发形态。依赖缓存的规则在缓存未同步时一律拒绝，
//! 拒绝原因原样返回给调用方。

use kube::core::admission::Operation;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use tars_common::{Error, IntoError, Result};

use crate::admission::{unsupported, AdmissionView, ResourceKind};
use crate::conversion::ConversionEngine;
use crate::listers::ResourceLister;

pub mod resources;
pub mod tconfig;
pub mod tserver;
pub mod ttemplate;
pub mod ttree;
pub mod workload;

/// 准入校验器
pub struct Validator {
    engine: Arc<ConversionEngine>,
    lister: Arc<dyn ResourceLister>,
    controller_users: HashSet<String>,
}

impl Validator {
    pub fn new(
        engine: Arc<ConversionEngine>,
        lister: Arc<dyn ResourceLister>,
        controller_users: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            engine,
            lister,
            controller_users: controller_users.into_iter().collect(),
        }
    }

    /// 校验准入请求
    pub fn validate(&self, view: &AdmissionView) -> Result<()> {
        use Operation::{Create, Delete, Update};
        use ResourceKind::*;

        match (&view.operation, view.kind) {
            (Create, TServer) => tserver::validate_create(self, view),
            (Update, TServer) => tserver::validate_update(self, view),
            (Delete, TServer) => Ok(()),
            (Create, TConfig) => tconfig::validate_create(self, view),
            (Update, TConfig) => tconfig::validate_update(self, view),
            (Delete, TConfig) => tconfig::validate_delete(self, view),
            (Create | Update, TTemplate) => ttemplate::validate_upsert(self, view),
            (Delete, TTemplate) => ttemplate::validate_delete(self, view),
            (Create | Update, TTree) => ttree::validate_upsert(self, view),
            (Delete, TTree) => ttree::validate_delete(self, view),
            (Create | Update, TAccount) => resources::validate_taccount(self, view),
            (Delete, TAccount) => Ok(()),
            (Create | Update, TImage) => resources::validate_timage(self, view),
            (Delete, TImage) => Ok(()),
            (Create | Update, TFrameworkConfig) => resources::validate_tframework(self, view),
            (Delete, TFrameworkConfig) => Ok(()),
            (Create | Update | Delete, StatefulSet | DaemonSet | Service) => {
                workload::validate(self, view)
            }
            _ => Err(unsupported(view)),
        }
    }

    /// 读取缓存前确认已同步
    pub(crate) fn lister(&self) -> Result<&dyn ResourceLister> {
        if !self.lister.synced() {
            return "resource cache has not synced yet, please retry later".into_error(Error::Validation);
        }
        Ok(self.lister.as_ref())
    }

    pub(crate) fn is_controller(&self, username: &str) -> bool {
        self.controller_users.contains(username)
    }

    /// 把请求中的对象读取为中心版本
    pub(crate) fn hub<K: DeserializeOwned>(&self, object: &Value) -> Result<K> {
        self.engine.to_hub(object.clone())
    }
}

/// 构造校验错误
pub(crate) fn reject<T>(message: impl Into<String>) -> Result<T> {
    Err(Error::Validation(message.into()))
}

/// 返回第一个重复的元素
pub(crate) fn first_duplicate<T: Eq + Hash + Clone>(items: impl IntoIterator<Item = T>) -> Option<T> {
    let mut seen = HashSet::new();
    items.into_iter().find(|item| !seen.insert(item.clone()))
}
