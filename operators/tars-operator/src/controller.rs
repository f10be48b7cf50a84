//! 控制器模块
//!
//! 监听 TServer 及其派生的 StatefulSet、DaemonSet、Service 与 TEndpoint，
//! 任一对象变化都会触发所属 TServer 的协调。

use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, StatefulSet};
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::client::Client;
use kube::runtime::controller::Controller as KubeController;
use kube::runtime::events::Reporter;
use kube::runtime::watcher;
use std::sync::Arc;
use tracing::{debug, error, info};

use tars_common::crd::v1beta3::{TEndpoint, TServer};
use tars_controller::{Translator, TranslatorConfig};

use crate::framework::FrameworkNodeImages;
use crate::reconcile::{error_policy, reconcile, Context};

/// 事件上报使用的控制器名
pub const CONTROLLER_NAME: &str = "tars-controller";

/// TServer 控制器
pub struct Controller {
    /// Kubernetes 客户端
    client: Client,
    /// 翻译器配置
    config: TranslatorConfig,
}

impl Controller {
    /// 创建新的控制器
    pub fn new(client: Client, config: TranslatorConfig) -> Self {
        Self { client, config }
    }

    /// 运行控制器，收到退出信号后返回
    pub async fn run(self) -> Result<()> {
        let (node_images, framework_task) = FrameworkNodeImages::watch(self.client.clone());
        tokio::spawn(framework_task);

        let context = Arc::new(Context {
            client: self.client.clone(),
            translator: Arc::new(Translator::new(self.config, Arc::new(node_images))),
            reporter: Reporter {
                controller: CONTROLLER_NAME.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        });

        let tservers: Api<TServer> = Api::all(self.client.clone());
        let config = watcher::Config::default();

        info!("启动 TServer 控制器");
        KubeController::new(tservers, config.clone())
            .owns(Api::<StatefulSet>::all(self.client.clone()), config.clone())
            .owns(Api::<DaemonSet>::all(self.client.clone()), config.clone())
            .owns(Api::<Service>::all(self.client.clone()), config.clone())
            .owns(Api::<TEndpoint>::all(self.client.clone()), config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|result| async move {
                match result {
                    Ok(o) => debug!("协调成功: {:?}", o),
                    Err(e) => error!("协调错误: {}", e),
                }
            })
            .await;
        info!("TServer 控制器已停止");

        Ok(())
    }
}
