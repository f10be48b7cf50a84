//! Tars Operator - 管理 TServer 工作负载的 Kubernetes Operator
//!
//! 该模块把 TServer 翻译为 StatefulSet/DaemonSet、Service、TEndpoint 与
//! TExitedRecord，并持续保持集群中的对象与 TServer 规格一致。

pub mod controller;
pub mod crds;
pub mod framework;
pub mod reconcile;

use anyhow::{Context, Result};
use kube::Client;
use tars_controller::TranslatorConfig;

/// Operator 主结构体
pub struct TarsOperator {
    /// Kubernetes 客户端
    client: Client,
    /// 翻译器配置
    config: TranslatorConfig,
}

impl TarsOperator {
    /// 创建新的 Operator 实例
    pub async fn new(config: TranslatorConfig) -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("创建 Kubernetes 客户端失败")?;
        Ok(Self { client, config })
    }

    /// 运行 Operator 直到收到退出信号
    pub async fn run(self) -> Result<()> {
        controller::Controller::new(self.client, self.config)
            .run()
            .await
    }
}
