use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tars_webhook::config::load_config;
use tars_webhook::conversion::ConversionEngine;
use tars_webhook::listers::ReflectorLister;
use tars_webhook::server::{serve, WebhookState};
use tars_webhook::validating::Validator;

/// Tars Webhook 服务
#[derive(Parser, Debug)]
#[command(name = "tars-webhook", version, about)]
struct Args {
    /// 配置文件路径（YAML 或 JSON）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖配置中的监听端口
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let client = Client::try_default().await.context("创建 Kubernetes 客户端失败")?;
    let (lister, watch) = ReflectorLister::start(client);
    tokio::spawn(watch);

    let engine = Arc::new(ConversionEngine::new());
    info!("已注册 {} 个转换函数", engine.len());
    let validator = Validator::new(engine.clone(), lister, config.controller_users.clone());
    let state = Arc::new(WebhookState {
        engine,
        validator: Arc::new(validator),
    });

    let addr = config.socket_addr()?;
    if let Err(e) = serve(addr, state).await {
        error!("Webhook 服务器错误: {}", e);
        return Err(e);
    }
    Ok(())
}
