use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tars_controller::TranslatorConfig;
use tars_operator::{crds, TarsOperator};

/// Tars Operator
#[derive(Parser, Debug)]
#[command(name = "tars-operator", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 运行 TServer 控制器
    Run {
        /// TLocalVolume 使用的存储类
        #[arg(long, default_value = "tars-storage-class")]
        storage_class: String,

        /// 工作负载保留的历史版本数
        #[arg(long, default_value_t = 5)]
        revision_history_limit: i32,
    },
    /// 以 YAML 输出 CRD
    CrdGen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::CrdGen => {
            print!("{}", crds::to_yaml(&crds::crds()?)?);
            Ok(())
        }
        Command::Run {
            storage_class,
            revision_history_limit,
        } => {
            let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
            tracing_subscriber::fmt().with_env_filter(filter).init();

            let config = TranslatorConfig {
                local_storage_class: storage_class,
                revision_history_limit,
            };
            info!("启动 Tars Operator: {:?}", config);
            let operator = TarsOperator::new(config).await?;
            if let Err(e) = operator.run().await {
                error!("Operator 运行错误: {}", e);
                return Err(e);
            }
            Ok(())
        }
    }
}
