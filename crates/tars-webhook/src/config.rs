//! 配置管理模块
//!
//! 该模块负责加载 Webhook 的配置文件，支持 YAML/JSON 格式，
//! 并允许通过 `TARS_` 前缀的环境变量覆盖文件中的值。

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Webhook 配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookConfig {
    /// 监听地址
    pub listen_address: String,
    /// 监听端口
    pub port: u16,
    /// 日志级别
    pub log_level: String,
    /// 控制器身份，只有这些用户可以修改 TServer 派生的工作负载与账户令牌
    pub controller_users: Vec<String>,
}

impl WebhookConfig {
    /// 解析监听地址
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.listen_address, self.port)
            .parse()
            .context(format!("监听地址无效: {}:{}", self.listen_address, self.port))
    }
}

/// 创建默认配置
pub fn create_default_config() -> WebhookConfig {
    WebhookConfig {
        listen_address: "0.0.0.0".to_string(),
        port: 8443,
        log_level: "info".to_string(),
        controller_users: vec![
            "system:serviceaccount:tars-system:tars-controller".to_string(),
            "system:serviceaccount:tars-system:tars-agent".to_string(),
            "system:serviceaccount:kube-system:generic-garbage-collector".to_string(),
            "system:serviceaccount:kube-system:statefulset-controller".to_string(),
            "system:serviceaccount:kube-system:daemon-set-controller".to_string(),
        ],
    }
}

/// 加载配置
///
/// 未给出配置文件时使用默认配置，环境变量的优先级最高。
pub fn load_config(config_path: Option<&Path>) -> Result<WebhookConfig> {
    let defaults = Config::try_from(&create_default_config()).context("构建默认配置失败")?;
    let mut builder = Config::builder().add_source(defaults);

    if let Some(path) = config_path {
        let config_file = path.to_str().ok_or_else(|| anyhow!("配置路径无效"))?;

        // 确定配置文件格式
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(anyhow!("不支持的配置文件格式，仅支持 YAML 或 JSON")),
        };
        builder = builder.add_source(File::with_name(config_file).format(format));
    }

    let config = builder
        .add_source(
            Environment::with_prefix("TARS")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("controller_users"),
        )
        .build()
        .context("构建配置失败")?;

    config
        .try_deserialize::<WebhookConfig>()
        .context("配置格式错误")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = load_config(None).unwrap();
        assert_eq!(config, create_default_config());
        assert_eq!(config.socket_addr().unwrap().port(), 8443);
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "port: 9443\nlog_level: debug\ncontroller_users:\n  - system:serviceaccount:tars:tars-controller"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.port, 9443);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.listen_address, "0.0.0.0");
        assert_eq!(config.controller_users.len(), 1);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }
}
