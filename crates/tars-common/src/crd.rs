//! 自定义资源定义模块
//!
//! 该模块按版本组织 Tars 的自定义资源：
//!
//! - `v1beta1`：仅 TServer
//! - `v1beta2`：TServer、TConfig、TImage、TAccount、TTree、TTemplate、TFrameworkConfig
//! - `v1beta3`：全部资源，是转换的中心版本（hub），信息量最全
//!
//! 同一资源在不同版本下是互不相同的 Rust 类型，版本之间的转换必须逐字段显式完成。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// API 组
pub const GROUP: &str = "tars.io";

/// 为顶层字段形态（无 spec）的资源实现 `kube::Resource`
macro_rules! tars_resource {
    ($ty:ident, $kind:literal, $plural:literal, $version:literal) => {
        impl kube::Resource for $ty {
            type DynamicType = ();
            type Scope = k8s_openapi::NamespaceResourceScope;

            fn kind(_: &()) -> std::borrow::Cow<'_, str> {
                $kind.into()
            }

            fn group(_: &()) -> std::borrow::Cow<'_, str> {
                $crate::crd::GROUP.into()
            }

            fn version(_: &()) -> std::borrow::Cow<'_, str> {
                $version.into()
            }

            fn plural(_: &()) -> std::borrow::Cow<'_, str> {
                $plural.into()
            }

            fn meta(&self) -> &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                &mut self.metadata
            }
        }

        impl $ty {
            /// 资源类型
            pub const KIND: &'static str = $kind;
            /// 完整的 apiVersion
            pub const API_VERSION: &'static str = concat!("tars.io/", $version);

            /// 创建带名称与命名空间的空对象
            pub fn named(name: &str, namespace: &str) -> Self {
                Self {
                    api_version: Self::API_VERSION.to_string(),
                    kind: Self::KIND.to_string(),
                    metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                        name: Some(name.to_string()),
                        namespace: Some(namespace.to_string()),
                        ..Default::default()
                    },
                    ..Default::default()
                }
            }
        }
    };
}

pub mod v1beta1;
pub mod v1beta2;
pub mod v1beta3;

/// Tars 资源的 schema 版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApiVersion {
    V1beta1,
    V1beta2,
    V1beta3,
}

impl ApiVersion {
    /// 中心版本
    pub const HUB: ApiVersion = ApiVersion::V1beta3;

    /// 版本名，如 `v1beta2`
    pub fn version(&self) -> &'static str {
        match self {
            ApiVersion::V1beta1 => "v1beta1",
            ApiVersion::V1beta2 => "v1beta2",
            ApiVersion::V1beta3 => "v1beta3",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", GROUP, self.version())
    }
}

impl FromStr for ApiVersion {
    type Err = Error;

    /// 同时接受 `tars.io/v1beta2` 与 `v1beta2`
    fn from_str(s: &str) -> Result<Self, Error> {
        let version = match s.split_once('/') {
            Some((group, version)) if group == GROUP => version,
            Some(_) => return Err(Error::Conversion(format!("unknown api group in {s}"))),
            None => s,
        };
        match version {
            "v1beta1" => Ok(ApiVersion::V1beta1),
            "v1beta2" => Ok(ApiVersion::V1beta2),
            "v1beta3" => Ok(ApiVersion::V1beta3),
            _ => Err(Error::Conversion(format!("unknown api version {s}"))),
        }
    }
}

/// Tars 自定义资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TarsKind {
    TServer,
    TConfig,
    TImage,
    TAccount,
    TTree,
    TTemplate,
    TFrameworkConfig,
    TEndpoint,
    TExitedRecord,
}

impl TarsKind {
    /// 所有资源类型
    pub const ALL: [TarsKind; 9] = [
        TarsKind::TServer,
        TarsKind::TConfig,
        TarsKind::TImage,
        TarsKind::TAccount,
        TarsKind::TTree,
        TarsKind::TTemplate,
        TarsKind::TFrameworkConfig,
        TarsKind::TEndpoint,
        TarsKind::TExitedRecord,
    ];

    /// 资源类型名
    pub fn as_str(&self) -> &'static str {
        match self {
            TarsKind::TServer => "TServer",
            TarsKind::TConfig => "TConfig",
            TarsKind::TImage => "TImage",
            TarsKind::TAccount => "TAccount",
            TarsKind::TTree => "TTree",
            TarsKind::TTemplate => "TTemplate",
            TarsKind::TFrameworkConfig => "TFrameworkConfig",
            TarsKind::TEndpoint => "TEndpoint",
            TarsKind::TExitedRecord => "TExitedRecord",
        }
    }

    /// 该资源被服务的 schema 版本
    pub fn served_versions(&self) -> &'static [ApiVersion] {
        match self {
            TarsKind::TServer => &[ApiVersion::V1beta1, ApiVersion::V1beta2, ApiVersion::V1beta3],
            TarsKind::TEndpoint | TarsKind::TExitedRecord => &[ApiVersion::V1beta3],
            _ => &[ApiVersion::V1beta2, ApiVersion::V1beta3],
        }
    }
}

impl fmt::Display for TarsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TarsKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        TarsKind::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| Error::Conversion(format!("unknown kind {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_api_version_parse() {
        assert_eq!("tars.io/v1beta1".parse::<ApiVersion>().unwrap(), ApiVersion::V1beta1);
        assert_eq!("v1beta3".parse::<ApiVersion>().unwrap(), ApiVersion::V1beta3);
        assert!("apps/v1".parse::<ApiVersion>().is_err());
        assert!("tars.io/v2".parse::<ApiVersion>().is_err());
        assert_eq!(ApiVersion::V1beta2.to_string(), "tars.io/v1beta2");
    }

    #[test]
    fn test_kind_parse() {
        for kind in TarsKind::ALL {
            assert_eq!(kind.as_str().parse::<TarsKind>().unwrap(), kind);
        }
        assert!("StatefulSet".parse::<TarsKind>().is_err());
    }

    #[test]
    fn test_resource_metadata() {
        assert_eq!(v1beta3::TServer::api_version(&()), "tars.io/v1beta3");
        assert_eq!(v1beta1::TServer::kind(&()), "TServer");
        assert_eq!(v1beta3::TConfig::plural(&()), "tconfigs");
        assert_eq!(v1beta2::TFrameworkConfig::API_VERSION, "tars.io/v1beta2");

        let config = v1beta3::TConfig::named("test-config", "tars");
        assert_eq!(config.kind, "TConfig");
        assert_eq!(config.metadata.namespace.as_deref(), Some("tars"));
    }
}
