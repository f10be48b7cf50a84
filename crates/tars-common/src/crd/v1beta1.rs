//! v1beta1 资源定义
//!
//! 仅 TServer 拥有该版本。与 v1beta2 相比只有单个 readinessGate，
//! 发布信息中也没有 nodeImage。

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, DownwardAPIVolumeSource, EmptyDirVolumeSource, EnvFromSource, EnvVar,
    HostPathVolumeSource, NFSVolumeSource, NodeSelectorRequirement, PersistentVolumeClaim,
    PersistentVolumeClaimVolumeSource, ProjectedVolumeSource, ResourceRequirements,
    SecretVolumeSource,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// 服务子类型
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TServerSubType {
    #[default]
    #[serde(rename = "tars")]
    Tars,
    #[serde(rename = "normal")]
    Normal,
}

impl TServerSubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TServerSubType::Tars => "tars",
            TServerSubType::Normal => "normal",
        }
    }
}

/// 节点能力亲和性
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AbilityAffinityType {
    AppRequired,
    ServerRequired,
    #[default]
    AppOrServerPreferred,
    None,
}

/// Tars 服务对象（Servant）
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TServerServant {
    pub name: String,
    pub port: i32,
    #[serde(default)]
    pub thread: i32,
    #[serde(default)]
    pub connection: i32,
    #[serde(default)]
    pub capacity: i32,
    #[serde(default)]
    pub timeout: i32,
    #[serde(default)]
    pub is_tars: bool,
    #[serde(default)]
    pub is_tcp: bool,
}

/// 普通端口
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TServerPort {
    pub name: String,
    pub port: i32,
    #[serde(default)]
    pub is_tcp: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TServerTars {
    pub template: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub async_thread: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servants: Vec<TServerServant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<TServerPort>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TServerNormal {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<TServerPort>,
}

/// 主机端口，按名称引用容器端口
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TK8SHostPort {
    pub name_ref: String,
    pub port: i32,
}

/// 本地持久卷（由 agent 在节点上分配目录）
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TLocalVolume {
    #[serde(default = "default_local_volume_id")]
    pub uid: String,
    #[serde(default = "default_local_volume_id")]
    pub gid: String,
    #[serde(default = "default_local_volume_mode")]
    pub mode: String,
}

impl Default for TLocalVolume {
    fn default() -> Self {
        Self {
            uid: default_local_volume_id(),
            gid: default_local_volume_id(),
            mode: default_local_volume_mode(),
        }
    }
}

fn default_local_volume_id() -> String {
    "0".to_string()
}

fn default_local_volume_mode() -> String {
    "755".to_string()
}

/// 挂载来源，至多设置一个
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TK8SMountSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<HostPathVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimVolumeSource>,
    #[serde(rename = "downwardAPI", default, skip_serializing_if = "Option::is_none")]
    pub downward_api: Option<DownwardAPIVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected: Option<ProjectedVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfs: Option<NFSVolumeSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim_template: Option<PersistentVolumeClaim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_local_volume: Option<TLocalVolume>,
}

impl TK8SMountSource {
    /// 是否需要通过 volumeClaimTemplates 申请存储
    pub fn is_claim(&self) -> bool {
        self.persistent_volume_claim_template.is_some() || self.t_local_volume.is_some()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TK8SMount {
    pub name: String,
    #[serde(default)]
    pub source: TK8SMountSource,
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path_expr: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_propagation: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TServerK8S {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from: Vec<EnvFromSource>,
    #[serde(default)]
    pub host_network: bool,
    #[serde(rename = "hostIPC", default)]
    pub host_ipc: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_ports: Vec<TK8SHostPort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<TK8SMount>,
    #[serde(default)]
    pub daemon_set: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_selector: Vec<NodeSelectorRequirement>,
    #[serde(default)]
    pub ability_affinity: AbilityAffinityType,
    #[serde(default)]
    pub not_stacked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_management_policy: Option<String>,
    #[serde(default)]
    pub replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_gate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TServerRelease {
    pub id: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Time>,
}

/// TServer 规格
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[kube(group = "tars.io", version = "v1beta1", kind = "TServer", namespaced)]
#[kube(status = "TServerStatus", schema = "disabled", shortname = "ts")]
#[kube(derive = "PartialEq", derive = "Default")]
#[kube(printcolumn = r#"{"name":"App", "type":"string", "jsonPath":".spec.app"}"#)]
#[kube(printcolumn = r#"{"name":"Server", "type":"string", "jsonPath":".spec.server"}"#)]
#[kube(printcolumn = r#"{"name":"SubType", "type":"string", "jsonPath":".spec.subType"}"#)]
#[serde(rename_all = "camelCase")]
pub struct TServerSpec {
    pub app: String,
    pub server: String,
    #[serde(default)]
    pub sub_type: TServerSubType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tars: Option<TServerTars>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<TServerNormal>,
    #[serde(default)]
    pub k8s: TServerK8S,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<TServerRelease>,
}

/// TServer 状态
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TServerStatus {
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub ready_replicas: i32,
    #[serde(default)]
    pub current_replicas: i32,
    #[serde(default)]
    pub selector: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_readiness_gate() {
        let server: TServer = serde_json::from_value(json!({
            "apiVersion": "tars.io/v1beta1",
            "kind": "TServer",
            "metadata": {"name": "test-hello"},
            "spec": {
                "app": "Test",
                "server": "Hello",
                "subType": "normal",
                "normal": {"ports": [{"name": "http", "port": 80, "isTcp": true}]},
                "k8s": {"readinessGate": "custom-gate", "replicas": 2}
            }
        }))
        .unwrap();
        assert_eq!(server.spec.k8s.readiness_gate.as_deref(), Some("custom-gate"));
        assert_eq!(server.spec.sub_type, TServerSubType::Normal);
        assert!(server.spec.tars.is_none());
    }
}
