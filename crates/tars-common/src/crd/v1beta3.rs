//! v1beta3 资源定义（中心版本）

use k8s_openapi::api::apps::v1::{RollingUpdateStatefulSetStrategy, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, DownwardAPIVolumeSource, EmptyDirVolumeSource, EnvFromSource, EnvVar,
    HostPathVolumeSource, NFSVolumeSource, NodeSelectorRequirement, PersistentVolumeClaim,
    PersistentVolumeClaimVolumeSource, ProjectedVolumeSource, ResourceRequirements,
    SecretVolumeSource,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

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

/// 业务进程的启动方式
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LauncherType {
    #[default]
    #[serde(rename = "background")]
    Background,
    #[serde(rename = "foreground")]
    Foreground,
}

impl LauncherType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LauncherType::Background => "background",
            LauncherType::Foreground => "foreground",
        }
    }
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
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readiness_gates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_strategy: Option<StatefulSetUpdateStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launcher_type: Option<LauncherType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// 升级时未指定镜像拉取策略的缺省值
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "Always";

/// 缺省更新策略：滚动更新，partition 为 0
pub fn default_update_strategy() -> StatefulSetUpdateStrategy {
    StatefulSetUpdateStrategy {
        type_: Some("RollingUpdate".to_string()),
        rolling_update: Some(RollingUpdateStatefulSetStrategy {
            partition: Some(0),
            max_unavailable: None,
        }),
    }
}

/// 发布指定的 tarsnode 镜像
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TServerReleaseNode {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_image: Option<TServerReleaseNode>,
}

/// TServer 规格
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[kube(group = "tars.io", version = "v1beta3", kind = "TServer", namespaced)]
#[kube(status = "TServerStatus", schema = "disabled", shortname = "ts")]
#[kube(derive = "PartialEq", derive = "Default")]
#[kube(printcolumn = r#"{"name":"App", "type":"string", "jsonPath":".spec.app"}"#)]
#[kube(printcolumn = r#"{"name":"Server", "type":"string", "jsonPath":".spec.server"}"#)]
#[kube(printcolumn = r#"{"name":"SubType", "type":"string", "jsonPath":".spec.subType"}"#)]
#[kube(printcolumn = r#"{"name":"Release", "type":"string", "jsonPath":".spec.release.id"}"#)]
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

/// TEndpoint 规格，由 TServer 派生
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[kube(group = "tars.io", version = "v1beta3", kind = "TEndpoint", namespaced)]
#[kube(status = "TEndpointStatus", schema = "disabled", shortname = "te")]
#[kube(derive = "PartialEq", derive = "Default")]
#[serde(rename_all = "camelCase")]
pub struct TEndpointSpec {
    pub app: String,
    pub server: String,
    #[serde(default)]
    pub sub_type: TServerSubType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tars: Option<TServerTars>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<TServerNormal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub host_ports: Vec<TK8SHostPort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<TServerRelease>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TEndpointPodStatus {
    pub uid: String,
    pub name: String,
    #[serde(rename = "presentState", default)]
    pub present_state: String,
    #[serde(rename = "settingState", default)]
    pub setting_state: String,
    #[serde(rename = "podIP", default)]
    pub pod_ip: String,
    #[serde(rename = "hostIP", default)]
    pub host_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TEndpointStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pods: Vec<TEndpointPodStatus>,
}

/// 已退出 Pod 的记录
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TExitedPod {
    pub uid: String,
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "nodeIP", default)]
    pub node_ip: String,
    #[serde(rename = "podIP", default)]
    pub pod_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_time: Option<Time>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TExitedRecord {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub app: String,
    pub server: String,
    #[serde(default)]
    pub pods: Vec<TExitedPod>,
}

tars_resource!(TExitedRecord, "TExitedRecord", "texitedrecords", "v1beta3");

/// 配置文件；`podSeq == "m"` 为主配置，数字为对应 Pod 的从配置
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TConfig {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub app: String,
    #[serde(default)]
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_seq: Option<String>,
    pub config_name: String,
    #[serde(default)]
    pub config_content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_person: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_reason: Option<String>,
    #[serde(default)]
    pub activated: bool,
}

tars_resource!(TConfig, "TConfig", "tconfigs", "v1beta3");

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TImageRelease {
    pub id: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_person: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark: Option<String>,
}

/// 镜像仓库记录，`imageType` 取 base / node / server
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TImage {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub image_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_type: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub releases: Vec<TImageRelease>,
}

tars_resource!(TImage, "TImage", "timages", "v1beta3");

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TAccountAuthenticationToken {
    pub name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<Time>,
    #[serde(default)]
    pub valid: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TAccountAuthentication {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcrypt_password: Option<String>,
    #[serde(default)]
    pub tokens: Vec<TAccountAuthenticationToken>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TAccountAuthorization {
    pub namespace: String,
    pub role: String,
}

/// TAccount 规格
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[kube(group = "tars.io", version = "v1beta3", kind = "TAccount", namespaced)]
#[kube(schema = "disabled", derive = "PartialEq", derive = "Default")]
#[serde(rename_all = "camelCase")]
pub struct TAccountSpec {
    pub username: String,
    #[serde(default)]
    pub authentication: TAccountAuthentication,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorization: Vec<TAccountAuthorization>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TTreeBusiness {
    pub name: String,
    #[serde(default)]
    pub show: String,
    #[serde(default)]
    pub weight: i32,
    #[serde(default)]
    pub mark: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TTreeApp {
    pub name: String,
    #[serde(default)]
    pub business_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_person: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<Time>,
    #[serde(default)]
    pub mark: String,
}

/// 每个命名空间唯一的业务与应用目录
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TTree {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub businesses: Vec<TTreeBusiness>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apps: Vec<TTreeApp>,
}

tars_resource!(TTree, "TTree", "ttrees", "v1beta3");

/// TTemplate 规格，经 `parent` 组成继承树
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[kube(group = "tars.io", version = "v1beta3", kind = "TTemplate", namespaced)]
#[kube(schema = "disabled", derive = "PartialEq", derive = "Default", shortname = "tt")]
#[serde(rename_all = "camelCase")]
pub struct TTemplateSpec {
    #[serde(default)]
    pub content: String,
    pub parent: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkImageRegistry {
    #[serde(default)]
    pub registry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkRecordLimit {
    #[serde(rename = "tconfigHistory", default)]
    pub tconfig_history: i32,
    #[serde(rename = "timageRelease", default)]
    pub timage_release: i32,
    #[serde(rename = "texitedPod", default)]
    pub texited_pod: i32,
}

/// 框架默认的 tarsnode 镜像
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkNodeImage {
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// 上游链路中的一个地址
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct UPChainItem {
    pub host: String,
    pub port: i32,
    #[serde(default)]
    pub timeout: i32,
    #[serde(default)]
    pub is_tcp: bool,
}

/// 每个命名空间唯一的框架配置，名称固定为 `tars-framework`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TFrameworkConfig {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub image_registry: FrameworkImageRegistry,
    #[serde(default)]
    pub record_limit: FrameworkRecordLimit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_image: Option<FrameworkNodeImage>,
    #[serde(rename = "upChain", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub up_chain: BTreeMap<String, Vec<UPChainItem>>,
}

tars_resource!(TFrameworkConfig, "TFrameworkConfig", "tframeworkconfigs", "v1beta3");
