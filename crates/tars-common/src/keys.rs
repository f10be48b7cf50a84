//! 标签与注解键
//!
//! 这些键会持久化在集群对象上，不同实现之间必须逐字节一致。

/// TServer v1beta1 <-> v1beta3 转换差异注解
pub const V1B1_V1B3_DIFF: &str = "tars.io/V1b1V1b3Diff";
/// v1beta2 <-> v1beta3 转换差异注解（TServer、TFrameworkConfig）
pub const V1B2_V1B3_DIFF: &str = "tars.io/V1b2V1b3Diff";

pub const MAX_REPLICAS: &str = "tars.io/MaxReplicas";
pub const MIN_REPLICAS: &str = "tars.io/MinReplicas";
pub const LAST_APPLIED_CONFIG: &str = "kubectl.kubernetes.io/last-applied-configuration";

pub const SERVER_APP_LABEL: &str = "tars.io/ServerApp";
pub const SERVER_NAME_LABEL: &str = "tars.io/ServerName";
pub const SUB_TYPE_LABEL: &str = "tars.io/SubType";
pub const TEMPLATE_LABEL: &str = "tars.io/Template";
pub const SERVER_ID_LABEL: &str = "tars.io/ServerID";
pub const CONFIG_NAME_LABEL: &str = "tars.io/ConfigName";
pub const POD_SEQ_LABEL: &str = "tars.io/PodSeq";
pub const ACTIVATED_LABEL: &str = "tars.io/Activated";
pub const VERSION_LABEL: &str = "tars.io/Version";
pub const PARENT_LABEL: &str = "tars.io/Parent";

/// TLocalVolume 声明的选择标签
pub const LOCAL_VOLUME_LABEL: &str = "tars.io/LocalVolume";
pub const LOCAL_VOLUME_UID: &str = "tars.io/LocalVolumeUID";
pub const LOCAL_VOLUME_GID: &str = "tars.io/LocalVolumeGID";
pub const LOCAL_VOLUME_MODE: &str = "tars.io/LocalVolumeMode";

/// 每个命名空间唯一的 TTree 名称
pub const TREE_NAME: &str = "tars-tree";
/// 每个命名空间唯一的 TFrameworkConfig 名称
pub const FRAMEWORK_CONFIG_NAME: &str = "tars-framework";

/// Tars 服务 Pod 的就绪门
pub const ACTIVE_READINESS_GATE: &str = "tars.io/active";

/// tarsnode 监听的端口，业务端口不可占用
pub const NODE_SERVANT_PORT: i32 = 19385;

/// 派生工作负载中保留的卷名
pub const TARSNODE_WORK_DIR_VOLUME: &str = "tarsnode-work-dir";
pub const HOST_LOG_DIR_VOLUME: &str = "host-log-dir";
pub const HOST_BIND_CLAIM: &str = "host-bind";

/// 节点选择标签前缀，完整键为 `tars.io/node.<namespace>`
pub const NODE_LABEL_PREFIX: &str = "tars.io/node.";
/// 能力标签前缀，完整键为 `tars.io/ability.<namespace>.<app>[-<server>]`
pub const ABILITY_LABEL_PREFIX: &str = "tars.io/ability.";

/// `tars.io/node.<namespace>`
pub fn node_label(namespace: &str) -> String {
    format!("{NODE_LABEL_PREFIX}{namespace}")
}

/// `tars.io/ability.<namespace>.<app>`
pub fn app_ability_label(namespace: &str, app: &str) -> String {
    format!("{ABILITY_LABEL_PREFIX}{namespace}.{app}")
}

/// `tars.io/ability.<namespace>.<app>-<server>`
pub fn server_ability_label(namespace: &str, app: &str, server: &str) -> String {
    format!("{ABILITY_LABEL_PREFIX}{namespace}.{app}-{server}")
}

/// 转义 JSON Pointer 中的单个路径片段（RFC 6901）
pub fn escape_json_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
