//! Pod 模板的派生与同步

use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    HostPathVolumeSource, LocalObjectReference, NodeAffinity, NodeSelector,
    NodeSelectorRequirement, NodeSelectorTerm, ObjectFieldSelector, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PodAffinityTerm, PodAntiAffinity, PodReadinessGate, PodSpec,
    PodTemplateSpec, PreferredSchedulingTerm, ResourceRequirements, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use tars_common::crd::v1beta3::{
    AbilityAffinityType, TK8SMount, TLocalVolume, TServer, TServerSubType,
    DEFAULT_IMAGE_PULL_POLICY,
};
use tars_common::{keys, Error, Result};

use super::{
    merge_labels, namespace, owned_labels, selector_labels, Translator, NODE_IMAGE_PLACEHOLDER,
    SERVICE_IMAGE_PLACEHOLDER,
};

/// tarsnode 初始化容器名称
pub const TARSNODE_CONTAINER: &str = "tarsnode";
/// tarsnode 工作目录在容器内的路径
pub const TARSNODE_WORK_DIR: &str = "/usr/local/app/tars/tarsnode";
/// 业务日志目录，同时也是宿主机上的目录
pub const HOST_LOG_DIR: &str = "/usr/local/app/tars/app_log";
/// DaemonSet 中 TLocalVolume 对应的宿主机目录前缀
pub const HOST_MOUNT_DIR: &str = "/usr/local/app/tars/host-mount";

const HOSTNAME_TOPOLOGY: &str = "kubernetes.io/hostname";
const DIRECTORY_OR_CREATE: &str = "DirectoryOrCreate";
const LOCAL_CLAIM_SIZE: &str = "1G";

/// 业务容器名称
pub(crate) fn primary_container_name(ts: &TServer) -> String {
    ts.spec.server.to_lowercase()
}

/// 业务端口的 (名称, 端口, 是否 TCP)
pub(crate) fn business_ports(ts: &TServer) -> Vec<(String, i32, bool)> {
    let spec = &ts.spec;
    let mut ports = Vec::new();
    if let Some(tars) = &spec.tars {
        ports.extend(tars.servants.iter().map(|s| (s.name.to_lowercase(), s.port, s.is_tcp)));
        ports.extend(tars.ports.iter().map(|p| (p.name.to_lowercase(), p.port, p.is_tcp)));
    }
    if let Some(normal) = &spec.normal {
        ports.extend(normal.ports.iter().map(|p| (p.name.to_lowercase(), p.port, p.is_tcp)));
    }
    ports
}

pub(crate) fn protocol(is_tcp: bool) -> String {
    let protocol = if is_tcp { "TCP" } else { "UDP" };
    protocol.to_string()
}

fn container_ports(ts: &TServer) -> Vec<ContainerPort> {
    let host_ports = &ts.spec.k8s.host_ports;
    business_ports(ts)
        .into_iter()
        .map(|(name, port, is_tcp)| ContainerPort {
            host_port: host_ports
                .iter()
                .find(|h| h.name_ref.to_lowercase() == name)
                .map(|h| h.port),
            name: Some(name),
            container_port: port,
            protocol: Some(protocol(is_tcp)),
            ..Default::default()
        })
        .collect()
}

fn field_env(name: &str, path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: path.to_string(),
            }),
            ..Default::default()
        }),
    }
}

fn value_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

fn env(ts: &TServer) -> Vec<EnvVar> {
    let spec = &ts.spec;
    let mut env = vec![
        field_env("Namespace", "metadata.namespace"),
        field_env("PodName", "metadata.name"),
        field_env("PodIP", "status.podIP"),
        value_env("ServerApp", &spec.app),
    ];
    if spec.sub_type == TServerSubType::Tars {
        let launcher = spec.k8s.launcher_type.unwrap_or_default();
        env.push(value_env("LauncherType", launcher.as_str()));
    }
    env.extend(spec.k8s.env.iter().cloned());
    env
}

fn exists(key: String) -> NodeSelectorRequirement {
    NodeSelectorRequirement {
        key,
        operator: "Exists".to_string(),
        values: None,
    }
}

fn preferred(weight: i32, key: String) -> PreferredSchedulingTerm {
    PreferredSchedulingTerm {
        weight,
        preference: NodeSelectorTerm {
            match_expressions: Some(vec![exists(key)]),
            match_fields: None,
        },
    }
}

/// 节点亲和性与反亲和性
pub(crate) fn affinity(ts: &TServer, daemon: bool) -> Affinity {
    let spec = &ts.spec;
    let ns = namespace(ts);

    let mut required = vec![exists(keys::node_label(&ns))];
    required.extend(spec.k8s.node_selector.iter().cloned());

    let app_label = keys::app_ability_label(&ns, &spec.app);
    let server_label = keys::server_ability_label(&ns, &spec.app, &spec.server);
    let mut preferences = Vec::new();
    if !daemon {
        match spec.k8s.ability_affinity {
            AbilityAffinityType::AppRequired => required.push(exists(app_label)),
            AbilityAffinityType::ServerRequired => required.push(exists(server_label)),
            AbilityAffinityType::AppOrServerPreferred => {
                preferences.push(preferred(60, server_label));
                preferences.push(preferred(30, app_label));
            }
            AbilityAffinityType::None => {}
        }
    }

    let pod_anti_affinity = (spec.k8s.not_stacked && !daemon).then(|| PodAntiAffinity {
        required_during_scheduling_ignored_during_execution: Some(vec![PodAffinityTerm {
            label_selector: Some(LabelSelector {
                match_labels: Some(selector_labels(ts)),
                match_expressions: None,
            }),
            topology_key: HOSTNAME_TOPOLOGY.to_string(),
            ..Default::default()
        }]),
        preferred_during_scheduling_ignored_during_execution: None,
    });

    Affinity {
        node_affinity: Some(NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(required),
                    match_fields: None,
                }],
            }),
            preferred_during_scheduling_ignored_during_execution: (!preferences.is_empty())
                .then_some(preferences),
        }),
        pod_affinity: None,
        pod_anti_affinity,
    }
}

/// Pod 需要独占宿主机资源时，额外申请一个 host-bind 本地卷
fn needs_host_bind(ts: &TServer) -> bool {
    let k8s = &ts.spec.k8s;
    k8s.host_ipc || k8s.host_network || !k8s.host_ports.is_empty()
}

fn volume_mount(mount: &TK8SMount) -> VolumeMount {
    VolumeMount {
        name: mount.name.clone(),
        mount_path: mount.mount_path.clone(),
        sub_path: mount.sub_path.clone(),
        sub_path_expr: mount.sub_path_expr.clone(),
        read_only: mount.read_only.then_some(true),
        mount_propagation: mount.mount_propagation.clone(),
    }
}

fn host_path(path: String) -> HostPathVolumeSource {
    HostPathVolumeSource {
        path,
        type_: Some(DIRECTORY_OR_CREATE.to_string()),
    }
}

/// 挂载对应的 Pod 卷；由 volumeClaimTemplates 提供的返回 None
fn mount_volume(ts: &TServer, mount: &TK8SMount, daemon: bool) -> Option<Volume> {
    let source = &mount.source;
    if source.t_local_volume.is_some() && daemon {
        let dir = format!(
            "{HOST_MOUNT_DIR}/{}/{}/{}",
            namespace(ts),
            ts.spec.app.to_lowercase() + "-" + &ts.spec.server.to_lowercase(),
            mount.name
        );
        return Some(Volume {
            name: mount.name.clone(),
            host_path: Some(host_path(dir)),
            ..Default::default()
        });
    }
    if source.is_claim() {
        return None;
    }
    Some(Volume {
        name: mount.name.clone(),
        host_path: source.host_path.clone(),
        empty_dir: source.empty_dir.clone(),
        config_map: source.config_map.clone(),
        secret: source.secret.clone(),
        persistent_volume_claim: source.persistent_volume_claim.clone(),
        downward_api: source.downward_api.clone(),
        projected: source.projected.clone(),
        nfs: source.nfs.clone(),
        ..Default::default()
    })
}

/// DaemonSet 无法使用 volumeClaimTemplates，PVC 模板挂载被忽略
fn usable_mounts(ts: &TServer, daemon: bool) -> impl Iterator<Item = &TK8SMount> {
    ts.spec.k8s.mounts.iter().filter(move |m| {
        let skip = daemon && m.source.persistent_volume_claim_template.is_some();
        if skip {
            debug!("DaemonSet {} 忽略 PVC 模板挂载 {}", ts.spec.server, m.name);
        }
        !skip
    })
}

fn volumes(ts: &TServer, daemon: bool) -> Vec<Volume> {
    let mut volumes: Vec<Volume> = usable_mounts(ts, daemon)
        .filter_map(|m| mount_volume(ts, m, daemon))
        .collect();
    if ts.spec.sub_type == TServerSubType::Tars {
        volumes.push(Volume {
            name: keys::TARSNODE_WORK_DIR_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
        volumes.push(Volume {
            name: keys::HOST_LOG_DIR_VOLUME.to_string(),
            host_path: Some(host_path(HOST_LOG_DIR.to_string())),
            ..Default::default()
        });
    }
    volumes
}

fn volume_mounts(ts: &TServer, daemon: bool) -> Vec<VolumeMount> {
    let mut mounts: Vec<VolumeMount> = usable_mounts(ts, daemon).map(volume_mount).collect();
    if ts.spec.sub_type == TServerSubType::Tars {
        mounts.push(VolumeMount {
            name: keys::TARSNODE_WORK_DIR_VOLUME.to_string(),
            mount_path: TARSNODE_WORK_DIR.to_string(),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: keys::HOST_LOG_DIR_VOLUME.to_string(),
            mount_path: HOST_LOG_DIR.to_string(),
            sub_path_expr: Some("$(Namespace).$(PodName)".to_string()),
            ..Default::default()
        });
    }
    mounts
}

fn local_claim(ts: &TServer, name: &str, volume: &TLocalVolume, annotate: bool) -> PersistentVolumeClaim {
    let mut labels = selector_labels(ts);
    labels.insert(keys::LOCAL_VOLUME_LABEL.to_string(), name.to_string());

    let annotations = annotate.then(|| {
        BTreeMap::from([
            (keys::LOCAL_VOLUME_UID.to_string(), volume.uid.clone()),
            (keys::LOCAL_VOLUME_GID.to_string(), volume.gid.clone()),
            (keys::LOCAL_VOLUME_MODE.to_string(), volume.mode.clone()),
        ])
    });

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels.clone()),
            annotations,
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: None,
            volume_mode: Some("Filesystem".to_string()),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(LOCAL_CLAIM_SIZE.to_string()),
                )])),
                ..Default::default()
            }),
            selector: Some(LabelSelector {
                match_labels: Some(labels),
                match_expressions: None,
            }),
            ..Default::default()
        }),
        status: None,
    }
}

impl Translator {
    /// 解析 tarsnode 镜像：发布指定优先，其次集群缺省值
    pub(crate) fn node_image(&self, ts: &TServer) -> Result<(String, Option<String>)> {
        let release_node = ts.spec.release.as_ref().and_then(|r| r.node_image.as_ref());
        if let Some(node) = release_node {
            if !node.image.is_empty() && node.image != NODE_IMAGE_PLACEHOLDER {
                return Ok((node.image.clone(), node.secret.clone()));
            }
        }

        let ns = namespace(ts);
        let (image, secret) = self.node_images.default_node_image(&ns);
        if image.is_empty() || image == NODE_IMAGE_PLACEHOLDER {
            return Err(Error::NodeImage(format!(
                "no default tarsnode image configured in namespace {ns}"
            )));
        }
        Ok((image, (!secret.is_empty()).then_some(secret)))
    }

    fn primary_container(&self, ts: &TServer, daemon: bool) -> Container {
        let spec = &ts.spec;
        let k8s = &spec.k8s;
        let image = spec
            .release
            .as_ref()
            .map_or(SERVICE_IMAGE_PLACEHOLDER.to_string(), |r| r.image.clone());

        Container {
            name: primary_container_name(ts),
            image: Some(image),
            image_pull_policy: Some(
                k8s.image_pull_policy
                    .clone()
                    .unwrap_or_else(|| DEFAULT_IMAGE_PULL_POLICY.to_string()),
            ),
            command: (!k8s.command.is_empty()).then(|| k8s.command.clone()),
            args: (!k8s.args.is_empty()).then(|| k8s.args.clone()),
            env: Some(env(ts)),
            env_from: (!k8s.env_from.is_empty()).then(|| k8s.env_from.clone()),
            ports: Some(container_ports(ts)).filter(|p| !p.is_empty()),
            resources: Some(k8s.resources.clone().unwrap_or_default()),
            volume_mounts: Some(volume_mounts(ts, daemon)).filter(|m| !m.is_empty()),
            ..Default::default()
        }
    }

    fn tarsnode_container(&self, image: String) -> Container {
        Container {
            name: TARSNODE_CONTAINER.to_string(),
            image: Some(image),
            image_pull_policy: Some(DEFAULT_IMAGE_PULL_POLICY.to_string()),
            resources: Some(ResourceRequirements::default()),
            volume_mounts: Some(vec![VolumeMount {
                name: keys::TARSNODE_WORK_DIR_VOLUME.to_string(),
                mount_path: TARSNODE_WORK_DIR.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    /// 派生 Pod 模板
    pub(crate) fn pod_template(&self, ts: &TServer, daemon: bool) -> Result<PodTemplateSpec> {
        let spec = &ts.spec;
        let k8s = &spec.k8s;

        let mut secrets: Vec<String> = spec.release.iter().filter_map(|r| r.secret.clone()).collect();
        let mut init_containers = Vec::new();
        if spec.sub_type == TServerSubType::Tars {
            let (image, secret) = self.node_image(ts)?;
            secrets.extend(secret);
            init_containers.push(self.tarsnode_container(image));
        }
        let mut seen = HashSet::new();
        secrets.retain(|s| !s.is_empty() && seen.insert(s.clone()));

        let mut readiness_gates = Vec::new();
        if spec.sub_type == TServerSubType::Tars {
            readiness_gates.push(keys::ACTIVE_READINESS_GATE.to_string());
        }
        readiness_gates.extend(k8s.readiness_gates.iter().cloned());

        let dns_policy = if k8s.host_network { "ClusterFirstWithHostNet" } else { "ClusterFirst" };

        Ok(PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(owned_labels(ts)),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                affinity: Some(affinity(ts, daemon)),
                host_network: k8s.host_network.then_some(true),
                host_ipc: k8s.host_ipc.then_some(true),
                dns_policy: Some(dns_policy.to_string()),
                service_account_name: Some(
                    k8s.service_account.clone().unwrap_or_else(|| "default".to_string()),
                ),
                image_pull_secrets: (!secrets.is_empty()).then(|| {
                    secrets
                        .into_iter()
                        .map(|name| LocalObjectReference { name: Some(name) })
                        .collect()
                }),
                readiness_gates: (!readiness_gates.is_empty()).then(|| {
                    readiness_gates
                        .into_iter()
                        .map(|condition_type| PodReadinessGate { condition_type })
                        .collect()
                }),
                init_containers: (!init_containers.is_empty()).then_some(init_containers),
                containers: vec![self.primary_container(ts, daemon)],
                volumes: Some(volumes(ts, daemon)).filter(|v| !v.is_empty()),
                ..Default::default()
            }),
        })
    }

    /// StatefulSet 的 volumeClaimTemplates
    pub(crate) fn volume_claim_templates(&self, ts: &TServer) -> Vec<PersistentVolumeClaim> {
        let mut claims = Vec::new();
        for mount in &ts.spec.k8s.mounts {
            let source = &mount.source;
            if let Some(template) = &source.persistent_volume_claim_template {
                let mut claim = template.clone();
                claim.metadata.name = Some(mount.name.clone());
                claims.push(claim);
            } else if let Some(volume) = &source.t_local_volume {
                claims.push(self.with_storage_class(local_claim(ts, &mount.name, volume, true)));
            }
        }
        if needs_host_bind(ts) {
            let claim = local_claim(ts, keys::HOST_BIND_CLAIM, &TLocalVolume::default(), false);
            claims.push(self.with_storage_class(claim));
        }
        claims
    }

    fn with_storage_class(&self, mut claim: PersistentVolumeClaim) -> PersistentVolumeClaim {
        if let Some(spec) = claim.spec.as_mut() {
            spec.storage_class_name = Some(self.config.local_storage_class.clone());
        }
        claim
    }
}

/// API Server 补全的端口字段沿用现有值；hostPort 仅在 hostNetwork 下由其补全
fn keep_port_defaults(desired: &mut [ContainerPort], live: &[ContainerPort], host_network: bool) {
    for port in desired {
        let Some(existing) = live
            .iter()
            .find(|p| p.container_port == port.container_port && p.name == port.name)
        else {
            continue;
        };
        if port.protocol.is_none() {
            port.protocol = existing.protocol.clone();
        }
        if port.host_port.is_none() && host_network && existing.host_port == Some(port.container_port) {
            port.host_port = existing.host_port;
        }
    }
}

/// API Server 补全的卷字段沿用现有值
fn keep_volume_defaults(desired: &mut Volume, live: &Volume) {
    if let (Some(d), Some(l)) = (desired.config_map.as_mut(), live.config_map.as_ref()) {
        d.default_mode = d.default_mode.or(l.default_mode);
    }
    if let (Some(d), Some(l)) = (desired.secret.as_mut(), live.secret.as_ref()) {
        d.default_mode = d.default_mode.or(l.default_mode);
    }
    if let (Some(d), Some(l)) = (desired.projected.as_mut(), live.projected.as_ref()) {
        d.default_mode = d.default_mode.or(l.default_mode);
    }
    if let (Some(d), Some(l)) = (desired.downward_api.as_mut(), live.downward_api.as_ref()) {
        d.default_mode = d.default_mode.or(l.default_mode);
    }
    if let (Some(d), Some(l)) = (desired.host_path.as_mut(), live.host_path.as_ref()) {
        if d.type_.is_none() {
            d.type_ = l.type_.clone();
        }
    }
}

/// 用期望的容器覆盖同名容器中翻译器拥有的字段
fn sync_container(mut desired: Container, live: &mut Container, host_network: bool) {
    if let (Some(ports), Some(existing)) = (desired.ports.as_mut(), live.ports.as_ref()) {
        keep_port_defaults(ports, existing, host_network);
    }
    live.image = desired.image;
    live.image_pull_policy = desired.image_pull_policy;
    live.command = desired.command;
    live.args = desired.args;
    live.env = desired.env;
    live.env_from = desired.env_from;
    live.ports = desired.ports;
    live.resources = desired.resources;
    live.volume_mounts = desired.volume_mounts;
}

/// 同步容器列表：缺失的插入到最前，其他组件注入的容器保留
fn sync_containers(desired: Vec<Container>, live: &mut Vec<Container>, host_network: bool) {
    for (index, container) in desired.into_iter().enumerate() {
        match live.iter_mut().find(|c| c.name == container.name) {
            Some(existing) => sync_container(container, existing, host_network),
            None => live.insert(index.min(live.len()), container),
        }
    }
}

/// 同步 Pod 模板中翻译器拥有的部分
pub(crate) fn sync_pod_template(desired: PodTemplateSpec, live: &mut PodTemplateSpec) {
    let desired_labels = desired
        .metadata
        .and_then(|m| m.labels)
        .unwrap_or_default();
    merge_labels(&mut live.metadata.get_or_insert_with(ObjectMeta::default).labels, desired_labels);

    let desired = desired.spec.unwrap_or_default();
    let live = live.spec.get_or_insert_with(PodSpec::default);

    live.affinity = desired.affinity;
    live.host_network = desired.host_network;
    live.host_ipc = desired.host_ipc;
    live.dns_policy = desired.dns_policy;
    live.service_account_name = desired.service_account_name;
    live.image_pull_secrets = desired.image_pull_secrets;
    live.readiness_gates = desired.readiness_gates;

    let host_network = desired.host_network.unwrap_or(false);
    let owned: HashSet<String> = desired.containers.iter().map(|c| c.name.clone()).collect();
    sync_containers(desired.containers, &mut live.containers, host_network);

    let mut init_containers = live.init_containers.take().unwrap_or_default();
    let desired_init = desired.init_containers.unwrap_or_default();
    if desired_init.is_empty() {
        init_containers.retain(|c| c.name != TARSNODE_CONTAINER);
    }
    sync_containers(desired_init.clone(), &mut init_containers, host_network);
    live.init_containers = (!init_containers.is_empty()).then_some(init_containers);

    // 其他组件注入的容器仍在引用的卷需要保留
    let live_volumes = live.volumes.take().unwrap_or_default();
    let mut desired_volumes = desired.volumes.unwrap_or_default();
    for volume in desired_volumes.iter_mut() {
        if let Some(existing) = live_volumes.iter().find(|v| v.name == volume.name) {
            keep_volume_defaults(volume, existing);
        }
    }
    let desired_names: HashSet<&str> = desired_volumes.iter().map(|v| v.name.as_str()).collect();
    let init_owned: HashSet<&str> = desired_init.iter().map(|c| c.name.as_str()).collect();
    let foreign_refs: HashSet<String> = live
        .containers
        .iter()
        .filter(|c| !owned.contains(&c.name))
        .chain(
            live.init_containers
                .iter()
                .flatten()
                .filter(|c| !init_owned.contains(c.name.as_str())),
        )
        .flat_map(|c| c.volume_mounts.iter().flatten())
        .map(|m| m.name.clone())
        .collect();

    let foreign_volumes: Vec<Volume> = live_volumes
        .into_iter()
        .filter(|v| !desired_names.contains(v.name.as_str()) && foreign_refs.contains(&v.name))
        .collect();
    let mut volumes = desired_volumes;
    volumes.extend(foreign_volumes);
    live.volumes = (!volumes.is_empty()).then_some(volumes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::tests::{translator, tserver, NODE_IMAGE};
    use crate::translator::{StaticNodeImage, TranslatorConfig};
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    fn pod_spec(template: &PodTemplateSpec) -> &PodSpec {
        template.spec.as_ref().unwrap()
    }

    #[test]
    fn test_ports_with_host_port_and_protocol() {
        let ts = tserver(json!({
            "tars": {
                "template": "tars.cpp",
                "servants": [{"name": "HelloObj", "port": 10000, "isTcp": true, "isTars": true}],
                "ports": [{"name": "Stat", "port": 10001, "isTcp": false}]
            },
            "k8s": {"hostPorts": [{"nameRef": "helloobj", "port": 20000}]}
        }));
        let ports = container_ports(&ts);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].name.as_deref(), Some("helloobj"));
        assert_eq!(ports[0].host_port, Some(20000));
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));
        assert_eq!(ports[1].host_port, None);
        assert_eq!(ports[1].protocol.as_deref(), Some("UDP"));
    }

    #[rstest]
    #[case("AppRequired", 2, false)]
    #[case("ServerRequired", 2, false)]
    #[case("AppOrServerPreferred", 1, true)]
    #[case("None", 1, false)]
    fn test_ability_affinity(#[case] ability: &str, #[case] required: usize, #[case] has_preferred: bool) {
        let ts = tserver(json!({"k8s": {"abilityAffinity": ability}}));
        let affinity = affinity(&ts, false);
        let node = affinity.node_affinity.unwrap();
        let terms = node.required_during_scheduling_ignored_during_execution.unwrap().node_selector_terms;
        let expressions = terms[0].match_expressions.as_ref().unwrap();
        assert_eq!(expressions.len(), required);
        assert_eq!(expressions[0].key, "tars.io/node.tars");
        assert_eq!(node.preferred_during_scheduling_ignored_during_execution.is_some(), has_preferred);
        assert!(affinity.pod_anti_affinity.is_none());

        let daemon = affinity_keys(&ts, true);
        assert_eq!(daemon, vec!["tars.io/node.tars".to_string()]);
    }

    fn affinity_keys(ts: &TServer, daemon: bool) -> Vec<String> {
        affinity(ts, daemon)
            .node_affinity
            .and_then(|n| n.required_during_scheduling_ignored_during_execution)
            .map(|s| s.node_selector_terms[0].match_expressions.clone().unwrap_or_default())
            .unwrap_or_default()
            .into_iter()
            .map(|e| e.key)
            .collect()
    }

    #[test]
    fn test_server_required_label() {
        let ts = tserver(json!({"k8s": {"abilityAffinity": "ServerRequired"}}));
        assert_eq!(
            affinity_keys(&ts, false),
            vec!["tars.io/node.tars", "tars.io/ability.tars.Test-HelloServer"]
        );
    }

    #[test]
    fn test_not_stacked_anti_affinity() {
        let ts = tserver(json!({"k8s": {"notStacked": true}}));
        let anti = affinity(&ts, false).pod_anti_affinity.unwrap();
        let term = &anti.required_during_scheduling_ignored_during_execution.unwrap()[0];
        assert_eq!(term.topology_key, "kubernetes.io/hostname");
        let labels = term.label_selector.as_ref().unwrap().match_labels.as_ref().unwrap();
        assert_eq!(labels[keys::SERVER_NAME_LABEL], "HelloServer");
    }

    #[test]
    fn test_tarsnode_image_from_release() {
        let ts = tserver(json!({
            "release": {
                "id": "10001",
                "image": "test/helloserver:10001",
                "nodeImage": {"image": "tarscloud/tars.tarsnode:custom", "secret": "node-secret"}
            }
        }));
        let template = translator().pod_template(&ts, false).unwrap();
        let spec = pod_spec(&template);
        let init = &spec.init_containers.as_ref().unwrap()[0];
        assert_eq!(init.name, TARSNODE_CONTAINER);
        assert_eq!(init.image.as_deref(), Some("tarscloud/tars.tarsnode:custom"));
        let secrets: Vec<_> = spec.image_pull_secrets.as_ref().unwrap().iter().map(|s| s.name.clone().unwrap()).collect();
        assert_eq!(secrets, vec!["node-secret"]);
    }

    #[test]
    fn test_tarsnode_placeholder_falls_back_to_default() {
        let ts = tserver(json!({
            "release": {
                "id": "10001",
                "image": "test/helloserver:10001",
                "nodeImage": {"image": NODE_IMAGE_PLACEHOLDER}
            }
        }));
        let (image, secret) = translator().node_image(&ts).unwrap();
        assert_eq!(image, NODE_IMAGE);
        assert_eq!(secret.as_deref(), Some("tars-image-secret"));
    }

    #[test]
    fn test_missing_default_node_image_is_error() {
        let translator = Translator::new(
            TranslatorConfig::default(),
            Arc::new(StaticNodeImage {
                image: NODE_IMAGE_PLACEHOLDER.to_string(),
                secret: String::new(),
            }),
        );
        let err = translator.pod_template(&tserver(json!({})), false).unwrap_err();
        assert!(matches!(err, Error::NodeImage(_)));

        let normal = tserver(json!({"subType": "normal", "tars": null, "normal": {"ports": []}}));
        let template = translator.pod_template(&normal, false).unwrap();
        assert!(pod_spec(&template).init_containers.is_none());
    }

    #[test]
    fn test_tars_pod_defaults() {
        let ts = tserver(json!({"k8s": {"readinessGates": ["custom-gate"], "launcherType": "foreground"}}));
        let template = translator().pod_template(&ts, false).unwrap();
        let spec = pod_spec(&template);

        let gates: Vec<_> = spec.readiness_gates.as_ref().unwrap().iter().map(|g| g.condition_type.as_str()).collect();
        assert_eq!(gates, vec!["tars.io/active", "custom-gate"]);
        assert_eq!(spec.dns_policy.as_deref(), Some("ClusterFirst"));

        let container = &spec.containers[0];
        assert_eq!(container.name, "helloserver");
        assert_eq!(container.image.as_deref(), Some("test/helloserver:10001"));
        let env = container.env.as_ref().unwrap();
        let launcher = env.iter().find(|e| e.name == "LauncherType").unwrap();
        assert_eq!(launcher.value.as_deref(), Some("foreground"));

        let volumes: Vec<_> = spec.volumes.as_ref().unwrap().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(volumes, vec![keys::TARSNODE_WORK_DIR_VOLUME, keys::HOST_LOG_DIR_VOLUME]);
    }

    #[test]
    fn test_volume_claim_templates() {
        let ts = tserver(json!({
            "k8s": {
                "hostNetwork": true,
                "mounts": [
                    {"name": "data", "mountPath": "/data", "source": {"tLocalVolume": {"uid": "1000", "gid": "1000", "mode": "700"}}},
                    {"name": "cache", "mountPath": "/cache", "source": {"persistentVolumeClaimTemplate": {"metadata": {}, "spec": {"accessModes": ["ReadWriteOnce"]}}}},
                    {"name": "tmp", "mountPath": "/tmp", "source": {"emptyDir": {}}}
                ]
            }
        }));
        let claims = translator().volume_claim_templates(&ts);
        let names: Vec<_> = claims.iter().map(|c| c.metadata.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["data", "cache", keys::HOST_BIND_CLAIM]);

        let local = &claims[0];
        let annotations = local.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations[keys::LOCAL_VOLUME_MODE], "700");
        assert_eq!(local.metadata.labels.as_ref().unwrap()[keys::LOCAL_VOLUME_LABEL], "data");
        assert_eq!(
            local.spec.as_ref().unwrap().storage_class_name.as_deref(),
            Some("tars-storage-class")
        );
        assert!(claims[2].metadata.annotations.is_none());

        let template = translator().pod_template(&ts, false).unwrap();
        let spec = pod_spec(&template);
        assert_eq!(spec.dns_policy.as_deref(), Some("ClusterFirstWithHostNet"));
        let volumes: Vec<_> = spec.volumes.as_ref().unwrap().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(volumes[0], "tmp");
    }

    #[test]
    fn test_daemonset_local_volume_is_host_path() {
        let ts = tserver(json!({
            "k8s": {
                "daemonSet": true,
                "mounts": [
                    {"name": "data", "mountPath": "/data", "source": {"tLocalVolume": {}}},
                    {"name": "cache", "mountPath": "/cache", "source": {"persistentVolumeClaimTemplate": {"metadata": {}}}}
                ]
            }
        }));
        let template = translator().pod_template(&ts, true).unwrap();
        let spec = pod_spec(&template);
        let data = &spec.volumes.as_ref().unwrap()[0];
        assert_eq!(data.name, "data");
        let host_path = data.host_path.as_ref().unwrap();
        assert_eq!(host_path.path, "/usr/local/app/tars/host-mount/tars/test-helloserver/data");
        assert_eq!(host_path.type_.as_deref(), Some("DirectoryOrCreate"));

        let mounts = spec.containers[0].volume_mounts.as_ref().unwrap();
        assert!(mounts.iter().all(|m| m.name != "cache"));
    }

    #[test]
    fn test_sync_keeps_foreign_containers_and_volumes() {
        let ts = tserver(json!({}));
        let desired = translator().pod_template(&ts, false).unwrap();

        let mut live = desired.clone();
        let spec = live.spec.as_mut().unwrap();
        spec.containers.push(Container {
            name: "log-agent".to_string(),
            image: Some("fluent-bit:2".to_string()),
            volume_mounts: Some(vec![VolumeMount {
                name: "agent-config".to_string(),
                mount_path: "/etc/agent".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        });
        spec.volumes.get_or_insert_with(Vec::new).push(Volume {
            name: "agent-config".to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
        spec.volumes.get_or_insert_with(Vec::new).push(Volume {
            name: "stale".to_string(),
            ..Default::default()
        });
        spec.containers[0].image = Some("test/helloserver:old".to_string());

        sync_pod_template(desired, &mut live);
        let spec = pod_spec(&live);
        let names: Vec<_> = spec.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["helloserver", "log-agent"]);
        assert_eq!(spec.containers[0].image.as_deref(), Some("test/helloserver:10001"));

        let volumes: Vec<_> = spec.volumes.as_ref().unwrap().iter().map(|v| v.name.as_str()).collect();
        assert!(volumes.contains(&"agent-config"));
        assert!(!volumes.contains(&"stale"));
    }

    #[test]
    fn test_sync_removes_tarsnode_for_normal_server() {
        let tars = tserver(json!({}));
        let mut live = translator().pod_template(&tars, false).unwrap();

        let normal = tserver(json!({"subType": "normal", "tars": null, "normal": {"ports": [{"name": "http", "port": 80, "isTcp": true}]}}));
        let desired = translator().pod_template(&normal, false).unwrap();
        sync_pod_template(desired.clone(), &mut live);
        assert!(pod_spec(&live).init_containers.is_none());
        assert_eq!(live, desired);
    }
}
