//! TServer 的版本转换
//!
//! 升级（v1beta1/v1beta2 -> v1beta3）读取并删除差异注解，
//! 注解中没有、也未被标记为缺省的中心版本字段补默认值。
//! 降级只把与默认值不同的中心版本字段写入差异注解，
//! 因此低版本对象先升后降可以原样还原。

use k8s_openapi::api::apps::v1::StatefulSetUpdateStrategy;
use serde::{Deserialize, Serialize};

use tars_common::crd::{v1beta1, v1beta2, v1beta3};
use tars_common::{keys, Result};

use super::diff::{put_diff, take_diff, ConversionDiff};
use super::retag::{retag_enum, retag_struct, Retag};

pub const UPDATE_STRATEGY: &str = "updateStrategy";
pub const IMAGE_PULL_POLICY: &str = "imagePullPolicy";
pub const LAUNCHER_TYPE: &str = "launcherType";

retag_enum!(v1beta1::TServerSubType, v1beta3::TServerSubType { Tars, Normal });
retag_enum!(v1beta2::TServerSubType, v1beta3::TServerSubType { Tars, Normal });
retag_enum!(v1beta1::AbilityAffinityType, v1beta3::AbilityAffinityType {
    AppRequired,
    ServerRequired,
    AppOrServerPreferred,
    None,
});
retag_enum!(v1beta2::AbilityAffinityType, v1beta3::AbilityAffinityType {
    AppRequired,
    ServerRequired,
    AppOrServerPreferred,
    None,
});

macro_rules! retag_shared {
    ($v:ident) => {
        retag_struct!($v::TServerServant, v1beta3::TServerServant {
            copy: [name, port, thread, connection, capacity, timeout, is_tars, is_tcp],
            retag: [],
        });
        retag_struct!($v::TServerPort, v1beta3::TServerPort {
            copy: [name, port, is_tcp],
            retag: [],
        });
        retag_struct!($v::TServerTars, v1beta3::TServerTars {
            copy: [template, profile, async_thread],
            retag: [servants, ports],
        });
        retag_struct!($v::TServerNormal, v1beta3::TServerNormal {
            copy: [],
            retag: [ports],
        });
        retag_struct!($v::TK8SHostPort, v1beta3::TK8SHostPort {
            copy: [name_ref, port],
            retag: [],
        });
        retag_struct!($v::TLocalVolume, v1beta3::TLocalVolume {
            copy: [uid, gid, mode],
            retag: [],
        });
        retag_struct!($v::TK8SMountSource, v1beta3::TK8SMountSource {
            copy: [
                host_path,
                empty_dir,
                config_map,
                secret,
                persistent_volume_claim,
                downward_api,
                projected,
                nfs,
                persistent_volume_claim_template,
            ],
            retag: [t_local_volume],
        });
        retag_struct!($v::TK8SMount, v1beta3::TK8SMount {
            copy: [name, mount_path, sub_path, sub_path_expr, read_only, mount_propagation],
            retag: [source],
        });
        retag_struct!($v::TServerStatus, v1beta3::TServerStatus {
            copy: [replicas, ready_replicas, current_replicas, selector],
            retag: [],
        });
    };
}

retag_shared!(v1beta1);
retag_shared!(v1beta2);

retag_struct!(v1beta2::TServerReleaseNode, v1beta3::TServerReleaseNode {
    copy: [image, secret],
    retag: [],
});
retag_struct!(v1beta2::TServerRelease, v1beta3::TServerRelease {
    copy: [id, image, secret, time],
    retag: [node_image],
});

/// v1beta2 放不下的 k8s 字段
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HubOnlyK8S {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_strategy: Option<StatefulSetUpdateStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launcher_type: Option<v1beta3::LauncherType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// v1beta1 放不下的字段：在 v1beta2 的基础上，再加第一个之后的就绪门与 nodeImage
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct V1b1Append {
    #[serde(flatten)]
    pub k8s: HubOnlyK8S,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readiness_gates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_image: Option<v1beta3::TServerReleaseNode>,
}

/// 降级时暂存中心版本字段：缺省记入 drop，等于默认值则无需保存
fn stash<T: PartialEq>(value: Option<T>, default: T, field: &str, drop: &mut Vec<String>) -> Option<T> {
    match value {
        None => {
            drop.push(field.to_string());
            None
        }
        Some(v) if v == default => None,
        Some(v) => Some(v),
    }
}

/// 升级时恢复中心版本字段
fn restore<T>(stashed: Option<T>, dropped: bool, default: impl FnOnce() -> T) -> Option<T> {
    match stashed {
        Some(v) => Some(v),
        None if dropped => None,
        None => Some(default()),
    }
}

impl HubOnlyK8S {
    fn stash(k8s: &mut v1beta3::TServerK8S, drop: &mut Vec<String>) -> Self {
        HubOnlyK8S {
            update_strategy: stash(
                k8s.update_strategy.take(),
                v1beta3::default_update_strategy(),
                UPDATE_STRATEGY,
                drop,
            ),
            image_pull_policy: stash(
                k8s.image_pull_policy.take(),
                v1beta3::DEFAULT_IMAGE_PULL_POLICY.to_string(),
                IMAGE_PULL_POLICY,
                drop,
            ),
            launcher_type: stash(
                k8s.launcher_type.take(),
                v1beta3::LauncherType::default(),
                LAUNCHER_TYPE,
                drop,
            ),
            command: std::mem::take(&mut k8s.command),
            args: std::mem::take(&mut k8s.args),
        }
    }

    fn restore<A>(self, diff: &ConversionDiff<A>, k8s: &mut v1beta3::TServerK8S) {
        k8s.update_strategy = restore(
            self.update_strategy,
            diff.drops(UPDATE_STRATEGY),
            v1beta3::default_update_strategy,
        );
        k8s.image_pull_policy = restore(self.image_pull_policy, diff.drops(IMAGE_PULL_POLICY), || {
            v1beta3::DEFAULT_IMAGE_PULL_POLICY.to_string()
        });
        k8s.launcher_type = restore(
            self.launcher_type,
            diff.drops(LAUNCHER_TYPE),
            v1beta3::LauncherType::default,
        );
        k8s.command = self.command;
        k8s.args = self.args;
    }
}

/// v1beta1 -> v1beta3
pub fn v1b1_to_v1b3(src: v1beta1::TServer) -> Result<v1beta3::TServer> {
    let v1beta1::TServer {
        mut metadata,
        spec,
        status,
    } = src;
    let diff: ConversionDiff<V1b1Append> = take_diff(&mut metadata, keys::V1B1_V1B3_DIFF);
    let append = diff.append.clone().unwrap_or_default();

    let k8s = spec.k8s;
    let mut readiness_gates: Vec<String> = k8s.readiness_gate.into_iter().collect();
    readiness_gates.extend(append.readiness_gates);

    let mut hub_k8s = v1beta3::TServerK8S {
        service_account: k8s.service_account,
        env: k8s.env,
        env_from: k8s.env_from,
        host_network: k8s.host_network,
        host_ipc: k8s.host_ipc,
        host_ports: k8s.host_ports.retag(),
        mounts: k8s.mounts.retag(),
        daemon_set: k8s.daemon_set,
        node_selector: k8s.node_selector,
        ability_affinity: k8s.ability_affinity.retag(),
        not_stacked: k8s.not_stacked,
        pod_management_policy: k8s.pod_management_policy,
        replicas: k8s.replicas,
        readiness_gates,
        resources: k8s.resources,
        ..Default::default()
    };
    append.k8s.restore(&diff, &mut hub_k8s);

    let node_image = append.node_image;
    let release = spec.release.map(|release| v1beta3::TServerRelease {
        id: release.id,
        image: release.image,
        secret: release.secret,
        time: release.time,
        node_image,
    });

    Ok(v1beta3::TServer {
        metadata,
        spec: v1beta3::TServerSpec {
            app: spec.app,
            server: spec.server,
            sub_type: spec.sub_type.retag(),
            tars: spec.tars.retag(),
            normal: spec.normal.retag(),
            k8s: hub_k8s,
            release,
        },
        status: status.retag(),
    })
}

/// v1beta3 -> v1beta1
pub fn v1b3_to_v1b1(src: v1beta3::TServer) -> Result<v1beta1::TServer> {
    let v1beta3::TServer {
        mut metadata,
        spec,
        status,
    } = src;
    let mut k8s = spec.k8s;

    let mut drop = Vec::new();
    let hub = HubOnlyK8S::stash(&mut k8s, &mut drop);
    let mut gates = k8s.readiness_gates.into_iter();
    let readiness_gate = gates.next();

    let (release, node_image) = match spec.release {
        Some(release) => (
            Some(v1beta1::TServerRelease {
                id: release.id,
                image: release.image,
                secret: release.secret,
                time: release.time,
            }),
            release.node_image,
        ),
        None => (None, None),
    };

    let append = V1b1Append {
        k8s: hub,
        readiness_gates: gates.collect(),
        node_image,
    };
    put_diff(&mut metadata, keys::V1B1_V1B3_DIFF, &ConversionDiff::new(append, drop))?;

    Ok(v1beta1::TServer {
        metadata,
        spec: v1beta1::TServerSpec {
            app: spec.app,
            server: spec.server,
            sub_type: spec.sub_type.retag(),
            tars: spec.tars.retag(),
            normal: spec.normal.retag(),
            k8s: v1beta1::TServerK8S {
                service_account: k8s.service_account,
                env: k8s.env,
                env_from: k8s.env_from,
                host_network: k8s.host_network,
                host_ipc: k8s.host_ipc,
                host_ports: k8s.host_ports.retag(),
                mounts: k8s.mounts.retag(),
                daemon_set: k8s.daemon_set,
                node_selector: k8s.node_selector,
                ability_affinity: k8s.ability_affinity.retag(),
                not_stacked: k8s.not_stacked,
                pod_management_policy: k8s.pod_management_policy,
                replicas: k8s.replicas,
                readiness_gate,
                resources: k8s.resources,
            },
            release,
        },
        status: status.retag(),
    })
}

/// v1beta2 -> v1beta3
pub fn v1b2_to_v1b3(src: v1beta2::TServer) -> Result<v1beta3::TServer> {
    let v1beta2::TServer {
        mut metadata,
        spec,
        status,
    } = src;
    let diff: ConversionDiff<HubOnlyK8S> = take_diff(&mut metadata, keys::V1B2_V1B3_DIFF);
    let hub = diff.append.clone().unwrap_or_default();

    let k8s = spec.k8s;
    let mut hub_k8s = v1beta3::TServerK8S {
        service_account: k8s.service_account,
        env: k8s.env,
        env_from: k8s.env_from,
        host_network: k8s.host_network,
        host_ipc: k8s.host_ipc,
        host_ports: k8s.host_ports.retag(),
        mounts: k8s.mounts.retag(),
        daemon_set: k8s.daemon_set,
        node_selector: k8s.node_selector,
        ability_affinity: k8s.ability_affinity.retag(),
        not_stacked: k8s.not_stacked,
        pod_management_policy: k8s.pod_management_policy,
        replicas: k8s.replicas,
        readiness_gates: k8s.readiness_gates,
        resources: k8s.resources,
        ..Default::default()
    };
    hub.restore(&diff, &mut hub_k8s);

    Ok(v1beta3::TServer {
        metadata,
        spec: v1beta3::TServerSpec {
            app: spec.app,
            server: spec.server,
            sub_type: spec.sub_type.retag(),
            tars: spec.tars.retag(),
            normal: spec.normal.retag(),
            k8s: hub_k8s,
            release: spec.release.retag(),
        },
        status: status.retag(),
    })
}

/// v1beta3 -> v1beta2
pub fn v1b3_to_v1b2(src: v1beta3::TServer) -> Result<v1beta2::TServer> {
    let v1beta3::TServer {
        mut metadata,
        spec,
        status,
    } = src;
    let mut k8s = spec.k8s;

    let mut drop = Vec::new();
    let hub = HubOnlyK8S::stash(&mut k8s, &mut drop);
    put_diff(&mut metadata, keys::V1B2_V1B3_DIFF, &ConversionDiff::new(hub, drop))?;

    Ok(v1beta2::TServer {
        metadata,
        spec: v1beta2::TServerSpec {
            app: spec.app,
            server: spec.server,
            sub_type: spec.sub_type.retag(),
            tars: spec.tars.retag(),
            normal: spec.normal.retag(),
            k8s: v1beta2::TServerK8S {
                service_account: k8s.service_account,
                env: k8s.env,
                env_from: k8s.env_from,
                host_network: k8s.host_network,
                host_ipc: k8s.host_ipc,
                host_ports: k8s.host_ports.retag(),
                mounts: k8s.mounts.retag(),
                daemon_set: k8s.daemon_set,
                node_selector: k8s.node_selector,
                ability_affinity: k8s.ability_affinity.retag(),
                not_stacked: k8s.not_stacked,
                pod_management_policy: k8s.pod_management_policy,
                replicas: k8s.replicas,
                readiness_gates: k8s.readiness_gates,
                resources: k8s.resources,
            },
            release: spec.release.retag(),
        },
        status: status.retag(),
    })
}

/// v1beta1 -> v1beta2，经由中心版本
pub fn v1b1_to_v1b2(src: v1beta1::TServer) -> Result<v1beta2::TServer> {
    v1b3_to_v1b2(v1b1_to_v1b3(src)?)
}

/// v1beta2 -> v1beta1，经由中心版本
pub fn v1b2_to_v1b1(src: v1beta2::TServer) -> Result<v1beta1::TServer> {
    v1b3_to_v1b1(v1b2_to_v1b3(src)?)
}
