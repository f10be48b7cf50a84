use k8s_openapi::api::apps::v1::{
    DaemonSet, DaemonSetSpec, DaemonSetUpdateStrategy, RollingUpdateDaemonSet, StatefulSet,
    StatefulSetSpec, StatefulSetUpdateStrategy,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use tars_common::crd::v1beta3::{default_update_strategy, TServer};
use tars_common::Result;

use super::pod::sync_pod_template;
use super::{dry_run, merge_labels, owned_labels, owned_meta, selector_labels, Translator};

const DEFAULT_POD_MANAGEMENT_POLICY: &str = "Parallel";

/// 没有发布的服务运行 0 个副本
fn replicas(ts: &TServer) -> i32 {
    match ts.spec.release {
        Some(_) => ts.spec.k8s.replicas,
        None => 0,
    }
}

fn statefulset_strategy(ts: &TServer) -> StatefulSetUpdateStrategy {
    ts.spec
        .k8s
        .update_strategy
        .clone()
        .unwrap_or_else(default_update_strategy)
}

/// DaemonSet 的 maxUnavailable 取 partition，至少为 1
pub(crate) fn daemonset_strategy(ts: &TServer) -> DaemonSetUpdateStrategy {
    let strategy = statefulset_strategy(ts);
    if strategy.type_.as_deref() == Some("OnDelete") {
        return DaemonSetUpdateStrategy {
            type_: Some("OnDelete".to_string()),
            rolling_update: None,
        };
    }
    let partition = strategy
        .rolling_update
        .and_then(|r| r.partition)
        .unwrap_or(0);
    DaemonSetUpdateStrategy {
        type_: Some("RollingUpdate".to_string()),
        rolling_update: Some(RollingUpdateDaemonSet {
            max_surge: Some(IntOrString::Int(0)),
            max_unavailable: Some(IntOrString::Int(partition.max(1))),
        }),
    }
}

fn selector(ts: &TServer) -> LabelSelector {
    LabelSelector {
        match_labels: Some(selector_labels(ts)),
        match_expressions: None,
    }
}

impl Translator {
    pub fn build_statefulset(&self, ts: &TServer) -> Result<StatefulSet> {
        let k8s = &ts.spec.k8s;
        Ok(StatefulSet {
            metadata: owned_meta(ts),
            spec: Some(StatefulSetSpec {
                replicas: Some(replicas(ts)),
                selector: selector(ts),
                service_name: ts.metadata.name.clone().unwrap_or_default(),
                pod_management_policy: Some(
                    k8s.pod_management_policy
                        .clone()
                        .unwrap_or_else(|| DEFAULT_POD_MANAGEMENT_POLICY.to_string()),
                ),
                revision_history_limit: Some(self.config.revision_history_limit),
                update_strategy: Some(statefulset_strategy(ts)),
                template: self.pod_template(ts, false)?,
                volume_claim_templates: Some(self.volume_claim_templates(ts)).filter(|c| !c.is_empty()),
                ..Default::default()
            }),
            status: None,
        })
    }

    /// selector、serviceName、podManagementPolicy 与 volumeClaimTemplates 不可变，不参与同步
    pub fn sync_statefulset(&self, ts: &TServer, live: &mut StatefulSet) -> Result<()> {
        let desired = self.build_statefulset(ts)?;
        let desired_spec = desired.spec.unwrap_or_default();

        merge_labels(&mut live.metadata.labels, owned_labels(ts));
        let spec = live.spec.get_or_insert_with(StatefulSetSpec::default);
        spec.replicas = desired_spec.replicas;
        spec.update_strategy = desired_spec.update_strategy;
        spec.revision_history_limit = desired_spec.revision_history_limit;
        sync_pod_template(desired_spec.template, &mut spec.template);
        Ok(())
    }

    pub fn equal_tserver_and_statefulset(&self, ts: &TServer, live: &StatefulSet) -> Result<bool> {
        Ok(!self.dry_run_sync_statefulset(ts, live)?.0)
    }

    pub fn dry_run_sync_statefulset(
        &self,
        ts: &TServer,
        live: &StatefulSet,
    ) -> Result<(bool, Option<StatefulSet>)> {
        dry_run(live, |copy| self.sync_statefulset(ts, copy))
    }

    pub fn build_daemonset(&self, ts: &TServer) -> Result<DaemonSet> {
        Ok(DaemonSet {
            metadata: owned_meta(ts),
            spec: Some(DaemonSetSpec {
                selector: selector(ts),
                revision_history_limit: Some(self.config.revision_history_limit),
                update_strategy: Some(daemonset_strategy(ts)),
                template: self.pod_template(ts, true)?,
                ..Default::default()
            }),
            status: None,
        })
    }

    pub fn sync_daemonset(&self, ts: &TServer, live: &mut DaemonSet) -> Result<()> {
        let desired = self.build_daemonset(ts)?;
        let desired_spec = desired.spec.unwrap_or_default();

        merge_labels(&mut live.metadata.labels, owned_labels(ts));
        let spec = live.spec.get_or_insert_with(DaemonSetSpec::default);
        spec.update_strategy = desired_spec.update_strategy;
        spec.revision_history_limit = desired_spec.revision_history_limit;
        sync_pod_template(desired_spec.template, &mut spec.template);
        Ok(())
    }

    pub fn equal_tserver_and_daemonset(&self, ts: &TServer, live: &DaemonSet) -> Result<bool> {
        Ok(!self.dry_run_sync_daemonset(ts, live)?.0)
    }

    pub fn dry_run_sync_daemonset(
        &self,
        ts: &TServer,
        live: &DaemonSet,
    ) -> Result<(bool, Option<DaemonSet>)> {
        dry_run(live, |copy| self.sync_daemonset(ts, copy))
    }
}
