//! 资源协调模块
//!
//! TServer 的协调过程：删除类型不符的旧工作负载，依次创建或同步
//! StatefulSet/DaemonSet、Service、TEndpoint 与 TExitedRecord，
//! 最后把工作负载的副本数写回 TServer 状态。首次发布之前不创建任何对象。

use k8s_openapi::api::apps::v1::{DaemonSet, StatefulSet};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use tars_common::crd::v1beta3::{TEndpoint, TExitedRecord, TServer, TServerStatus};
use tars_common::{keys, Error, Result};
use tars_controller::Translator;

/// 协调上下文
pub struct Context {
    /// Kubernetes 客户端
    pub client: Client,
    /// 工作负载翻译器
    pub translator: Arc<Translator>,
    /// 事件上报者
    pub reporter: Reporter,
}

/// TServer 工作负载所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadState {
    /// 尚未发布；首次发布前不创建工作负载
    NoWorkload,
    /// 工作负载刚创建或仍有副本未就绪
    Creating,
    /// 全部副本就绪
    Steady,
}

impl WorkloadState {
    fn requeue(self) -> Action {
        match self {
            WorkloadState::Creating => Action::requeue(Duration::from_secs(10)),
            WorkloadState::NoWorkload | WorkloadState::Steady => {
                Action::requeue(Duration::from_secs(300))
            }
        }
    }
}

/// 单个派生对象的处理方式
#[derive(Debug, PartialEq)]
pub(crate) enum Step<K> {
    Create(K),
    Replace(K),
    Keep(K),
}

/// 对象不存在时创建，存在且同步后有变化时替换
pub(crate) fn plan<K>(
    live: Option<K>,
    build: impl FnOnce() -> Result<K>,
    dry_run: impl FnOnce(&K) -> Result<(bool, Option<K>)>,
) -> Result<Step<K>> {
    let Some(live) = live else {
        return Ok(Step::Create(build()?));
    };
    match dry_run(&live)? {
        (true, Some(patched)) => Ok(Step::Replace(patched)),
        _ => Ok(Step::Keep(live)),
    }
}

/// 对象是否由该 TServer 控制
pub(crate) fn controlled_by(meta: &ObjectMeta, ts: &TServer) -> bool {
    let Some(uid) = ts.uid() else {
        return false;
    };
    meta.owner_references
        .iter()
        .flatten()
        .any(|owner| owner.controller == Some(true) && owner.uid == uid)
}

fn status_selector(ts: &TServer) -> String {
    format!(
        "{}={},{}={}",
        keys::SERVER_APP_LABEL,
        ts.spec.app,
        keys::SERVER_NAME_LABEL,
        ts.spec.server
    )
}

pub(crate) fn status_from_statefulset(ts: &TServer, sts: &StatefulSet) -> TServerStatus {
    let status = sts.status.clone().unwrap_or_default();
    TServerStatus {
        replicas: status.replicas,
        ready_replicas: status.ready_replicas.unwrap_or(0),
        current_replicas: status.current_replicas.unwrap_or(0),
        selector: status_selector(ts),
    }
}

pub(crate) fn status_from_daemonset(ts: &TServer, ds: &DaemonSet) -> TServerStatus {
    let status = ds.status.clone().unwrap_or_default();
    TServerStatus {
        replicas: status.desired_number_scheduled,
        ready_replicas: status.number_ready,
        current_replicas: status.current_number_scheduled,
        selector: status_selector(ts),
    }
}

/// 没有发布且尚未创建过工作负载时，不派生任何对象
pub(crate) fn awaits_release(ts: &TServer, has_workload: bool) -> bool {
    ts.spec.release.is_none() && !has_workload
}

pub(crate) fn workload_state(ts: &TServer, status: &TServerStatus, created: bool) -> WorkloadState {
    if ts.spec.release.is_none() {
        WorkloadState::NoWorkload
    } else if created || status.ready_replicas < status.replicas {
        WorkloadState::Creating
    } else {
        WorkloadState::Steady
    }
}

/// 执行处理方式，返回集群中的对象以及是否新建
async fn apply<K>(api: &Api<K>, step: Step<K>) -> Result<(K, bool)>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    let params = PostParams::default();
    match step {
        Step::Create(object) => Ok((api.create(&params, &object).await?, true)),
        Step::Replace(object) => {
            let name = object.meta().name.clone().unwrap_or_default();
            Ok((api.replace(&name, &params, &object).await?, false))
        }
        Step::Keep(object) => Ok((object, false)),
    }
}

/// 删除由该 TServer 控制的旧对象
async fn delete_stale<K>(api: &Api<K>, ts: &TServer, name: &str) -> Result<()>
where
    K: Resource + Clone + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    if let Some(stale) = api.get_opt(name).await? {
        if controlled_by(stale.meta(), ts) {
            info!("删除类型不符的工作负载 {} {}", K::kind(&Default::default()), name);
            api.delete(name, &DeleteParams::background()).await?;
        }
    }
    Ok(())
}

async fn sync_tserver(ts: &TServer, ctx: &Context) -> Result<WorkloadState> {
    let name = ts.name_any();
    let namespace = ts.namespace().unwrap_or_default();
    let client = ctx.client.clone();
    let translator = &ctx.translator;

    let statefulsets: Api<StatefulSet> = Api::namespaced(client.clone(), &namespace);
    let daemonsets: Api<DaemonSet> = Api::namespaced(client.clone(), &namespace);

    let (status, created) = if ts.spec.k8s.daemon_set {
        delete_stale(&statefulsets, ts, &name).await?;
        let live = daemonsets.get_opt(&name).await?;
        if awaits_release(ts, live.is_some()) {
            debug!("TServer {}/{} 尚未发布", namespace, name);
            return Ok(WorkloadState::NoWorkload);
        }
        let step = plan(
            live,
            || translator.build_daemonset(ts),
            |live| translator.dry_run_sync_daemonset(ts, live),
        )?;
        let (ds, created) = apply(&daemonsets, step).await?;
        (status_from_daemonset(ts, &ds), created)
    } else {
        delete_stale(&daemonsets, ts, &name).await?;
        let live = statefulsets.get_opt(&name).await?;
        if awaits_release(ts, live.is_some()) {
            debug!("TServer {}/{} 尚未发布", namespace, name);
            return Ok(WorkloadState::NoWorkload);
        }
        let step = plan(
            live,
            || translator.build_statefulset(ts),
            |live| translator.dry_run_sync_statefulset(ts, live),
        )?;
        let (sts, created) = apply(&statefulsets, step).await?;
        (status_from_statefulset(ts, &sts), created)
    };

    let services: Api<Service> = Api::namespaced(client.clone(), &namespace);
    let step = plan(
        services.get_opt(&name).await?,
        || Ok(translator.build_service(ts)),
        |live| Ok(translator.dry_run_sync_service(ts, live)),
    )?;
    apply(&services, step).await?;

    let endpoints: Api<TEndpoint> = Api::namespaced(client.clone(), &namespace);
    let step = plan(
        endpoints.get_opt(&name).await?,
        || Ok(translator.build_tendpoint(ts)),
        |live| Ok(translator.dry_run_sync_tendpoint(ts, live)),
    )?;
    apply(&endpoints, step).await?;

    let records: Api<TExitedRecord> = Api::namespaced(client.clone(), &namespace);
    if records.get_opt(&name).await?.is_none() {
        records
            .create(&PostParams::default(), &translator.build_texited_record(ts))
            .await?;
    }

    if ts.status.as_ref() != Some(&status) {
        let tservers: Api<TServer> = Api::namespaced(client, &namespace);
        let patch = serde_json::json!({ "status": status });
        tservers
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        debug!("已更新 TServer {}/{} 状态", namespace, name);
    }

    Ok(workload_state(ts, &status, created))
}

async fn publish_warning(ts: &TServer, ctx: &Context, err: &Error) {
    let recorder = Recorder::new(ctx.client.clone(), ctx.reporter.clone(), ts.object_ref(&()));
    let event = Event {
        type_: EventType::Warning,
        reason: "SyncFailed".to_string(),
        note: Some(err.to_string()),
        action: "Reconcile".to_string(),
        secondary: None,
    };
    if let Err(e) = recorder.publish(event).await {
        warn!("上报 TServer {} 事件失败: {}", ts.name_any(), e);
    }
}

/// 协调 TServer 资源
pub async fn reconcile(ts: Arc<TServer>, ctx: Arc<Context>) -> Result<Action> {
    if ts.meta().deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }
    match sync_tserver(&ts, &ctx).await {
        Ok(state) => {
            debug!("TServer {} 处于 {:?}", ts.name_any(), state);
            Ok(state.requeue())
        }
        Err(e) => {
            publish_warning(&ts, &ctx, &e).await;
            Err(e)
        }
    }
}

/// 处理错误
pub fn error_policy(ts: Arc<TServer>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        "协调 TServer {}/{} 失败: {}",
        ts.namespace().unwrap_or_default(),
        ts.name_any(),
        error
    );
    Action::requeue(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DaemonSetStatus, StatefulSetStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use rstest::rstest;
    use serde_json::json;

    fn tserver(release: bool) -> TServer {
        let mut object = json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TServer",
            "metadata": {"name": "test-helloserver", "namespace": "tars", "uid": "uid-1"},
            "spec": {
                "app": "Test",
                "server": "HelloServer",
                "subType": "normal",
                "normal": {"ports": []},
                "k8s": {"replicas": 2},
                "release": {"id": "10001", "image": "test/helloserver:10001"}
            }
        });
        if !release {
            object["spec"]["release"] = serde_json::Value::Null;
        }
        serde_json::from_value(object).unwrap()
    }

    fn owned(uid: &str, controller: bool) -> ObjectMeta {
        ObjectMeta {
            owner_references: Some(vec![OwnerReference {
                api_version: "tars.io/v1beta3".to_string(),
                kind: "TServer".to_string(),
                name: "test-helloserver".to_string(),
                uid: uid.to_string(),
                controller: Some(controller),
                block_owner_deletion: Some(true),
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_creates_missing() {
        let step = plan(None, || Ok(3), |_: &i32| unreachable!()).unwrap();
        assert_eq!(step, Step::Create(3));
    }

    #[test]
    fn test_plan_replaces_on_change() {
        let step = plan(Some(1), || Ok(3), |_| Ok((true, Some(2)))).unwrap();
        assert_eq!(step, Step::Replace(2));

        let step = plan(Some(1), || Ok(3), |_| Ok((false, None))).unwrap();
        assert_eq!(step, Step::Keep(1));
    }

    #[test]
    fn test_plan_propagates_errors() {
        let step = plan(None::<i32>, || Err(Error::NodeImage("missing".to_string())), |_| {
            Ok((false, None))
        });
        assert!(matches!(step, Err(Error::NodeImage(_))));
    }

    #[rstest]
    #[case(owned("uid-1", true), true)]
    #[case(owned("uid-1", false), false)]
    #[case(owned("uid-2", true), false)]
    #[case(ObjectMeta::default(), false)]
    fn test_controlled_by(#[case] meta: ObjectMeta, #[case] expected: bool) {
        assert_eq!(controlled_by(&meta, &tserver(true)), expected);
    }

    #[test]
    fn test_status_from_statefulset() {
        let ts = tserver(true);
        let sts = StatefulSet {
            status: Some(StatefulSetStatus {
                replicas: 2,
                ready_replicas: Some(1),
                current_replicas: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let status = status_from_statefulset(&ts, &sts);
        assert_eq!(status.replicas, 2);
        assert_eq!(status.ready_replicas, 1);
        assert_eq!(status.current_replicas, 2);
        assert_eq!(status.selector, "tars.io/ServerApp=Test,tars.io/ServerName=HelloServer");
    }

    #[test]
    fn test_status_from_daemonset() {
        let ds = DaemonSet {
            status: Some(DaemonSetStatus {
                desired_number_scheduled: 3,
                number_ready: 3,
                current_number_scheduled: 3,
                ..Default::default()
            }),
            ..Default::default()
        };
        let status = status_from_daemonset(&tserver(true), &ds);
        assert_eq!((status.replicas, status.ready_replicas), (3, 3));
    }

    #[rstest]
    #[case(false, false, true)]
    #[case(false, true, false)]
    #[case(true, false, false)]
    #[case(true, true, false)]
    fn test_awaits_release(#[case] release: bool, #[case] has_workload: bool, #[case] expected: bool) {
        assert_eq!(awaits_release(&tserver(release), has_workload), expected);
    }

    #[rstest]
    #[case(false, 0, 0, false, WorkloadState::NoWorkload)]
    #[case(true, 2, 2, true, WorkloadState::Creating)]
    #[case(true, 2, 1, false, WorkloadState::Creating)]
    #[case(true, 2, 2, false, WorkloadState::Steady)]
    fn test_workload_state(
        #[case] release: bool,
        #[case] replicas: i32,
        #[case] ready: i32,
        #[case] created: bool,
        #[case] expected: WorkloadState,
    ) {
        let status = TServerStatus {
            replicas,
            ready_replicas: ready,
            ..Default::default()
        };
        assert_eq!(workload_state(&tserver(release), &status, created), expected);
    }

    #[test]
    fn test_requeue_interval() {
        assert_eq!(
            WorkloadState::Creating.requeue(),
            Action::requeue(Duration::from_secs(10))
        );
        assert_eq!(
            WorkloadState::Steady.requeue(),
            Action::requeue(Duration::from_secs(300))
        );
    }
}
