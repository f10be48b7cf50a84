use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use tars_common::crd::v1beta3::{
    TEndpoint, TEndpointSpec, TExitedRecord, TServer, TServerSubType,
};
use tars_common::Result;

use super::pod::{business_ports, protocol};
use super::{dry_run, merge_labels, owned_labels, owned_meta, selector_labels, Translator};

fn service_ports(ts: &TServer) -> Vec<ServicePort> {
    business_ports(ts)
        .into_iter()
        .map(|(name, port, is_tcp)| ServicePort {
            name: Some(name),
            port,
            protocol: Some(protocol(is_tcp)),
            target_port: Some(IntOrString::Int(port)),
            ..Default::default()
        })
        .collect()
}

fn endpoint_spec(ts: &TServer) -> TEndpointSpec {
    let spec = &ts.spec;
    TEndpointSpec {
        app: spec.app.clone(),
        server: spec.server.clone(),
        sub_type: spec.sub_type,
        tars: spec.tars.clone(),
        normal: spec.normal.clone(),
        host_ports: spec.k8s.host_ports.clone(),
        release: spec.release.clone(),
    }
}

impl Translator {
    /// tars 服务使用 headless Service，normal 服务使用 ClusterIP
    pub fn build_service(&self, ts: &TServer) -> Service {
        let headless = ts.spec.sub_type == TServerSubType::Tars;
        Service {
            metadata: owned_meta(ts),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                cluster_ip: headless.then(|| "None".to_string()),
                selector: Some(selector_labels(ts)),
                ports: Some(service_ports(ts)),
                ..Default::default()
            }),
            status: None,
        }
    }

    /// clusterIP 与 type 不可变，只同步选择器与端口
    pub fn sync_service(&self, ts: &TServer, live: &mut Service) {
        let desired = self.build_service(ts).spec.unwrap_or_default();
        merge_labels(&mut live.metadata.labels, owned_labels(ts));
        let spec = live.spec.get_or_insert_with(ServiceSpec::default);
        spec.selector = desired.selector;
        spec.ports = desired.ports;
    }

    pub fn equal_tserver_and_service(&self, ts: &TServer, live: &Service) -> bool {
        !self.dry_run_sync_service(ts, live).0
    }

    pub fn dry_run_sync_service(&self, ts: &TServer, live: &Service) -> (bool, Option<Service>) {
        let synced = dry_run(live, |copy| {
            self.sync_service(ts, copy);
            Ok(())
        });
        synced.unwrap_or((false, None))
    }

    pub fn build_tendpoint(&self, ts: &TServer) -> TEndpoint {
        TEndpoint {
            metadata: owned_meta(ts),
            spec: endpoint_spec(ts),
            status: None,
        }
    }

    /// 状态由 agent 维护，只同步规格
    pub fn sync_tendpoint(&self, ts: &TServer, live: &mut TEndpoint) {
        merge_labels(&mut live.metadata.labels, owned_labels(ts));
        live.spec = endpoint_spec(ts);
    }

    pub fn equal_tserver_and_tendpoint(&self, ts: &TServer, live: &TEndpoint) -> bool {
        !self.dry_run_sync_tendpoint(ts, live).0
    }

    pub fn dry_run_sync_tendpoint(&self, ts: &TServer, live: &TEndpoint) -> (bool, Option<TEndpoint>) {
        let synced = dry_run(live, |copy| {
            self.sync_tendpoint(ts, copy);
            Ok(())
        });
        synced.unwrap_or((false, None))
    }

    /// 新建的退出记录不含任何 Pod
    pub fn build_texited_record(&self, ts: &TServer) -> TExitedRecord {
        TExitedRecord {
            api_version: TExitedRecord::API_VERSION.to_string(),
            kind: TExitedRecord::KIND.to_string(),
            metadata: owned_meta(ts),
            app: ts.spec.app.clone(),
            server: ts.spec.server.clone(),
            pods: Vec::new(),
        }
    }
}
