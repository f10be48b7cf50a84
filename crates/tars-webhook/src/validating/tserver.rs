//! TServer 校验规则

use std::collections::HashSet;

use tars_common::crd::v1beta3::{TServer, TServerSubType};
use tars_common::{keys, Result};

use super::{first_duplicate, reject, Validator};
use crate::admission::AdmissionView;

/// TServer 名称的最大长度，派生对象还要在其后追加后缀
pub const MAX_SERVER_NAME_LEN: usize = 52;

/// 卷名与派生工作负载冲突
const RESERVED_MOUNTS: [&str; 3] = [
    keys::TARSNODE_WORK_DIR_VOLUME,
    keys::HOST_LOG_DIR_VOLUME,
    keys::HOST_BIND_CLAIM,
];

/// 业务端口的 (名称, 端口)
fn ports(server: &TServer) -> Vec<(String, i32)> {
    let spec = &server.spec;
    let mut out = Vec::new();
    if let Some(tars) = &spec.tars {
        out.extend(tars.servants.iter().map(|s| (s.name.clone(), s.port)));
        out.extend(tars.ports.iter().map(|p| (p.name.clone(), p.port)));
    }
    if let Some(normal) = &spec.normal {
        out.extend(normal.ports.iter().map(|p| (p.name.clone(), p.port)));
    }
    out
}

fn check_name(view: &AdmissionView, server: &TServer) -> Result<()> {
    let spec = &server.spec;
    let expected = format!("{}-{}", spec.app.to_lowercase(), spec.server.to_lowercase());
    let name = server.metadata.name.as_deref().unwrap_or(&view.name);
    if name != expected {
        return reject(format!("tserver name should be {expected}"));
    }
    if name.len() > MAX_SERVER_NAME_LEN {
        return reject(format!(
            "tserver name should be no longer than {MAX_SERVER_NAME_LEN} characters"
        ));
    }
    Ok(())
}

fn check_sub_type(server: &TServer) -> Result<()> {
    let spec = &server.spec;
    match spec.sub_type {
        TServerSubType::Tars if spec.tars.is_none() || spec.normal.is_some() => {
            reject("subType tars requires .spec.tars and forbids .spec.normal")
        }
        TServerSubType::Normal if spec.normal.is_none() || spec.tars.is_some() => {
            reject("subType normal requires .spec.normal and forbids .spec.tars")
        }
        _ => Ok(()),
    }
}

fn check_ports(server: &TServer) -> Result<()> {
    let ports = ports(server);

    if let Some(name) = first_duplicate(ports.iter().map(|(name, _)| name.to_lowercase())) {
        return reject(format!("duplicate port name {name}"));
    }
    if let Some(port) = first_duplicate(ports.iter().map(|(_, port)| *port)) {
        return reject(format!("duplicate port value {port}"));
    }
    for (name, port) in &ports {
        if !(1..=65535).contains(port) {
            return reject(format!("port {name} value {port} out of range"));
        }
        if *port == keys::NODE_SERVANT_PORT {
            return reject(format!("port {port} is reserved for tarsnode"));
        }
    }

    let names: HashSet<String> = ports.iter().map(|(name, _)| name.to_lowercase()).collect();
    let host_ports = &server.spec.k8s.host_ports;
    for host_port in host_ports {
        if !names.contains(&host_port.name_ref.to_lowercase()) {
            return reject(format!("hostPort nameRef {} not found in ports", host_port.name_ref));
        }
        if !(1..=65535).contains(&host_port.port) {
            return reject(format!("hostPort {} out of range", host_port.port));
        }
    }
    if let Some(port) = first_duplicate(host_ports.iter().map(|h| h.port)) {
        return reject(format!("duplicate hostPort {port}"));
    }
    if let Some(name) = first_duplicate(host_ports.iter().map(|h| h.name_ref.to_lowercase())) {
        return reject(format!("duplicate hostPort nameRef {name}"));
    }
    Ok(())
}

fn check_k8s(server: &TServer) -> Result<()> {
    let k8s = &server.spec.k8s;

    if let Some(name) = first_duplicate(k8s.mounts.iter().map(|m| m.name.as_str())) {
        return reject(format!("duplicate mount name {name}"));
    }
    if let Some(mount) = k8s.mounts.iter().find(|m| RESERVED_MOUNTS.contains(&m.name.as_str())) {
        return reject(format!("mount name {} is reserved", mount.name));
    }

    if let Some(gate) = first_duplicate(k8s.readiness_gates.iter()) {
        return reject(format!("duplicate readiness gate {gate}"));
    }
    if k8s.readiness_gates.iter().any(|g| g == keys::ACTIVE_READINESS_GATE) {
        return reject(format!("readiness gate {} is reserved", keys::ACTIVE_READINESS_GATE));
    }

    if k8s.replicas < 0 {
        return reject("replicas should not be negative");
    }

    if let Some(release) = &server.spec.release {
        if release.id.is_empty() || release.image.is_empty() {
            return reject("release id and image should not be empty");
        }
    }
    Ok(())
}

fn check_template(validator: &Validator, view: &AdmissionView, server: &TServer) -> Result<()> {
    let Some(tars) = &server.spec.tars else {
        return Ok(());
    };
    let lister = validator.lister()?;
    if lister.ttemplate(&view.namespace, &tars.template).is_none() {
        return reject(format!("ttemplate {} not exist", tars.template));
    }
    Ok(())
}

fn check(validator: &Validator, view: &AdmissionView, server: &TServer) -> Result<()> {
    check_name(view, server)?;
    check_sub_type(server)?;
    check_ports(server)?;
    check_k8s(server)?;
    check_template(validator, view, server)
}

pub fn validate_create(validator: &Validator, view: &AdmissionView) -> Result<()> {
    let server: TServer = validator.hub(view.object()?)?;
    check(validator, view, &server)
}

pub fn validate_update(validator: &Validator, view: &AdmissionView) -> Result<()> {
    let server: TServer = validator.hub(view.object()?)?;
    let old: TServer = validator.hub(view.old_object()?)?;

    let (new_spec, old_spec) = (&server.spec, &old.spec);
    if new_spec.app != old_spec.app || new_spec.server != old_spec.server {
        return reject("app and server are immutable");
    }
    if new_spec.sub_type != old_spec.sub_type {
        return reject("subType is immutable");
    }
    if new_spec.tars.is_some() != old_spec.tars.is_some()
        || new_spec.normal.is_some() != old_spec.normal.is_some()
    {
        return reject("tars and normal sections cannot be switched");
    }
    check(validator, view, &server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::tests::view;
    use crate::admission::ResourceKind;
    use crate::listers::fake::FakeLister;
    use crate::validating::tests::validator;
    use kube::core::admission::Operation;
    use rstest::rstest;
    use serde_json::{json, Value};
    use tars_common::crd::v1beta3::{TTemplate, TTemplateSpec};

    fn lister() -> FakeLister {
        let mut template = TTemplate::new(
            "tars.cpp",
            TTemplateSpec {
                content: "<tars/>".to_string(),
                parent: "tars.cpp".to_string(),
            },
        );
        template.metadata.namespace = Some("tars".to_string());
        FakeLister {
            ttemplates: vec![template],
            ..Default::default()
        }
    }

    fn server() -> Value {
        json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TServer",
            "metadata": {"name": "test-helloserver", "namespace": "tars"},
            "spec": {
                "app": "Test",
                "server": "HelloServer",
                "subType": "tars",
                "tars": {
                    "template": "tars.cpp",
                    "servants": [{"name": "HelloObj", "port": 10000, "isTars": true, "isTcp": true}],
                    "ports": [{"name": "admin", "port": 10001, "isTcp": true}]
                },
                "k8s": {
                    "hostPorts": [{"nameRef": "HelloObj", "port": 20000}],
                    "mounts": [{"name": "data", "mountPath": "/data", "source": {"emptyDir": {}}}],
                    "readinessGates": ["custom-gate"]
                },
                "release": {"id": "10001", "image": "test:10001"}
            }
        })
    }

    fn validate(object: Value) -> Result<()> {
        let view = view(Operation::Create, ResourceKind::TServer, Some(object), None);
        validator(lister()).validate(&view)
    }

    #[test]
    fn test_valid_server_accepted() {
        validate(server()).unwrap();
    }

    #[rstest]
    #[case("/metadata/name", json!("wrong-name"), "name should be")]
    #[case("/spec/subType", json!("normal"), "subType normal")]
    #[case("/spec/tars/ports/0/name", json!("helloobj"), "duplicate port name")]
    #[case("/spec/tars/ports/0/port", json!(10000), "duplicate port value")]
    #[case("/spec/tars/ports/0/port", json!(19385), "reserved for tarsnode")]
    #[case("/spec/k8s/hostPorts/0/nameRef", json!("missing"), "not found in ports")]
    #[case("/spec/k8s/mounts/0/name", json!("host-log-dir"), "is reserved")]
    #[case("/spec/k8s/readinessGates", json!(["tars.io/active"]), "is reserved")]
    #[case("/spec/k8s/readinessGates", json!(["a", "a"]), "duplicate readiness gate")]
    #[case("/spec/release/image", json!(""), "should not be empty")]
    #[case("/spec/tars/template", json!("tars.java"), "not exist")]
    fn test_invalid_server_rejected(#[case] pointer: &str, #[case] value: Value, #[case] message: &str) {
        let mut object = server();
        *object.pointer_mut(pointer).unwrap() = value;
        let err = validate(object).unwrap_err();
        assert!(err.to_string().contains(message), "{err}");
    }

    #[test]
    fn test_long_name_rejected() {
        let mut object = server();
        let long = "x".repeat(50);
        object["spec"]["server"] = json!(long);
        object["metadata"]["name"] = json!(format!("test-{long}"));
        let err = validate(object).unwrap_err();
        assert!(err.to_string().contains("no longer than 52"));
    }

    #[test]
    fn test_unsynced_cache_rejects_create() {
        let view = view(Operation::Create, ResourceKind::TServer, Some(server()), None);
        let validator = validator(FakeLister {
            unsynced: true,
            ..lister()
        });
        assert!(validator.validate(&view).is_err());
    }

    #[test]
    fn test_update_keeps_identity() {
        let old = server();
        let mut new = server();
        new["spec"]["k8s"]["replicas"] = json!(3);
        let ok = view(Operation::Update, ResourceKind::TServer, Some(new.clone()), Some(old.clone()));
        validator(lister()).validate(&ok).unwrap();

        new["spec"]["app"] = json!("Other");
        let bad = view(Operation::Update, ResourceKind::TServer, Some(new), Some(old));
        let err = validator(lister()).validate(&bad).unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }

    #[test]
    fn test_v1beta1_object_is_validated_through_hub() {
        let mut object = server();
        object["apiVersion"] = json!("tars.io/v1beta1");
        object["spec"]["k8s"] = json!({"readinessGate": "tars.io/active"});
        let err = validate(object).unwrap_err();
        assert!(err.to_string().contains("is reserved"));
    }
}
