//! TConfig 校验规则
//!
//! 主配置的 podSeq 为 `m`，从配置（按 Pod 序号覆盖）的 podSeq 为数字，
//! 必须先有主配置才能创建从配置。

use tars_common::crd::v1beta3::TConfig;
use tars_common::Result;

use super::{reject, Validator};
use crate::admission::AdmissionView;
use crate::mutating::tconfig::MASTER_POD_SEQ;

fn pod_seq(config: &TConfig) -> &str {
    config.pod_seq.as_deref().unwrap_or(MASTER_POD_SEQ)
}

/// 同一 (app, server, configName) 下的配置
fn same_file(a: &TConfig, b: &TConfig) -> bool {
    a.app == b.app && a.server == b.server && a.config_name == b.config_name
}

pub fn validate_create(validator: &Validator, view: &AdmissionView) -> Result<()> {
    let config: TConfig = validator.hub(view.object()?)?;
    let lister = validator.lister()?;

    let tree = lister.ttree(&view.namespace);
    let app_exists = tree.map_or(false, |tree| tree.apps.iter().any(|app| app.name == config.app));
    if !app_exists {
        return reject(format!("app {} not exist in ttree", config.app));
    }

    let seq = pod_seq(&config);
    if seq == MASTER_POD_SEQ {
        return Ok(());
    }
    if seq.is_empty() || !seq.chars().all(|c| c.is_ascii_digit()) {
        return reject(format!("podSeq should be {MASTER_POD_SEQ} or digits, got {seq}"));
    }
    if config.server.is_empty() {
        return reject("app level config cannot have slave podSeq");
    }

    let master_exists = lister
        .tconfigs(&view.namespace)
        .iter()
        .any(|other| same_file(other, &config) && pod_seq(other) == MASTER_POD_SEQ);
    if !master_exists {
        return reject(format!("master config of {} not exist", config.config_name));
    }
    Ok(())
}

pub fn validate_update(validator: &Validator, view: &AdmissionView) -> Result<()> {
    let config: TConfig = validator.hub(view.object()?)?;
    let old: TConfig = validator.hub(view.old_object()?)?;

    let unchanged = same_file(&config, &old)
        && config.pod_seq == old.pod_seq
        && config.config_content == old.config_content
        && config.version == old.version;
    if !unchanged {
        return reject("only activated and update fields of tconfig can be modified");
    }
    Ok(())
}

pub fn validate_delete(validator: &Validator, view: &AdmissionView) -> Result<()> {
    let config: TConfig = validator.hub(view.old_object()?)?;
    if !config.activated || pod_seq(&config) != MASTER_POD_SEQ {
        return Ok(());
    }

    let lister = validator.lister()?;
    let has_slave = lister
        .tconfigs(&view.namespace)
        .iter()
        .any(|other| same_file(other, &config) && pod_seq(other) != MASTER_POD_SEQ);
    if has_slave {
        return reject("cannot delete activated master config while slave configs exist");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::tests::view;
    use crate::admission::ResourceKind;
    use crate::listers::fake::FakeLister;
    use crate::validating::tests::validator;
    use kube::core::admission::Operation;
    use serde_json::{json, Value};
    use tars_common::crd::v1beta3::{TTree, TTreeApp};

    fn config(pod_seq: &str, activated: bool) -> Value {
        json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TConfig",
            "metadata": {"name": format!("test-hello-conf-{pod_seq}"), "namespace": "tars"},
            "app": "Test",
            "server": "Hello",
            "podSeq": pod_seq,
            "configName": "hello.conf",
            "configContent": "<tars/>",
            "version": "20230601083005-0badf00d",
            "activated": activated
        })
    }

    fn lister(configs: Vec<Value>) -> FakeLister {
        let mut tree = TTree::named("tars-tree", "tars");
        tree.apps.push(TTreeApp {
            name: "Test".to_string(),
            ..Default::default()
        });
        FakeLister {
            ttree: Some(tree),
            tconfigs: configs
                .into_iter()
                .map(|c| serde_json::from_value(c).unwrap())
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_master_requires_app_in_tree() {
        let object = config("m", true);
        let create = view(Operation::Create, ResourceKind::TConfig, Some(object.clone()), None);
        validator(lister(vec![])).validate(&create).unwrap();

        let mut other = object;
        other["app"] = json!("Unknown");
        let create = view(Operation::Create, ResourceKind::TConfig, Some(other), None);
        let err = validator(lister(vec![])).validate(&create).unwrap_err();
        assert!(err.to_string().contains("not exist in ttree"));
    }

    #[test]
    fn test_slave_requires_master() {
        let slave = view(Operation::Create, ResourceKind::TConfig, Some(config("1", true)), None);
        assert!(validator(lister(vec![])).validate(&slave).is_err());
        validator(lister(vec![config("m", true)])).validate(&slave).unwrap();

        let bad_seq = view(Operation::Create, ResourceKind::TConfig, Some(config("x1", true)), None);
        assert!(validator(lister(vec![config("m", true)])).validate(&bad_seq).is_err());
    }

    #[test]
    fn test_content_is_immutable() {
        let old = config("m", false);
        let mut new = old.clone();
        new["activated"] = json!(true);
        let ok = view(Operation::Update, ResourceKind::TConfig, Some(new.clone()), Some(old.clone()));
        validator(lister(vec![])).validate(&ok).unwrap();

        new["configContent"] = json!("<changed/>");
        let bad = view(Operation::Update, ResourceKind::TConfig, Some(new), Some(old));
        assert!(validator(lister(vec![])).validate(&bad).is_err());
    }

    #[test]
    fn test_activated_master_with_slaves_not_deletable() {
        let master = config("m", true);
        let delete = view(Operation::Delete, ResourceKind::TConfig, None, Some(master.clone()));
        validator(lister(vec![master.clone()])).validate(&delete).unwrap();

        let err = validator(lister(vec![master, config("2", true)]))
            .validate(&delete)
            .unwrap_err();
        assert!(err.to_string().contains("slave"));
    }
}
