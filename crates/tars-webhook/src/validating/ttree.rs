use kube::core::admission::Operation;
use std::collections::HashSet;

use tars_common::crd::v1beta3::TTree;
use tars_common::Result;

use super::{first_duplicate, reject, Validator};
use crate::admission::AdmissionView;

pub fn validate_upsert(validator: &Validator, view: &AdmissionView) -> Result<()> {
    let tree: TTree = validator.hub(view.object()?)?;

    if let Some(name) = first_duplicate(tree.businesses.iter().map(|b| b.name.as_str())) {
        return reject(format!("duplicate business {name}"));
    }
    if let Some(name) = first_duplicate(tree.apps.iter().map(|a| a.name.as_str())) {
        return reject(format!("duplicate app {name}"));
    }

    let businesses: HashSet<&str> = tree.businesses.iter().map(|b| b.name.as_str()).collect();
    for app in &tree.apps {
        if !app.business_ref.is_empty() && !businesses.contains(app.business_ref.as_str()) {
            return reject(format!(
                "business {} referenced by app {} not exist",
                app.business_ref, app.name
            ));
        }
    }

    if !matches!(view.operation, Operation::Update) {
        return Ok(());
    }

    let old: TTree = validator.hub(view.old_object()?)?;
    let apps: HashSet<&str> = tree.apps.iter().map(|a| a.name.as_str()).collect();
    let removed: Vec<&str> = old
        .apps
        .iter()
        .map(|a| a.name.as_str())
        .filter(|name| !apps.contains(name))
        .collect();
    if removed.is_empty() {
        return Ok(());
    }

    let lister = validator.lister()?;
    for server in lister.tservers(&view.namespace) {
        if removed.contains(&server.spec.app.as_str()) {
            return reject(format!(
                "app {} is used by tserver {}",
                server.spec.app,
                server.metadata.name.as_deref().unwrap_or_default()
            ));
        }
    }
    Ok(())
}

pub fn validate_delete(validator: &Validator, view: &AdmissionView) -> Result<()> {
    if !validator.lister()?.tservers(&view.namespace).is_empty() {
        return reject("cannot delete ttree while tserver exists");
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
    use serde_json::{json, Value};
    use tars_common::crd::v1beta3::TServer;

    fn tree(apps: Value) -> Value {
        json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TTree",
            "metadata": {"name": "tars-tree", "namespace": "tars"},
            "businesses": [{"name": "Base", "show": "基础服务"}],
            "apps": apps
        })
    }

    fn lister() -> FakeLister {
        let server: TServer = serde_json::from_value(json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TServer",
            "metadata": {"name": "test-hello", "namespace": "tars"},
            "spec": {"app": "Test", "server": "Hello", "subType": "normal", "normal": {}}
        }))
        .unwrap();
        FakeLister {
            tservers: vec![server],
            ..Default::default()
        }
    }

    #[test]
    fn test_business_ref_must_exist() {
        let ok = tree(json!([{"name": "Test", "businessRef": "Base"}, {"name": "Free"}]));
        let create = view(Operation::Create, ResourceKind::TTree, Some(ok), None);
        validator(lister()).validate(&create).unwrap();

        let bad = tree(json!([{"name": "Test", "businessRef": "Missing"}]));
        let create = view(Operation::Create, ResourceKind::TTree, Some(bad), None);
        let err = validator(lister()).validate(&create).unwrap_err();
        assert!(err.to_string().contains("business Missing"));
    }

    #[test]
    fn test_app_in_use_not_removable() {
        let old = tree(json!([{"name": "Test"}, {"name": "Idle"}]));

        let drop_idle = view(
            Operation::Update,
            ResourceKind::TTree,
            Some(tree(json!([{"name": "Test"}]))),
            Some(old.clone()),
        );
        validator(lister()).validate(&drop_idle).unwrap();

        let drop_test = view(
            Operation::Update,
            ResourceKind::TTree,
            Some(tree(json!([{"name": "Idle"}]))),
            Some(old),
        );
        let err = validator(lister()).validate(&drop_test).unwrap_err();
        assert!(err.to_string().contains("used by tserver test-hello"));
    }

    #[test]
    fn test_delete_blocked_by_tserver() {
        let delete = view(Operation::Delete, ResourceKind::TTree, None, Some(tree(json!([]))));
        assert!(validator(lister()).validate(&delete).is_err());
        validator(FakeLister::default()).validate(&delete).unwrap();
    }
}
