use tars_common::crd::v1beta3::TTemplate;
use tars_common::Result;

use super::{reject, Validator};
use crate::admission::AdmissionView;

pub fn validate_upsert(validator: &Validator, view: &AdmissionView) -> Result<()> {
    let template: TTemplate = validator.hub(view.object()?)?;
    let parent = &template.spec.parent;
    if parent.is_empty() {
        return reject("parent of ttemplate should not be empty");
    }

    let name = template.metadata.name.as_deref().unwrap_or(&view.name);
    if parent == name {
        return Ok(());
    }
    if validator.lister()?.ttemplate(&view.namespace, parent).is_none() {
        return reject(format!("parent ttemplate {parent} not exist"));
    }
    Ok(())
}

pub fn validate_delete(validator: &Validator, view: &AdmissionView) -> Result<()> {
    let lister = validator.lister()?;
    let name = view.name.as_str();

    let used_by_server = lister.tservers(&view.namespace).into_iter().find(|server| {
        server.spec.tars.as_ref().map_or(false, |tars| tars.template == name)
    });
    if let Some(server) = used_by_server {
        return reject(format!(
            "ttemplate {name} is used by tserver {}",
            server.metadata.name.as_deref().unwrap_or_default()
        ));
    }

    let child = lister.ttemplates(&view.namespace).into_iter().find(|t| {
        t.spec.parent == name && t.metadata.name.as_deref() != Some(name)
    });
    if let Some(child) = child {
        return reject(format!(
            "ttemplate {name} is parent of ttemplate {}",
            child.metadata.name.as_deref().unwrap_or_default()
        ));
    }
    Ok(())
}
