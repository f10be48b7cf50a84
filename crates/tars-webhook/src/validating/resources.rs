//! TAccount、TImage 与 TFrameworkConfig 的校验规则

use kube::core::admission::Operation;

use tars_common::crd::v1beta3::{TAccount, TFrameworkConfig, TImage};
use tars_common::{keys, Result};

use super::{first_duplicate, reject, Validator};
use crate::admission::AdmissionView;

const IMAGE_TYPES: [&str; 3] = ["base", "node", "server"];

/// 令牌只能由控制器写入；其他身份只能保持不变或清空
pub fn validate_taccount(validator: &Validator, view: &AdmissionView) -> Result<()> {
    if validator.is_controller(&view.username) {
        return Ok(());
    }

    let account: TAccount = validator.hub(view.object()?)?;
    let tokens = &account.spec.authentication.tokens;
    if tokens.is_empty() {
        return Ok(());
    }

    let unchanged = match (&view.operation, view.old_object.as_ref()) {
        (Operation::Update, Some(old)) => {
            let old: TAccount = validator.hub(old)?;
            old.spec.authentication.tokens == *tokens
        }
        _ => false,
    };
    if !unchanged {
        return reject("tokens of taccount can only be modified by tars controller");
    }
    Ok(())
}

pub fn validate_timage(validator: &Validator, view: &AdmissionView) -> Result<()> {
    let image: TImage = validator.hub(view.object()?)?;

    if matches!(view.operation, Operation::Update) {
        let old: TImage = validator.hub(view.old_object()?)?;
        if old.image_type != image.image_type {
            return reject("imageType is immutable");
        }
    } else if !IMAGE_TYPES.contains(&image.image_type.as_str()) {
        return reject(format!(
            "imageType should be one of {}, got {}",
            IMAGE_TYPES.join("/"),
            image.image_type
        ));
    }

    if let Some(id) = first_duplicate(image.releases.iter().map(|r| r.id.as_str())) {
        return reject(format!("duplicate release id {id}"));
    }
    Ok(())
}

pub fn validate_tframework(validator: &Validator, view: &AdmissionView) -> Result<()> {
    let config: TFrameworkConfig = validator.hub(view.object()?)?;

    let name = config.metadata.name.as_deref().unwrap_or(&view.name);
    if name != keys::FRAMEWORK_CONFIG_NAME {
        return reject(format!(
            "tframeworkconfig name should be {}",
            keys::FRAMEWORK_CONFIG_NAME
        ));
    }

    for (chain, items) in &config.up_chain {
        for item in items {
            if item.host.is_empty() {
                return reject(format!("upChain {chain} has empty host"));
            }
            if !(1..=65535).contains(&item.port) {
                return reject(format!("upChain {chain} port {} out of range", item.port));
            }
        }
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
    use rstest::rstest;
    use serde_json::{json, Value};

    const CONTROLLER: &str = "system:serviceaccount:tars-system:tars-controller";

    fn account(tokens: Value) -> Value {
        json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TAccount",
            "metadata": {"name": "admin", "namespace": "tars"},
            "spec": {
                "username": "admin",
                "authentication": {"bcryptPassword": "$2a$06$x", "tokens": tokens}
            }
        })
    }

    fn token(content: &str) -> Value {
        json!([{"name": "web", "content": content, "valid": true}])
    }

    #[rstest]
    #[case(token("a"), token("a"), true)]
    #[case(token("a"), json!([]), true)]
    #[case(token("a"), token("b"), false)]
    #[case(json!([]), token("b"), false)]
    fn test_account_tokens(#[case] old: Value, #[case] new: Value, #[case] allowed: bool) {
        let update = view(Operation::Update, ResourceKind::TAccount, Some(account(new)), Some(account(old)));
        let result = validator(FakeLister::default()).validate(&update);
        assert_eq!(result.is_ok(), allowed);
    }

    #[test]
    fn test_controller_may_write_tokens() {
        let mut create = view(Operation::Create, ResourceKind::TAccount, Some(account(token("a"))), None);
        assert!(validator(FakeLister::default()).validate(&create).is_err());

        create.username = CONTROLLER.to_string();
        validator(FakeLister::default()).validate(&create).unwrap();
    }

    fn image(image_type: &str, ids: &[&str]) -> Value {
        let releases: Vec<Value> = ids.iter().map(|id| json!({"id": id, "image": format!("hello:{id}")})).collect();
        json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TImage",
            "metadata": {"name": "test-hello", "namespace": "tars"},
            "imageType": image_type,
            "releases": releases
        })
    }

    #[test]
    fn test_timage_rules() {
        let lister = FakeLister::default;

        let ok = view(Operation::Create, ResourceKind::TImage, Some(image("server", &["1", "2"])), None);
        validator(lister()).validate(&ok).unwrap();

        let bad_type = view(Operation::Create, ResourceKind::TImage, Some(image("web", &[])), None);
        assert!(validator(lister()).validate(&bad_type).is_err());

        let dup = view(Operation::Create, ResourceKind::TImage, Some(image("server", &["1", "1"])), None);
        let err = validator(lister()).validate(&dup).unwrap_err();
        assert!(err.to_string().contains("duplicate release id 1"));

        let switched = view(
            Operation::Update,
            ResourceKind::TImage,
            Some(image("node", &["1"])),
            Some(image("server", &["1"])),
        );
        let err = validator(lister()).validate(&switched).unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }

    fn framework(name: &str, host: &str, port: i32) -> Value {
        json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TFrameworkConfig",
            "metadata": {"name": name, "namespace": "tars"},
            "upChain": {"default": [{"host": host, "port": port}]}
        })
    }

    #[rstest]
    #[case("tars-framework", "10.0.0.1", 17890, None)]
    #[case("framework", "10.0.0.1", 17890, Some("name should be tars-framework"))]
    #[case("tars-framework", "", 17890, Some("empty host"))]
    #[case("tars-framework", "10.0.0.1", 0, Some("out of range"))]
    fn test_tframework_rules(
        #[case] name: &str,
        #[case] host: &str,
        #[case] port: i32,
        #[case] message: Option<&str>,
    ) {
        let update = view(Operation::Update, ResourceKind::TFrameworkConfig, Some(framework(name, host, port)), None);
        let result = validator(FakeLister::default()).validate(&update);
        match message {
            None => result.unwrap(),
            Some(message) => assert!(result.unwrap_err().to_string().contains(message)),
        }
    }
}
