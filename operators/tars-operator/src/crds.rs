//! CRD 清单
//!
//! 由 `CustomResource` 派生的资源生成 CRD；同一资源的多个版本合并为一个
//! CRD，存储版本为 v1beta3。

use anyhow::{Context, Result};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::crd::merge_crds;
use kube::CustomResourceExt;

use tars_common::crd::{v1beta1, v1beta2, v1beta3, ApiVersion};

/// 生成全部 CRD
pub fn crds() -> Result<Vec<CustomResourceDefinition>> {
    let stored = ApiVersion::HUB.version();
    let tserver = merge_crds(
        vec![
            v1beta1::TServer::crd(),
            v1beta2::TServer::crd(),
            v1beta3::TServer::crd(),
        ],
        stored,
    )
    .context("合并 TServer CRD 失败")?;
    let taccount = merge_crds(vec![v1beta2::TAccount::crd(), v1beta3::TAccount::crd()], stored)
        .context("合并 TAccount CRD 失败")?;
    let ttemplate = merge_crds(vec![v1beta2::TTemplate::crd(), v1beta3::TTemplate::crd()], stored)
        .context("合并 TTemplate CRD 失败")?;
    Ok(vec![tserver, v1beta3::TEndpoint::crd(), taccount, ttemplate])
}

/// 以多文档 YAML 输出
pub fn to_yaml(crds: &[CustomResourceDefinition]) -> Result<String> {
    let documents = crds
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()
        .context("序列化 CRD 失败")?;
    Ok(documents.join("---\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tserver_versions_are_merged() {
        let crds = crds().unwrap();
        let tserver = crds
            .iter()
            .find(|crd| crd.spec.names.kind == "TServer")
            .unwrap();
        let versions: Vec<_> = tserver.spec.versions.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(versions, vec!["v1beta1", "v1beta2", "v1beta3"]);
        let stored: Vec<_> = tserver
            .spec
            .versions
            .iter()
            .filter(|v| v.storage)
            .map(|v| v.name.as_str())
            .collect();
        assert_eq!(stored, vec!["v1beta3"]);
        assert_eq!(tserver.spec.group, "tars.io");
    }

    #[test]
    fn test_yaml_has_one_document_per_crd() {
        let crds = crds().unwrap();
        let yaml = to_yaml(&crds).unwrap();
        assert_eq!(yaml.matches("kind: CustomResourceDefinition").count(), crds.len());
        assert!(yaml.contains("name: tservers.tars.io"));
    }
}
