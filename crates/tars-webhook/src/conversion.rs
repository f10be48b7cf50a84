//! CRD 版本转换模块
//!
//! 转换表以 (资源类型, 源版本, 目标版本) 为键，在启动时一次性构建。
//! 不相邻的版本对经由中心版本 v1beta3 组合完成。

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use kube::core::conversion::{ConversionRequest, ConversionResponse, ConversionReview};
use kube::core::Status;

use tars_common::{ApiVersion, Error, Result, TarsKind};

pub mod diff;
pub mod resources;
pub mod retag;
pub mod tserver;

/// 单个对象的转换函数
pub type ConvertFn = fn(Value) -> Result<Value>;

/// 反序列化为源版本类型，转换后再序列化
fn typed<S, D>(raw: Value, f: fn(S) -> Result<D>) -> Result<Value>
where
    S: DeserializeOwned,
    D: Serialize,
{
    let src: S = serde_json::from_value(raw)
        .map_err(|e| Error::Conversion(format!("malformed object: {e}")))?;
    Ok(serde_json::to_value(f(src)?)?)
}

macro_rules! register {
    ($table:ident, $kind:ident, $from:ident => $to:ident, $f:path) => {
        $table.insert(
            (TarsKind::$kind, ApiVersion::$from, ApiVersion::$to),
            |raw| typed(raw, $f),
        );
    };
}

/// 版本转换引擎
pub struct ConversionEngine {
    table: HashMap<(TarsKind, ApiVersion, ApiVersion), ConvertFn>,
}

impl Default for ConversionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionEngine {
    /// 构建完整的转换表
    pub fn new() -> Self {
        let mut table: HashMap<(TarsKind, ApiVersion, ApiVersion), ConvertFn> = HashMap::new();

        register!(table, TServer, V1beta1 => V1beta3, tserver::v1b1_to_v1b3);
        register!(table, TServer, V1beta3 => V1beta1, tserver::v1b3_to_v1b1);
        register!(table, TServer, V1beta2 => V1beta3, tserver::v1b2_to_v1b3);
        register!(table, TServer, V1beta3 => V1beta2, tserver::v1b3_to_v1b2);
        register!(table, TServer, V1beta1 => V1beta2, tserver::v1b1_to_v1b2);
        register!(table, TServer, V1beta2 => V1beta1, tserver::v1b2_to_v1b1);

        register!(table, TConfig, V1beta2 => V1beta3, resources::tconfig_up);
        register!(table, TConfig, V1beta3 => V1beta2, resources::tconfig_down);
        register!(table, TImage, V1beta2 => V1beta3, resources::timage_up);
        register!(table, TImage, V1beta3 => V1beta2, resources::timage_down);
        register!(table, TAccount, V1beta2 => V1beta3, resources::taccount_up);
        register!(table, TAccount, V1beta3 => V1beta2, resources::taccount_down);
        register!(table, TTree, V1beta2 => V1beta3, resources::ttree_up);
        register!(table, TTree, V1beta3 => V1beta2, resources::ttree_down);
        register!(table, TTemplate, V1beta2 => V1beta3, resources::ttemplate_up);
        register!(table, TTemplate, V1beta3 => V1beta2, resources::ttemplate_down);
        register!(table, TFrameworkConfig, V1beta2 => V1beta3, resources::tframework_up);
        register!(table, TFrameworkConfig, V1beta3 => V1beta2, resources::tframework_down);

        Self { table }
    }

    /// 已注册的转换数量
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// 把同一源版本的一组对象转换为目标版本
    ///
    /// 对象之间互不影响，任一对象失败则整体失败。
    pub fn convert(&self, kind: &str, from: &str, to: &str, objects: Vec<Value>) -> Result<Vec<Value>> {
        let unsupported = || Error::UnsupportedConversion {
            kind: kind.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        };
        let tars_kind: TarsKind = kind.parse().map_err(|_| unsupported())?;
        let from_version: ApiVersion = from.parse().map_err(|_| unsupported())?;
        let to_version: ApiVersion = to.parse().map_err(|_| unsupported())?;

        if from_version == to_version {
            return Ok(objects);
        }
        let convert = self
            .table
            .get(&(tars_kind, from_version, to_version))
            .ok_or_else(unsupported)?;

        objects.into_iter().map(convert).collect()
    }

    /// 转换单个对象，源版本取自对象自身的 apiVersion
    pub fn convert_object(&self, object: Value, desired: &str) -> Result<Value> {
        let kind = object
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Conversion("object has no kind".to_string()))?
            .to_string();
        let from = object
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Conversion("object has no apiVersion".to_string()))?
            .to_string();

        debug!("转换 {} {} -> {}", kind, from, desired);
        let mut converted = self.convert(&kind, &from, desired, vec![object])?;
        converted
            .pop()
            .ok_or_else(|| Error::Conversion("conversion produced no object".to_string()))
    }

    /// 把任意已服务版本的对象读取为中心版本类型
    pub fn to_hub<K: DeserializeOwned>(&self, object: Value) -> Result<K> {
        let hub = self.convert_object(object, &ApiVersion::HUB.to_string())?;
        serde_json::from_value(hub).map_err(|e| Error::Conversion(format!("malformed object: {e}")))
    }

    /// 处理 API Server 发来的 ConversionReview
    pub fn review(&self, review: ConversionReview) -> ConversionReview {
        let request = match ConversionRequest::from_review(review) {
            Ok(request) => request,
            Err(e) => {
                warn!("无效的 ConversionReview: {}", e);
                return ConversionResponse::invalid(Status::failure(&e.to_string(), "InvalidRequest"))
                    .into_review();
            }
        };

        let desired = request.desired_api_version.clone();
        let objects = request.objects.clone();
        let response = ConversionResponse::for_request(request);

        let converted: Result<Vec<Value>> = objects
            .into_iter()
            .map(|object| self.convert_object(object, &desired))
            .collect();

        match converted {
            Ok(objects) => {
                crate::metrics::record_conversion(&desired, objects.len(), true);
                response.success(objects).into_review()
            }
            Err(e) => {
                warn!("转换到 {} 失败: {}", desired, e);
                crate::metrics::record_conversion(&desired, 0, false);
                response
                    .failure(Status::failure(&e.to_string(), "ConversionFailed"))
                    .into_review()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use tars_common::crd::v1beta3;
    use tars_common::keys;

    fn v1b1_server() -> Value {
        json!({
            "apiVersion": "tars.io/v1beta1",
            "kind": "TServer",
            "metadata": {"name": "test-hello", "namespace": "tars"},
            "spec": {
                "app": "Test",
                "server": "Hello",
                "subType": "normal",
                "normal": {"ports": [{"name": "http", "port": 80, "isTcp": true}]},
                "k8s": {"readinessGate": "custom-gate", "replicas": 1}
            }
        })
    }

    #[test]
    fn test_table_covers_served_versions() {
        let engine = ConversionEngine::new();
        for kind in TarsKind::ALL {
            let versions = kind.served_versions();
            for from in versions {
                for to in versions {
                    if from != to {
                        assert!(
                            engine.table.contains_key(&(kind, *from, *to)),
                            "{kind} {from} -> {to}"
                        );
                    }
                }
            }
        }
        assert_eq!(engine.len(), 18);
    }

    #[rstest]
    #[case("TTree", "tars.io/v1beta1", "tars.io/v1beta3")]
    #[case("TEndpoint", "tars.io/v1beta2", "tars.io/v1beta3")]
    #[case("Deployment", "tars.io/v1beta2", "tars.io/v1beta3")]
    #[case("TServer", "tars.io/v1beta9", "tars.io/v1beta3")]
    fn test_unsupported_conversion(#[case] kind: &str, #[case] from: &str, #[case] to: &str) {
        let engine = ConversionEngine::new();
        let err = engine.convert(kind, from, to, vec![json!({})]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedConversion { .. }));
    }

    #[test]
    fn test_same_version_passes_through() {
        let engine = ConversionEngine::new();
        let object = v1b1_server();
        let out = engine
            .convert("TServer", "tars.io/v1beta1", "tars.io/v1beta1", vec![object.clone()])
            .unwrap();
        assert_eq!(out, vec![object]);
    }

    #[test]
    fn test_malformed_object_is_rejected() {
        let engine = ConversionEngine::new();
        let broken = json!({
            "apiVersion": "tars.io/v1beta2",
            "kind": "TServer",
            "metadata": {"name": "x"},
            "spec": {"app": 42}
        });
        let err = engine.convert_object(broken, "tars.io/v1beta3").unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }

    #[test]
    fn test_custom_gate_scenario() {
        let engine = ConversionEngine::new();
        let hub: v1beta3::TServer = engine.to_hub(v1b1_server()).unwrap();
        assert_eq!(hub.spec.k8s.readiness_gates, vec!["custom-gate".to_string()]);
        assert!(hub
            .metadata
            .annotations
            .as_ref()
            .map_or(true, |a| !a.contains_key(keys::V1B1_V1B3_DIFF)));

        let mut raw = serde_json::to_value(&hub).unwrap();
        raw["spec"]["k8s"]["readinessGates"] = json!(["custom-gate", "extra-gate"]);
        let low = engine.convert_object(raw, "tars.io/v1beta1").unwrap();
        assert_eq!(low["apiVersion"], json!("tars.io/v1beta1"));
        assert_eq!(low["spec"]["k8s"]["readinessGate"], json!("custom-gate"));
        let diff = low["metadata"]["annotations"][keys::V1B1_V1B3_DIFF].as_str().unwrap();
        assert!(diff.contains("extra-gate"));
    }

    #[test]
    fn test_review_uses_each_object_version() {
        let engine = ConversionEngine::new();
        let mut v2 = v1b1_server();
        v2["apiVersion"] = json!("tars.io/v1beta2");
        v2["spec"]["k8s"] = json!({"readinessGates": ["a", "b"]});
        let hub = json!({
            "apiVersion": "tars.io/v1beta3",
            "kind": "TServer",
            "metadata": {"name": "test-hub"},
            "spec": {"app": "Test", "server": "Hub", "subType": "normal", "k8s": {}}
        });

        let review: ConversionReview = serde_json::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "ConversionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "desiredAPIVersion": "tars.io/v1beta3",
                "objects": [v1b1_server(), v2, hub.clone()]
            }
        }))
        .unwrap();

        let out = serde_json::to_value(engine.review(review)).unwrap();
        let response = &out["response"];
        assert_eq!(response["uid"], json!("705ab4f5-6393-11e8-b7cc-42010a800002"));
        assert_eq!(response["result"]["status"], json!("Success"));
        let objects = response["convertedObjects"].as_array().unwrap();
        assert_eq!(objects.len(), 3);
        assert!(objects.iter().all(|o| o["apiVersion"] == json!("tars.io/v1beta3")));
        assert_eq!(objects[1]["spec"]["k8s"]["readinessGates"], json!(["a", "b"]));
        assert_eq!(objects[2], hub);
    }

    #[test]
    fn test_review_reports_failure() {
        let engine = ConversionEngine::new();
        let review: ConversionReview = serde_json::from_value(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "ConversionReview",
            "request": {
                "uid": "1",
                "desiredAPIVersion": "tars.io/v1beta1",
                "objects": [{
                    "apiVersion": "tars.io/v1beta2",
                    "kind": "TTree",
                    "metadata": {"name": "tars-tree"}
                }]
            }
        }))
        .unwrap();

        let out = serde_json::to_value(engine.review(review)).unwrap();
        assert_eq!(out["response"]["result"]["status"], json!("Failure"));
        let message = out["response"]["result"]["message"].as_str().unwrap();
        assert!(message.starts_with("unsupported conversion"));
    }
}
