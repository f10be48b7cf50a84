//! 准入请求的公共视图与 AdmissionReview 处理
//!
//! 修改与校验共用同一个分发形态：先把请求归一化为 `AdmissionView`，
//! 再按 (操作, 资源类型) 匹配到具体的处理函数。

use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

use tars_common::{Error, Result};

use crate::metrics;

/// 准入处理覆盖的资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    TServer,
    TConfig,
    TImage,
    TAccount,
    TTree,
    TTemplate,
    TFrameworkConfig,
    StatefulSet,
    DaemonSet,
    Service,
}

impl ResourceKind {
    pub fn parse(kind: &str) -> Option<Self> {
        let kind = match kind {
            "TServer" => ResourceKind::TServer,
            "TConfig" => ResourceKind::TConfig,
            "TImage" => ResourceKind::TImage,
            "TAccount" => ResourceKind::TAccount,
            "TTree" => ResourceKind::TTree,
            "TTemplate" => ResourceKind::TTemplate,
            "TFrameworkConfig" => ResourceKind::TFrameworkConfig,
            "StatefulSet" => ResourceKind::StatefulSet,
            "DaemonSet" => ResourceKind::DaemonSet,
            "Service" => ResourceKind::Service,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub fn operation_name(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

/// 准入请求中处理函数关心的部分
#[derive(Debug, Clone)]
pub struct AdmissionView {
    pub operation: Operation,
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: String,
    pub username: String,
    pub object: Option<Value>,
    pub old_object: Option<Value>,
}

impl AdmissionView {
    pub fn from_request(request: &AdmissionRequest<DynamicObject>) -> Result<Self> {
        let kind = ResourceKind::parse(&request.kind.kind)
            .ok_or_else(|| Error::UnsupportedAdmission(request.kind.kind.clone()))?;
        let object = request.object.as_ref().map(serde_json::to_value).transpose()?;
        let old_object = request.old_object.as_ref().map(serde_json::to_value).transpose()?;

        Ok(Self {
            operation: request.operation.clone(),
            kind,
            name: request.name.clone(),
            namespace: request.namespace.clone().unwrap_or_default(),
            username: request.user_info.username.clone().unwrap_or_default(),
            object,
            old_object,
        })
    }

    /// 新对象；缺失时视为非法请求
    pub fn object(&self) -> Result<&Value> {
        self.object
            .as_ref()
            .ok_or_else(|| Error::Mutation(format!("{} {} request has no object", self.kind, self.name)))
    }

    /// 旧对象；缺失时视为非法请求
    pub fn old_object(&self) -> Result<&Value> {
        self.old_object
            .as_ref()
            .ok_or_else(|| Error::Mutation(format!("{} {} request has no old object", self.kind, self.name)))
    }
}

/// 当前 (操作, 类型) 没有注册处理函数
pub fn unsupported(view: &AdmissionView) -> Error {
    Error::UnsupportedAdmission(format!("{} {}", operation_name(&view.operation), view.kind))
}

/// 把 AdmissionReview 解析为请求，失败时直接给出 invalid 响应
fn parse_review(
    review: AdmissionReview<DynamicObject>,
) -> std::result::Result<(AdmissionRequest<DynamicObject>, AdmissionView), AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!("无效的 AdmissionReview: {}", e);
            return Err(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    match AdmissionView::from_request(&request) {
        Ok(view) => Ok((request, view)),
        Err(e) => {
            warn!("无法处理的准入请求: {}", e);
            Err(AdmissionResponse::from(&request).deny(e.to_string()).into_review())
        }
    }
}

/// 处理修改请求
pub fn mutate_review(
    review: AdmissionReview<DynamicObject>,
    mutate: impl Fn(&AdmissionView) -> Result<Option<json_patch::Patch>>,
) -> AdmissionReview<DynamicObject> {
    let (request, view) = match parse_review(review) {
        Ok(parsed) => parsed,
        Err(review) => return review,
    };
    let response = AdmissionResponse::from(&request);
    let operation = operation_name(&view.operation);
    let kind = view.kind.to_string();

    let response = match mutate(&view) {
        Ok(Some(patch)) => match response.clone().with_patch(patch) {
            Ok(response) => response,
            Err(e) => response.deny(format!("serialize patch: {e}")),
        },
        Ok(None) => response,
        Err(e) => {
            warn!("拒绝修改 {} {}/{}: {}", kind, view.namespace, view.name, e);
            response.deny(e.to_string())
        }
    };

    debug!("修改 {} {} {}/{} allowed={}", operation, kind, view.namespace, view.name, response.allowed);
    metrics::record_request("mutating", &kind, operation, response.allowed);
    response.into_review()
}

/// 处理校验请求
pub fn validate_review(
    review: AdmissionReview<DynamicObject>,
    validate: impl Fn(&AdmissionView) -> Result<()>,
) -> AdmissionReview<DynamicObject> {
    let (request, view) = match parse_review(review) {
        Ok(parsed) => parsed,
        Err(review) => return review,
    };
    let response = AdmissionResponse::from(&request);
    let operation = operation_name(&view.operation);
    let kind = view.kind.to_string();

    let response = match validate(&view) {
        Ok(()) => response,
        Err(e) => {
            warn!("拒绝 {} {} {}/{}: {}", operation, kind, view.namespace, view.name, e);
            response.deny(e.to_string())
        }
    };

    metrics::record_request("validating", &kind, operation, response.allowed);
    response.into_review()
}
