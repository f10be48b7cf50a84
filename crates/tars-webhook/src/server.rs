//! Webhook HTTP 服务
//!
//! API Server 以 POST 方式投递 ConversionReview 与 AdmissionReview，
//! 另外提供 `/metrics` 与 `/healthz`。TLS 由前置代理或 Service 网格终结。

use anyhow::Result;
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response, Server, StatusCode,
};
use kube::core::admission::AdmissionReview;
use kube::core::conversion::ConversionReview;
use kube::core::DynamicObject;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::admission::{mutate_review, validate_review};
use crate::conversion::ConversionEngine;
use crate::metrics;
use crate::mutating;
use crate::validating::Validator;

/// 请求处理共享的状态
pub struct WebhookState {
    pub engine: Arc<ConversionEngine>,
    pub validator: Arc<Validator>,
}

fn respond(status: StatusCode, content_type: &str, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response.headers_mut().insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

fn text(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    respond(status, "text/plain", body.into())
}

fn json<T: Serialize>(value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(StatusCode::OK, "application/json", body),
        Err(e) => {
            error!("序列化响应失败: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// 读取并解析请求体
async fn read_review<T: DeserializeOwned>(req: Request<Body>) -> std::result::Result<T, Response<Body>> {
    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| text(StatusCode::BAD_REQUEST, format!("read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        warn!("无法解析请求体: {}", e);
        text(StatusCode::BAD_REQUEST, format!("decode review: {e}"))
    })
}

/// 按方法与路径分发请求
pub async fn handle(state: Arc<WebhookState>, req: Request<Body>) -> Response<Body> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/conversion") => match read_review::<ConversionReview>(req).await {
            Ok(review) => json(&state.engine.review(review)),
            Err(response) => response,
        },
        (&Method::POST, "/mutating") => match read_review::<AdmissionReview<DynamicObject>>(req).await {
            Ok(review) => json(&mutate_review(review, mutating::mutate)),
            Err(response) => response,
        },
        (&Method::POST, "/validating") => match read_review::<AdmissionReview<DynamicObject>>(req).await {
            Ok(review) => json(&validate_review(review, |view| state.validator.validate(view))),
            Err(response) => response,
        },
        (&Method::GET, "/metrics") => match metrics::gather() {
            Ok((content_type, body)) => respond(StatusCode::OK, &content_type, body),
            Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        (&Method::GET, "/healthz") => text(StatusCode::OK, "ok"),
        _ => text(StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// 启动 HTTP 服务，直到监听失败才返回
pub async fn serve(addr: SocketAddr, state: Arc<WebhookState>) -> Result<()> {
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle(state, req).await) }
            }))
        }
    });

    info!("Webhook 服务器启动在 {}", addr);
    Server::bind(&addr).serve(make_svc).await?;
    Ok(())
}
