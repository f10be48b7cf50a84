//! 指标收集与导出模块
//!
//! 记录准入与转换请求的处理结果，并以 Prometheus 文本格式导出。

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

/// Prometheus 注册表
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// 准入请求计数器
static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register(IntCounterVec::new(
        Opts::new("tars_webhook_requests_total", "Total number of admission requests handled"),
        &["handler", "kind", "operation", "result"],
    ))
});

/// 转换对象计数器
static CONVERTED_OBJECTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register(IntCounterVec::new(
        Opts::new(
            "tars_webhook_converted_objects_total",
            "Total number of objects passed through the conversion webhook",
        ),
        &["desired", "result"],
    ))
});

fn register(counter: prometheus::Result<IntCounterVec>) -> IntCounterVec {
    let counter = counter.expect("指标定义非法");
    if let Err(e) = REGISTRY.register(Box::new(counter.clone())) {
        error!("注册指标失败: {}", e);
    }
    counter
}

fn result_label(ok: bool) -> &'static str {
    if ok {
        "allowed"
    } else {
        "denied"
    }
}

/// 记录一次准入请求
pub fn record_request(handler: &str, kind: &str, operation: &str, ok: bool) {
    REQUESTS_TOTAL
        .with_label_values(&[handler, kind, operation, result_label(ok)])
        .inc();
}

/// 记录一次转换请求
pub fn record_conversion(desired: &str, objects: usize, ok: bool) {
    let result = if ok { "success" } else { "failure" };
    CONVERTED_OBJECTS_TOTAL
        .with_label_values(&[desired, result])
        .inc_by(objects.max(1) as u64);
}

/// 以文本格式导出全部指标
pub fn gather() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
