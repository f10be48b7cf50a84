//! 错误处理模块
//!
//! 该模块提供 Tars 各组件的统一错误类型。转换、准入修改、准入校验
//! 与工作负载翻译的错误各自对应一个变体，准入校验错误的消息会原样
//! 作为拒绝原因返回给 API Server。

use thiserror::Error;

/// Tars 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 对象版本转换错误
    #[error("转换错误: {0}")]
    Conversion(String),

    /// 未注册的 (kind, from, to) 转换
    #[error("unsupported conversion: {kind} {from} -> {to}")]
    UnsupportedConversion {
        /// 资源类型
        kind: String,
        /// 源版本
        from: String,
        /// 目标版本
        to: String,
    },

    /// 准入修改输入非法
    #[error("{0}")]
    Mutation(String),

    /// 准入校验失败
    #[error("{0}")]
    Validation(String),

    /// 未注册的准入请求
    #[error("unsupported admission request: {0}")]
    UnsupportedAdmission(String),

    /// 缺少节点镜像
    #[error("节点镜像错误: {0}")]
    NodeImage(String),

    /// Kubernetes API 错误
    #[error("Kubernetes 错误: {0}")]
    Kube(#[from] kube::Error),

    /// JSON 错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tars 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

/// 从字符串创建错误
pub trait IntoError<T> {
    /// 将当前类型转换为错误
    fn into_error(self, kind: fn(String) -> Error) -> Result<T>;
}

impl<T> IntoError<T> for String {
    fn into_error(self, kind: fn(String) -> Error) -> Result<T> {
        Err(kind(self))
    }
}

impl<T> IntoError<T> for &str {
    fn into_error(self, kind: fn(String) -> Error) -> Result<T> {
        Err(kind(self.to_string()))
    }
}
