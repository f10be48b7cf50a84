//! Tars Common - 跨模块共享工具与数据结构
//!
//! 该模块提供 Tars 各组件共享的 CRD 版本化定义（v1beta1 ~ v1beta3）、
//! 标签与注解键常量，以及统一的错误处理机制。

pub mod crd;
pub mod error;
pub mod keys;

/// 重新导出常用类型，方便使用
pub use crd::{ApiVersion, TarsKind};
pub use error::Error;
pub use error::IntoError;
pub use error::Result;
