//! Tars Webhook - CRD 版本转换与准入控制
//!
//! 该模块实现 Tars 自定义资源的 Webhook 服务，包括：
//!
//! - 多版本 CRD 之间的无损转换（以 v1beta3 为中心版本）
//! - 准入修改：标签同步、副本数计算、时间戳与密码摘要
//! - 准入校验：字段规则与依赖只读缓存的跨资源约束

pub mod admission;
pub mod config;
pub mod conversion;
pub mod listers;
pub mod metrics;
pub mod mutating;
pub mod server;
pub mod validating;
