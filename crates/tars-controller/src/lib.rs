//! Tars 控制平面
//!
//! 该模块实现由 TServer 派生 Kubernetes 工作负载的翻译器。翻译器是纯函数，
//! 不访问集群；调谐循环通过 `dry_run_sync_*` 判断是否需要更新线上对象。

pub mod translator;

pub use translator::{
    NodeImageProvider, StaticNodeImage, Translator, TranslatorConfig, NODE_IMAGE_PLACEHOLDER,
    SERVICE_IMAGE_PLACEHOLDER,
};
