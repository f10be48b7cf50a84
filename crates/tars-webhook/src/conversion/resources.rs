//! 除 TServer 外各资源的 v1beta2 <-> v1beta3 转换
//!
//! 大多数资源两个版本结构一致，只需逐字段复制并改写 apiVersion。
//! TFrameworkConfig 的 nodeImage 只存在于 v1beta3，降级时存入差异注解。

use serde::{Deserialize, Serialize};

use tars_common::crd::{v1beta2, v1beta3};
use tars_common::{keys, Result};

use super::diff::{put_diff, take_diff, ConversionDiff};
use super::retag::{retag_struct, Retag};

retag_struct!(v1beta2::TConfig, v1beta3::TConfig {
    copy: [
        api_version,
        kind,
        metadata,
        app,
        server,
        pod_seq,
        config_name,
        config_content,
        version,
        update_time,
        update_person,
        update_reason,
        activated,
    ],
    retag: [],
});

retag_struct!(v1beta2::TImageRelease, v1beta3::TImageRelease {
    copy: [id, image, secret, create_person, create_time, mark],
    retag: [],
});
retag_struct!(v1beta2::TImage, v1beta3::TImage {
    copy: [api_version, kind, metadata, image_type, supported_type],
    retag: [releases],
});

retag_struct!(v1beta2::TAccountAuthenticationToken, v1beta3::TAccountAuthenticationToken {
    copy: [name, content, update_time, expiration_time, valid],
    retag: [],
});
retag_struct!(v1beta2::TAccountAuthentication, v1beta3::TAccountAuthentication {
    copy: [password, bcrypt_password],
    retag: [tokens],
});
retag_struct!(v1beta2::TAccountAuthorization, v1beta3::TAccountAuthorization {
    copy: [namespace, role],
    retag: [],
});
retag_struct!(v1beta2::TAccountSpec, v1beta3::TAccountSpec {
    copy: [username],
    retag: [authentication, authorization],
});
retag_struct!(v1beta2::TAccount, v1beta3::TAccount {
    copy: [metadata],
    retag: [spec],
});

retag_struct!(v1beta2::TTreeBusiness, v1beta3::TTreeBusiness {
    copy: [name, show, weight, mark],
    retag: [],
});
retag_struct!(v1beta2::TTreeApp, v1beta3::TTreeApp {
    copy: [name, business_ref, create_person, create_time, mark],
    retag: [],
});
retag_struct!(v1beta2::TTree, v1beta3::TTree {
    copy: [api_version, kind, metadata],
    retag: [businesses, apps],
});

retag_struct!(v1beta2::TTemplateSpec, v1beta3::TTemplateSpec {
    copy: [content, parent],
    retag: [],
});
retag_struct!(v1beta2::TTemplate, v1beta3::TTemplate {
    copy: [metadata],
    retag: [spec],
});

retag_struct!(v1beta2::FrameworkImageRegistry, v1beta3::FrameworkImageRegistry {
    copy: [registry, secret],
    retag: [],
});
retag_struct!(v1beta2::FrameworkRecordLimit, v1beta3::FrameworkRecordLimit {
    copy: [tconfig_history, timage_release, texited_pod],
    retag: [],
});
retag_struct!(v1beta2::UPChainItem, v1beta3::UPChainItem {
    copy: [host, port, timeout, is_tcp],
    retag: [],
});

/// 为顶层字段形态的资源生成升降级函数，并改写 apiVersion
macro_rules! plain_conversion {
    ($up:ident, $down:ident, $ty:ident) => {
        pub fn $up(src: v1beta2::$ty) -> Result<v1beta3::$ty> {
            let mut dst: v1beta3::$ty = src.retag();
            dst.api_version = v1beta3::$ty::API_VERSION.to_string();
            Ok(dst)
        }

        pub fn $down(src: v1beta3::$ty) -> Result<v1beta2::$ty> {
            let mut dst: v1beta2::$ty = src.retag();
            dst.api_version = v1beta2::$ty::API_VERSION.to_string();
            Ok(dst)
        }
    };
}

plain_conversion!(tconfig_up, tconfig_down, TConfig);
plain_conversion!(timage_up, timage_down, TImage);
plain_conversion!(ttree_up, ttree_down, TTree);

pub fn taccount_up(src: v1beta2::TAccount) -> Result<v1beta3::TAccount> {
    Ok(src.retag())
}

pub fn taccount_down(src: v1beta3::TAccount) -> Result<v1beta2::TAccount> {
    Ok(src.retag())
}

pub fn ttemplate_up(src: v1beta2::TTemplate) -> Result<v1beta3::TTemplate> {
    Ok(src.retag())
}

pub fn ttemplate_down(src: v1beta3::TTemplate) -> Result<v1beta2::TTemplate> {
    Ok(src.retag())
}

/// TFrameworkConfig 在 v1beta2 中放不下的字段
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkAppend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_image: Option<v1beta3::FrameworkNodeImage>,
}

pub fn tframework_up(src: v1beta2::TFrameworkConfig) -> Result<v1beta3::TFrameworkConfig> {
    let mut metadata = src.metadata;
    let diff: ConversionDiff<FrameworkAppend> = take_diff(&mut metadata, keys::V1B2_V1B3_DIFF);

    Ok(v1beta3::TFrameworkConfig {
        api_version: v1beta3::TFrameworkConfig::API_VERSION.to_string(),
        kind: src.kind,
        metadata,
        image_registry: src.image_registry.retag(),
        record_limit: src.record_limit.retag(),
        node_image: diff.append.and_then(|append| append.node_image),
        up_chain: src.up_chain.retag(),
    })
}

pub fn tframework_down(src: v1beta3::TFrameworkConfig) -> Result<v1beta2::TFrameworkConfig> {
    let mut metadata = src.metadata;
    let append = FrameworkAppend {
        node_image: src.node_image,
    };
    put_diff(&mut metadata, keys::V1B2_V1B3_DIFF, &ConversionDiff::new(append, Vec::new()))?;

    Ok(v1beta2::TFrameworkConfig {
        api_version: v1beta2::TFrameworkConfig::API_VERSION.to_string(),
        kind: src.kind,
        metadata,
        image_registry: src.image_registry.retag(),
        record_limit: src.record_limit.retag(),
        up_chain: src.up_chain.retag(),
    })
}
