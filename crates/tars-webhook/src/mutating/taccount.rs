use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use sha1::{Digest, Sha1};

use tars_common::keys;
use tars_common::{Error, Result};

use super::patch::PatchBuilder;
use super::str_at;
use crate::admission::AdmissionView;

/// 可打印 ASCII，6 到 32 位
static PASSWORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\x21-\x7e]{6,32}$").expect("密码规则非法")
});

const BCRYPT_COST: u32 = 6;

/// 计算存储用的密码摘要：bcrypt(hex(sha1(明文)))
pub fn hash_password(password: &str) -> Result<String> {
    if !PASSWORD_PATTERN.is_match(password) {
        return Err(Error::Mutation(
            "password must be 6 to 32 printable ascii characters".to_string(),
        ));
    }
    let digest = format!("{:x}", Sha1::digest(password.as_bytes()));
    bcrypt::hash(digest, BCRYPT_COST).map_err(|e| Error::Mutation(format!("hash password: {e}")))
}

/// TAccount 创建与更新
pub fn mutate(view: &AdmissionView) -> Result<PatchBuilder> {
    let object = view.object()?;
    let mut builder = PatchBuilder::new();
    builder.remove_annotation(object, keys::LAST_APPLIED_CONFIG);

    let authentication = object.pointer("/spec/authentication").filter(|a| !a.is_null());
    let mut reset_tokens = false;

    if let Some(password) = str_at(object, "/spec/authentication/password") {
        let hashed = hash_password(password)?;
        builder.add("/spec/authentication/bcryptPassword", json!(hashed));
        builder.remove("/spec/authentication/password");
        reset_tokens = true;
    } else if let Some(old) = view.old_object.as_ref() {
        let new_hash = object.pointer("/spec/authentication/bcryptPassword");
        let old_hash = old.pointer("/spec/authentication/bcryptPassword");
        reset_tokens = new_hash != old_hash;
    }

    if reset_tokens && authentication.is_some() {
        builder.add("/spec/authentication/tokens", Value::Array(Vec::new()));
    }
    Ok(builder)
}
