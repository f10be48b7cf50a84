use serde_json::Value;

use tars_common::keys;
use tars_common::Result;

use super::patch::PatchBuilder;
use super::{is_unset, now, str_at};
use crate::admission::AdmissionView;

/// 为数组中缺少时间字段的元素补上当前时间
fn stamp_missing(builder: &mut PatchBuilder, object: &Value, list: &str, field: &str) {
    let Some(items) = object.get(list).and_then(Value::as_array) else {
        return;
    };
    let stamp = now();
    for (index, item) in items.iter().enumerate() {
        if is_unset(item.get(field)) {
            builder.add(format!("/{list}/{index}/{field}"), stamp.clone());
        }
    }
}

/// TImage：新发布记录补 createTime
pub fn mutate_timage(view: &AdmissionView) -> Result<PatchBuilder> {
    let mut builder = PatchBuilder::new();
    stamp_missing(&mut builder, view.object()?, "releases", "createTime");
    Ok(builder)
}

/// TTree：新应用补 createTime
pub fn mutate_ttree(view: &AdmissionView) -> Result<PatchBuilder> {
    let mut builder = PatchBuilder::new();
    stamp_missing(&mut builder, view.object()?, "apps", "createTime");
    Ok(builder)
}

/// TTemplate：Parent 标签与 spec.parent 一致
pub fn mutate_ttemplate(view: &AdmissionView) -> Result<PatchBuilder> {
    let object = view.object()?;
    let mut builder = PatchBuilder::new();
    builder.sync_labels(
        object,
        &[(keys::PARENT_LABEL, str_at(object, "/spec/parent").map(str::to_string))],
    );
    Ok(builder)
}
