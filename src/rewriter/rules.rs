//! 与歌曲无关的改写规则：版本更新、本地会员、音效与广告。

use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

const VIP_INFO_KEY: &str = "/api/music-vip-membership/client/vip/info";
const BANNER_KEY: &str = "/api/v2/banner/get";
const AD_KEY_MARKER: &str = "api/ad/";

/// 伪造的会员有效期长度（毫秒），约 100 年。
const VIP_EXTENSION_MS: i64 = 3_162_240_000_000;
const RED_VIP_LEVEL: i64 = 7;
const MUSIC_PACKAGE_VIP_CODE: i64 = 230;

/// 屏蔽版本更新。
///
/// 非空的 `updateFiles` 会被清空；没有 `updateFiles` 时把 `data.packageVO` 置空。
pub fn disable_update(tree: &mut Value) -> bool {
    if let Some(files) = tree.get_mut("updateFiles") {
        return match files {
            Value::Array(list) if !list.is_empty() => {
                list.clear();
                info!("已屏蔽版本更新");
                true
            }
            _ => false,
        };
    }
    match tree.get_mut("data").and_then(Value::as_object_mut) {
        Some(data) => {
            data.insert("packageVO".into(), Value::Null);
            info!("已屏蔽版本更新包");
            true
        }
        None => false,
    }
}

/// 在批量响应中伪造黑胶会员信息。
pub fn local_vip(tree: &mut Value) -> bool {
    let Some(data) = tree
        .get_mut(VIP_INFO_KEY)
        .and_then(|info| info.get_mut("data"))
        .and_then(Value::as_object_mut)
    else {
        return false;
    };

    let now = data
        .get("now")
        .and_then(Value::as_i64)
        .unwrap_or_else(|| Utc::now().timestamp_millis());
    let expire = now + VIP_EXTENSION_MS;

    data.insert("redVipLevel".into(), json!(RED_VIP_LEVEL));
    data.insert("redVipAnnualCount".into(), json!(1));
    for (key, extra) in [
        ("musicPackage", Some(("vipCode", MUSIC_PACKAGE_VIP_CODE))),
        ("associator", None),
    ] {
        let package = data.entry(key).or_insert_with(|| json!({}));
        if let Some(package) = package.as_object_mut() {
            package.insert("expireTime".into(), json!(expire));
            if let Some((field, value)) = extra {
                package.insert(field.into(), json!(value));
            }
        }
    }
    info!("已启用本地会员");
    true
}

/// 解锁音效：把 `data`（对象或对象数组）中的 `type` 改为 1。
pub fn unlock_sound_effect(node: &mut Value) -> bool {
    let modified = match node.get_mut("data") {
        Some(Value::Array(items)) if !items.is_empty() => {
            for item in items.iter_mut().filter_map(Value::as_object_mut) {
                item.insert("type".into(), json!(1));
            }
            true
        }
        Some(Value::Object(item)) if item.contains_key("type") => {
            item.insert("type".into(), json!(1));
            true
        }
        _ => false,
    };
    if modified {
        info!("已解锁音效");
    }
    modified
}

/// 处理批量响应中的一个子接口：广告接口置空，横幅只保留没有广告 ID 的条目。
pub fn strip_batch_entry(key: &str, entry: &mut Value) -> bool {
    if key.contains(AD_KEY_MARKER) {
        info!(key, "已屏蔽广告");
        *entry = json!({});
        return true;
    }
    if key.eq_ignore_ascii_case(BANNER_KEY)
        && let Some(Value::Array(banners)) = entry.get_mut("banners")
    {
        let before = banners.len();
        banners.retain(|banner| banner.get("adid").is_none_or(Value::is_null));
        if banners.len() != before {
            info!("已屏蔽 {} 个横幅广告", before - banners.len());
            return true;
        }
    }
    false
}
