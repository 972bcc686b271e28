//! 响应改写
//!
//! [`ResponseRewriter`] 根据接口路径与响应结构对解码后的 JSON 应用一组固定规则，
//! 并报告 JSON 是否被修改。只有被修改过的响应才需要重新编码。

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    checksum::ChecksumQueue,
    config::UnblockConfig,
    endpoint::EndpointBuilder,
    model::exchange::ProxiedExchange,
    search::SongResolver,
};

pub mod augment;
pub mod grey;
pub mod rules;
pub mod session;

use session::NeteaseSession;

const UPDATE_PATHS: [&str; 2] = ["/api/osx/version", "/api/pc/upgrade/get"];

/// 完整会话重放时视为鉴权失败的状态码。
const AUTH_FAILURE_CODES: [&str; 2] = ["401", "512"];

/// 响应改写器。
pub struct ResponseRewriter {
    config: Arc<UnblockConfig>,
    resolver: Arc<SongResolver>,
    checksums: Arc<ChecksumQueue>,
    endpoint: EndpointBuilder,
    session: Arc<dyn NeteaseSession>,
}

impl ResponseRewriter {
    pub fn new(
        config: Arc<UnblockConfig>,
        resolver: Arc<SongResolver>,
        checksums: Arc<ChecksumQueue>,
        session: Arc<dyn NeteaseSession>,
    ) -> Self {
        let endpoint = EndpointBuilder::new(config.endpoint);
        Self {
            config,
            resolver,
            checksums,
            endpoint,
            session,
        }
    }

    /// 改写交换中已解码的响应。
    ///
    /// # 返回
    /// JSON 是否被修改。交换中没有解码结果时返回 `false`。
    #[instrument(skip(self, exchange), fields(path = %exchange.path))]
    pub async fn rewrite(&self, exchange: &mut ProxiedExchange) -> bool {
        let Some(mut tree) = exchange.decoded_body.take() else {
            return false;
        };

        let mut modified = self.apply_rules(exchange, &mut tree).await;
        modified |= normalize_quality_flags(&mut tree);

        if modified {
            debug!("响应已被改写");
        }
        exchange.decoded_body = Some(tree);
        modified
    }

    async fn apply_rules(&self, exchange: &mut ProxiedExchange, tree: &mut Value) -> bool {
        let path = exchange.path.clone();
        let code = response_code(tree);
        let auth_failed = !exchange.is_web() && AUTH_FAILURE_CODES.contains(&code.as_str());

        if UPDATE_PATHS.iter().any(|p| path.eq_ignore_ascii_case(p)) {
            self.config.block_update && rules::disable_update(tree)
        } else if path.contains("/usertool/sound/") {
            self.config.unlock_sound_effect && rules::unlock_sound_effect(tree)
        } else if path.contains("/batch") {
            let mut modified = self.apply_batch_rules(tree);
            modified |= self.try_augment(exchange, tree).await;
            modified
        } else if auth_failed && path.contains("manipulate") {
            self.try_collect(exchange, tree).await
        } else if auth_failed && path.eq_ignore_ascii_case("/api/song/like") {
            self.try_like(exchange, tree).await
        } else if path.contains("url") {
            self.try_match(exchange, tree).await
        } else {
            self.try_augment(exchange, tree).await
        }
    }

    /// 批量接口：会员信息、音效、广告与横幅。
    fn apply_batch_rules(&self, tree: &mut Value) -> bool {
        let mut modified = false;
        if self.config.enable_local_vip {
            modified |= rules::local_vip(tree);
        }
        let Some(entries) = tree.as_object_mut() else {
            return modified;
        };
        for (key, entry) in entries.iter_mut() {
            if key.contains("/usertool/sound/") {
                if self.config.unlock_sound_effect {
                    modified |= rules::unlock_sound_effect(entry);
                }
            } else if self.config.block_ads {
                modified |= rules::strip_batch_entry(key, entry);
            }
        }
        modified
    }
}

/// 响应顶层的 `code`，缺失时视为 `"200"`。
pub(crate) fn response_code(tree: &Value) -> String {
    match tree.get("code") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => "200".to_string(),
    }
}

fn number_equals(value: &Value, expected: i64) -> bool {
    match value {
        Value::Number(n) => n.as_i64() == Some(expected) || n.as_f64() == Some(expected as f64),
        Value::String(s) => s.parse::<i64>().ok() == Some(expected),
        _ => false,
    }
}

/// 递归地把所有同时带有 `st`、`subp`、`pl`、`dl` 的对象改为可播放状态。
///
/// * `st` 不为 0 时改为 0
/// * `subp` 不为 1 时改为 1
/// * `pl`、`dl` 为 0 时改为 320000
pub fn normalize_quality_flags(value: &mut Value) -> bool {
    match value {
        Value::Object(map) => {
            let mut modified = false;
            if ["st", "subp", "pl", "dl"].iter().all(|k| map.contains_key(*k)) {
                let rules: [(&str, fn(&Value) -> bool, i64); 4] = [
                    ("st", |v| !number_equals(v, 0), 0),
                    ("subp", |v| !number_equals(v, 1), 1),
                    ("pl", |v| number_equals(v, 0), 320_000),
                    ("dl", |v| number_equals(v, 0), 320_000),
                ];
                for (key, needs_fix, fixed) in rules {
                    if let Some(field) = map.get_mut(key)
                        && needs_fix(field)
                    {
                        *field = Value::from(fixed);
                        modified = true;
                    }
                }
            }
            for child in map.values_mut() {
                modified |= normalize_quality_flags(child);
            }
            modified
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |modified, item| normalize_quality_flags(item) || modified),
        _ => false,
    }
}
