//! 灰色歌曲替换
//!
//! 播放/下载链接接口返回的歌曲描述中，`url` 为空或带有试听信息 (`freeTrialInfo`) 的条目
//! 会交给 [`SongResolver`](crate::search::SongResolver) 在备用音源中寻找替代。

use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::ResponseRewriter;
use crate::{
    cache::CacheKey,
    checksum::placeholder_md5,
    model::{exchange::ProxiedExchange, song::Song},
    providers::id_string,
};

const KNOWN_TYPES: [&str; 6] = ["mp3", "flac", "ape", "wav", "aac", "mp4"];
const LOSSLESS_TYPES: [&str; 3] = ["flac", "ape", "wav"];

/// 客户端认可的付费标记。
const UNLOCKED_FEE: i64 = 8;

/// 判断歌曲描述是否为灰色歌曲。
pub fn is_grey(node: &Map<String, Value>) -> bool {
    node.get("url").is_none_or(Value::is_null)
        || node.get("freeTrialInfo").is_some_and(|v| !v.is_null())
}

/// 根据链接的扩展名推断文件类型，无法识别时按码率推断。
pub fn stream_type(url: &str, bitrate: u64) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let file_name = path.rsplit('/').next().unwrap_or_default();
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    if KNOWN_TYPES.contains(&ext.as_str()) {
        return ext;
    }
    if !ext.is_empty() {
        debug!(ext, "无法识别的文件格式");
    }
    if bitrate > 320_000 { "flac" } else { "mp3" }.to_string()
}

/// 文件类型对应的默认码率。
fn default_bitrate(stream_type: &str) -> u64 {
    if LOSSLESS_TYPES.contains(&stream_type) {
        999_000
    } else {
        128_000
    }
}

impl ResponseRewriter {
    /// 在 `data`（单个描述或描述数组）中寻找并替换灰色歌曲。
    ///
    /// 下载接口只处理第一个描述。
    pub(super) async fn try_match(&self, exchange: &ProxiedExchange, tree: &mut Value) -> bool {
        let download = exchange.is_download();
        match tree.get_mut("data") {
            Some(Value::Array(items)) => {
                let take = if download { 1 } else { items.len() };
                let mut modified = false;
                for node in items.iter_mut().take(take).filter_map(Value::as_object_mut) {
                    modified |= self.substitute_grey_song(exchange, node).await;
                }
                modified
            }
            Some(Value::Object(node)) => self.substitute_grey_song(exchange, node).await,
            _ => false,
        }
    }

    /// 替换一个灰色歌曲描述，找不到替代时保持原样。
    async fn substitute_grey_song(
        &self,
        exchange: &ProxiedExchange,
        node: &mut Map<String, Value>,
    ) -> bool {
        if !is_grey(node) {
            return false;
        }
        let Some(track_id) = node.get("id").and_then(id_string) else {
            return false;
        };
        let quality = exchange.quality;
        let Some(song) = self.resolver.find(&track_id, quality).await else {
            return false;
        };
        if song.url.is_empty() {
            return false;
        }

        let stream_type = stream_type(&song.url, song.bitrate);
        let bitrate = if song.bitrate > 0 {
            song.bitrate
        } else {
            default_bitrate(&stream_type)
        };
        let md5 = self.checksum_for(exchange, &track_id, &song).await;

        node.insert("flag".into(), json!(0));
        node.insert("type".into(), json!(stream_type));
        node.insert("encodeType".into(), json!(stream_type));
        node.insert("level".into(), json!("standard"));
        node.insert("fee".into(), json!(UNLOCKED_FEE));
        node.insert(
            "url".into(),
            json!(self.endpoint.finalize(&song.url, &exchange.raw_params)),
        );
        node.insert("md5".into(), json!(md5));
        node.insert("br".into(), json!(bitrate));
        node.insert("size".into(), json!(song.size));
        node.insert("freeTrialInfo".into(), Value::Null);
        node.insert("code".into(), json!(200));

        info!(track_id, source = ?song.source, "已替换灰色歌曲");
        true
    }

    /// 取得替换歌曲的 MD5。
    ///
    /// 已知时直接使用；下载请求同步计算；其他请求先用占位值，真实值交给后台队列。
    async fn checksum_for(&self, exchange: &ProxiedExchange, track_id: &str, song: &Song) -> String {
        if !song.md5.is_empty() {
            return song.md5.clone();
        }
        if exchange.is_download() {
            return self.checksums.compute_now(&song.url).await;
        }
        let keys = vec![
            CacheKey::from_track_id(track_id, exchange.quality),
            CacheKey::from_track_id(&song.id, exchange.quality),
        ];
        self.checksums.enqueue(keys, song.url.clone()).await;
        placeholder_md5(&song.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::CacheEntry,
        config::UnblockConfig,
        model::song::{MusicQuality, Platform},
        rewriter::tests::{NoSession, rewriter_with},
        search::tests::{MockProvider, mock_song, mock_track_info},
    };
    use std::sync::Arc;

    fn grey_rewriter() -> ResponseRewriter {
        rewriter_with(
            UnblockConfig::default(),
            vec![Arc::new(MockProvider::new(
                Platform::KuWo,
                vec![mock_song(Platform::KuWo, "42", "晴天", "周杰伦")],
            ))],
            mock_track_info("晴天", "周杰伦"),
            Arc::new(NoSession),
        )
    }

    fn exchange(path: &str, body: Value) -> ProxiedExchange {
        ProxiedExchange {
            path: path.to_string(),
            quality: MusicQuality::ExHigh,
            decoded_body: Some(body),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_grey() {
        let node = |v: Value| v.as_object().cloned().unwrap();
        assert!(is_grey(&node(json!({ "id": 1, "url": null }))));
        assert!(is_grey(&node(json!({ "id": 1 }))));
        assert!(is_grey(&node(json!({ "url": "http://a", "freeTrialInfo": { "start": 0 } }))));
        assert!(!is_grey(&node(json!({ "url": "http://a", "freeTrialInfo": null }))));
    }

    #[test]
    fn test_stream_type() {
        assert_eq!(stream_type("http://a.com/x/song.FLAC?vkey=1", 0), "flac");
        assert_eq!(stream_type("http://a.com/x/song.m4a", 0), "mp3");
        assert_eq!(stream_type("http://a.com/x/song.m4a", 999_000), "flac");
        assert_eq!(stream_type("http://a.com/x/play?id=1.mp3", 0), "mp3");
        assert_eq!(default_bitrate("ape"), 999_000);
        assert_eq!(default_bitrate("aac"), 128_000);
    }

    #[tokio::test]
    async fn test_grey_track_is_substituted() {
        let rewriter = grey_rewriter();
        let mut exchange = exchange(
            "/api/song/enhance/player/url/v1",
            json!({
                "code": 200,
                "data": [{ "id": 123, "url": null, "freeTrialInfo": { "start": 0, "end": 30 }, "fee": 1 }]
            }),
        );

        assert!(rewriter.rewrite(&mut exchange).await);
        let node = &exchange.decoded_body.as_ref().unwrap()["data"][0];
        assert_eq!(node["url"], "http://mock.example/9000142.mp3");
        assert_eq!(node["fee"], 8);
        assert!(node["freeTrialInfo"].is_null(), "试听信息应被清除");
        assert_eq!(node["type"], "mp3");
        assert_eq!(node["br"], 320000);
        assert_eq!(node["size"], 1024);
        assert_eq!(node["code"], 200);
        assert_eq!(node["md5"], placeholder_md5("http://mock.example/9000142.mp3"));

        rewriter.checksums.wait_idle().await;
        let key = CacheKey::from_track_id("123", MusicQuality::ExHigh);
        match rewriter.resolver.cache().get(&key) {
            Some(CacheEntry::Resolved(song)) => {
                assert_eq!(song.md5, "0123456789abcdef0123456789abcdef", "后台摘要应写回缓存")
            }
            other => panic!("缓存条目不符合预期: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_download_computes_checksum_synchronously() {
        let rewriter = grey_rewriter();
        let mut exchange = exchange(
            "/api/song/enhance/download/url",
            json!({ "data": { "id": 123, "url": null } }),
        );
        assert!(rewriter.rewrite(&mut exchange).await);
        assert_eq!(
            exchange.decoded_body.unwrap()["data"]["md5"],
            "0123456789abcdef0123456789abcdef"
        );
    }

    #[tokio::test]
    async fn test_unresolvable_track_is_left_unchanged() {
        let rewriter = rewriter_with(
            UnblockConfig::default(),
            vec![Arc::new(MockProvider::new(Platform::KuWo, vec![]))],
            mock_track_info("晴天", "周杰伦"),
            Arc::new(NoSession),
        );
        let original = json!({ "data": [{ "id": 5, "url": null, "fee": 1 }] });
        let mut exchange = exchange("/api/song/enhance/player/url", original.clone());
        assert!(!rewriter.rewrite(&mut exchange).await);
        assert_eq!(exchange.decoded_body.unwrap(), original);
    }

    #[tokio::test]
    async fn test_playable_track_is_not_searched() {
        let provider = Arc::new(MockProvider::new(Platform::KuWo, vec![]));
        let rewriter = rewriter_with(
            UnblockConfig::default(),
            vec![provider.clone()],
            mock_track_info("晴天", "周杰伦"),
            Arc::new(NoSession),
        );
        let mut exchange = exchange(
            "/api/song/enhance/player/url",
            json!({ "data": [{ "id": 5, "url": "http://m7.music.126.net/a.mp3", "freeTrialInfo": null }] }),
        );
        assert!(!rewriter.rewrite(&mut exchange).await);
        assert_eq!(
            provider.search_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }
}
