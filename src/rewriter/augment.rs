//! 搜索结果补充：把备用音源的搜索结果插到网易云音乐搜索结果的最前面。

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::ResponseRewriter;
use crate::model::{exchange::ProxiedExchange, song::Song};

/// 找到响应中歌曲列表所在的对象。
///
/// 依次尝试 PC 端、安卓综合搜索、单曲搜索与 iOS 综合搜索的结构。
fn locate_song_list<'a>(tree: &'a mut Value, search_path: &str) -> Option<&'a mut Vec<Value>> {
    let pointers = [
        format!("/{}/result/songs", escape_pointer(search_path)),
        "/data/complete/song/songs".to_string(),
        "/result/songs".to_string(),
        "/result/song/songs".to_string(),
    ];
    let pointer = pointers
        .iter()
        .find(|p| tree.pointer(p).is_some_and(Value::is_array))?;
    tree.pointer_mut(pointer)?.as_array_mut()
}

/// JSON Pointer 转义（`~` → `~0`，`/` → `~1`）。
fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// 以一首网易云音乐的搜索结果为模板，生成备用音源歌曲的条目。
///
/// 合成 ID 不是纯数字（例如 QQ 音乐）或模板缺少 `name` 时返回 `None`。
fn build_entry(template: &Map<String, Value>, song: &Song) -> Option<Value> {
    if !template.contains_key("name") {
        return None;
    }
    let Ok(id) = song.id.parse::<i64>() else {
        debug!(id = %song.id, "合成 ID 不是数字，跳过");
        return None;
    };

    let mut entry = template.clone();
    let annotation = song.source.map(|p| p.annotation()).unwrap_or_default();
    entry.insert("alia".into(), json!([annotation]));
    entry.insert("id".into(), json!(id));
    entry.insert("name".into(), json!(song.name));

    if let Some(artists) = entry.get_mut("ar") {
        // 只保留第一个艺术家，沿用其余字段
        let first = artists
            .as_array()
            .and_then(|list| list.first())
            .and_then(Value::as_object)
            .cloned();
        let artist = match first {
            Some(mut first) => {
                first.insert("name".into(), json!(song.artist));
                Value::Object(first)
            }
            None => json!({ "name": song.artist }),
        };
        *artists = json!([artist]);
    }
    if let Some(Value::Object(album)) = entry.get_mut("al") {
        album.insert("name".into(), json!(song.album_name));
    }
    Some(Value::Object(entry))
}

impl ResponseRewriter {
    /// 等待请求阶段发起的备用音源搜索，并把结果插入响应。
    ///
    /// 补充的条目放在列表最前面，网易云音乐自己的结果排在其后。
    pub(super) async fn try_augment(&self, exchange: &mut ProxiedExchange, tree: &mut Value) -> bool {
        if self.config.search_limit == 0 {
            return false;
        }
        let Some(pending) = exchange.pending_search.take() else {
            return false;
        };
        let songs = match pending.task.await {
            Ok(songs) => songs,
            Err(e) => {
                warn!("备用音源搜索任务异常退出: {e}");
                return false;
            }
        };
        if songs.is_empty() {
            return false;
        }

        let Some(list) = locate_song_list(tree, &pending.search_path) else {
            debug!("响应中没有找到歌曲列表");
            return false;
        };
        let Some(Value::Object(template)) = list.first() else {
            return false;
        };
        let template = template.clone();

        let extra: Vec<Value> = songs
            .iter()
            .filter_map(|song| build_entry(&template, song))
            .collect();
        if extra.is_empty() {
            return false;
        }
        info!("向搜索结果追加 {} 首备用音源歌曲", extra.len());
        list.splice(0..0, extra);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::UnblockConfig,
        model::{exchange::PendingSearch, song::Platform},
        rewriter::tests::{NoSession, rewriter_with},
        search::tests::{MockProvider, mock_song, mock_track_info},
    };
    use std::sync::Arc;

    fn template() -> Map<String, Value> {
        json!({
            "id": 186016,
            "name": "晴天",
            "ar": [{ "id": 6452, "name": "周杰伦" }, { "id": 1, "name": "其他" }],
            "al": { "id": 18905, "name": "叶惠美" },
            "fee": 1
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_build_entry_from_template() {
        let mut song = mock_song(Platform::KuGou, "555", "晴天 (Live)", "周杰伦");
        song.album_name = "现场".into();
        let entry = build_entry(&template(), &song).unwrap();

        assert_eq!(entry["id"], 90003555i64);
        assert_eq!(entry["name"], "晴天 (Live)");
        assert_eq!(entry["alia"], json!(["来自酷狗音乐"]));
        assert_eq!(entry["ar"], json!([{ "id": 6452, "name": "周杰伦" }]));
        assert_eq!(entry["al"]["name"], "现场");
        assert_eq!(entry["fee"], 1, "其余字段保持模板的值");
    }

    #[test]
    fn test_non_numeric_id_is_skipped() {
        let song = mock_song(Platform::QQ, "0039MnYb0qxYhV", "晴天", "周杰伦");
        assert!(build_entry(&template(), &song).is_none());
    }

    #[test]
    fn test_locate_song_list_shapes() {
        let mut pc = json!({ "/api/cloudsearch/pc": { "result": { "songs": [1] } } });
        assert!(locate_song_list(&mut pc, "/api/cloudsearch/pc").is_some());

        let mut android = json!({ "data": { "complete": { "song": { "songs": [] } } } });
        assert!(locate_song_list(&mut android, "/batch").is_some());

        let mut ios = json!({ "result": { "song": { "songs": [] } } });
        assert!(locate_song_list(&mut ios, "/api/v1/search/get").is_some());

        let mut none = json!({ "result": { "artists": [] } });
        assert!(locate_song_list(&mut none, "/api/v1/search/get").is_none());
    }

    #[tokio::test]
    async fn test_pending_search_results_are_prepended() {
        let config = UnblockConfig {
            search_limit: 2,
            ..Default::default()
        };
        let rewriter = rewriter_with(
            config,
            vec![Arc::new(MockProvider::new(Platform::KuWo, vec![]))],
            mock_track_info("", ""),
            Arc::new(NoSession),
        );

        let found = vec![
            mock_song(Platform::KuWo, "1", "晴天", "周杰伦"),
            mock_song(Platform::QQ, "abc", "晴天", "周杰伦"),
        ];
        let mut exchange = ProxiedExchange {
            path: "/api/v1/search/song/get".into(),
            pending_search: Some(PendingSearch {
                search_path: "/api/v1/search/song/get".into(),
                task: tokio::spawn(async move { found }),
            }),
            decoded_body: Some(json!({ "result": { "songs": [Value::Object(template())] } })),
            ..Default::default()
        };

        assert!(rewriter.rewrite(&mut exchange).await);
        let songs = &exchange.decoded_body.unwrap()["result"]["songs"];
        let ids: Vec<_> = songs
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![900011, 186016], "QQ 音乐的非数字 ID 被跳过，原结果排在后面");
    }
}
