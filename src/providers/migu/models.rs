//! 此模块定义了用于反序列化咪咕音乐 API 响应的数据结构。

use serde::Deserialize;
use serde_json::Value;

/// 移动端搜索接口 (`scr_search_tag`) 的响应。
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub musics: Vec<MusicItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicItem {
    /// 版权 ID，请求播放链接时需要它。
    #[serde(default)]
    pub copyright_id: Option<String>,
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub singer_name: String,
    #[serde(default)]
    pub song_name: String,
    #[serde(default)]
    pub album_name: String,
}

/// 播放信息接口 (`getPlayInfo`) 的响应。
///
/// 接口返回的字段大小写并不稳定，`data`/`Data` 与 `playUrl`/`PlayUrl` 都出现过。
#[derive(Debug, Deserialize)]
pub struct PlayInfoResponse {
    #[serde(default, alias = "Data")]
    pub data: Option<PlayInfoData>,
}

#[derive(Debug, Deserialize)]
pub struct PlayInfoData {
    #[serde(default, rename = "playUrl", alias = "PlayUrl")]
    pub play_url: String,
}
