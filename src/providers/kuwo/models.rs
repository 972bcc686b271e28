//! 此模块定义了用于反序列化酷我音乐 API 响应的数据结构。

use serde::Deserialize;
use serde_json::Value;

/// 网页搜索接口 (`searchMusicBykeyWord`) 的顶层响应。
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
pub struct SearchData {
    #[serde(default)]
    pub list: Vec<SongItem>,
}

/// 搜索结果中的一首歌。文本字段可能带有 HTML 实体。
#[derive(Debug, Deserialize)]
pub struct SongItem {
    /// 歌曲 ID，可能是数字也可能是字符串。
    #[serde(default)]
    pub rid: Value,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    /// 时长（秒）。
    #[serde(default)]
    pub duration: Value,
}
