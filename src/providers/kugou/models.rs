//! 此模块定义了用于反序列化酷狗音乐 API 响应的数据结构。

use serde::Deserialize;
use serde_json::Value;

// =================================================================
// 歌曲搜索接口 (`/api/v3/search/song`) 的模型
// =================================================================

/// 歌曲搜索 API 的顶层响应结构。
#[derive(Debug, Deserialize)]
pub struct SearchSongResponse {
    /// 包含实际搜索结果的数据容器。
    pub data: Option<SearchSongData>,
}

/// 歌曲搜索结果的数据部分。
#[derive(Debug, Deserialize)]
pub struct SearchSongData {
    #[serde(default)]
    pub info: Vec<SongInfo>,
}

/// 代表一首歌曲的搜索结果。
#[derive(Debug, Deserialize)]
pub struct SongInfo {
    /// 标准音质的文件哈希。
    #[serde(default)]
    pub hash: String,
    /// 320k 音质的文件哈希。
    #[serde(rename = "320hash", default)]
    pub hash_320: String,
    /// 无损音质的文件哈希。
    #[serde(default)]
    pub sqhash: String,
    #[serde(default)]
    pub songname: String,
    #[serde(default)]
    pub singername: String,
    #[serde(default)]
    pub album_name: String,
    /// 数字形式的歌曲 ID，用来拼合成 ID。
    #[serde(default)]
    pub audio_id: Value,
    #[serde(default)]
    pub album_id: Value,
}

// =================================================================
// 播放链接接口 (`trackercdn.kugou.com/i/v2/`) 的模型
// =================================================================

/// 播放链接接口的响应。
#[derive(Debug, Deserialize)]
pub struct TrackerResponse {
    /// `1` 表示成功。
    #[serde(default)]
    pub status: i64,
    /// 成功时为链接数组。
    #[serde(default)]
    pub url: Value,
    /// 码率 (bps)。
    #[serde(rename = "bitRate", default)]
    pub bit_rate: Value,
}
