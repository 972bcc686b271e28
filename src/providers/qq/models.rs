//! 此模块定义了用于反序列化 QQ 音乐 API 响应的数据结构。

use serde::Deserialize;

// =================================================================
// 搜索接口 (`client_search_cp`) 的模型
// =================================================================

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
pub struct SearchData {
    pub song: Option<SongList>,
}

#[derive(Debug, Deserialize)]
pub struct SongList {
    #[serde(default)]
    pub list: Vec<SongItem>,
}

/// 搜索结果中的一首歌。
#[derive(Debug, Deserialize)]
pub struct SongItem {
    /// 歌曲 MID，是字母数字混合的字符串。
    #[serde(default)]
    pub mid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub singer: Vec<Singer>,
    pub album: Option<Album>,
    pub file: Option<FileInfo>,
}

#[derive(Debug, Deserialize)]
pub struct Singer {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct FileInfo {
    /// 媒体文件 MID，拼接文件名时使用。
    #[serde(default)]
    pub media_mid: String,
}

// =================================================================
// 播放链接接口 (`vkey.GetVkeyServer.CgiGetVkey`) 的模型
// =================================================================

/// 歌曲文件的类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongFileType {
    /// 128kbps MP3
    Mp3_128,
    /// 320kbps MP3
    Mp3_320,
    /// FLAC 无损
    Flac,
}

impl SongFileType {
    /// 获取该文件类型对应的类型码和扩展名
    #[must_use]
    pub fn get_parts(self) -> (&'static str, &'static str) {
        match self {
            Self::Mp3_128 => ("M500", "mp3"),
            Self::Mp3_320 => ("M800", "mp3"),
            Self::Flac => ("F000", "flac"),
        }
    }

    /// 文件的名义码率 (bps)。
    pub fn bitrate(self) -> u64 {
        match self {
            Self::Mp3_128 => 128_000,
            Self::Mp3_320 => 320_000,
            Self::Flac => 999_000,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VkeyResponse {
    pub req_0: Option<VkeyRequestResult>,
}

#[derive(Debug, Deserialize)]
pub struct VkeyRequestResult {
    pub data: Option<VkeyData>,
}

#[derive(Debug, Deserialize)]
pub struct VkeyData {
    /// 可用的 CDN 地址前缀。
    #[serde(default)]
    pub sip: Vec<String>,
    /// 与请求中的文件名一一对应。
    #[serde(default)]
    pub midurlinfo: Vec<MidUrlInfo>,
}

#[derive(Debug, Deserialize)]
pub struct MidUrlInfo {
    /// 相对路径，无权限时为空。
    #[serde(default)]
    pub purl: String,
}
