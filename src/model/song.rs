//! 定义了歌曲解析流程中使用的核心数据结构：音源平台、音质、搜索输入与候选歌曲。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// 可以作为备用音源的第三方平台。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    /// 酷我音乐
    KuWo,
    /// 咪咕音乐
    MiGu,
    /// 酷狗音乐
    KuGou,
    /// QQ 音乐
    QQ,
}

impl Platform {
    /// 合成 ID 的平台前缀。
    ///
    /// 合成 ID 必须是纯数字，客户端会把它当作普通的歌曲 ID 使用。
    pub fn id_tag(self) -> &'static str {
        match self {
            Self::KuWo => "90001",
            Self::MiGu => "90002",
            Self::KuGou => "90003",
            Self::QQ => "90004",
        }
    }

    /// 展示在搜索结果别名中的来源说明。
    pub fn annotation(self) -> &'static str {
        match self {
            Self::KuWo => "来自酷我音乐",
            Self::MiGu => "来自咪咕音乐",
            Self::KuGou => "来自酷狗音乐",
            Self::QQ => "来自QQ音乐",
        }
    }

    /// 用平台前缀与平台原生 ID 拼出合成 ID。
    pub fn synthetic_id(self, native_id: &str) -> String {
        format!("{}{native_id}", self.id_tag())
    }

    /// 从合成 ID 中拆出平台与原生 ID。
    ///
    /// 对于网易云音乐自己的 ID，返回 `None`。
    pub fn split_synthetic_id(id: &str) -> Option<(Self, &str)> {
        Self::iter().find_map(|platform| {
            id.strip_prefix(platform.id_tag())
                .filter(|rest| !rest.is_empty())
                .map(|rest| (platform, rest))
        })
    }
}

/// 音质档位，顺序从低到高。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MusicQuality {
    /// 标准 (128k)
    Standard,
    /// 较高 (192k)
    Higher,
    /// 极高 (320k)
    ExHigh,
    /// 无损
    #[default]
    Lossless,
}

impl MusicQuality {
    /// 该档位对应的码率 (bps)。
    pub fn bitrate(self) -> u64 {
        match self {
            Self::Standard => 128_000,
            Self::Higher => 192_000,
            Self::ExHigh => 320_000,
            Self::Lossless => 999_000,
        }
    }

    /// 根据客户端请求中的 `br` 参数推断档位，无法识别时返回 `None`。
    pub fn from_bitrate(br: u64) -> Option<Self> {
        match br {
            999_000 => Some(Self::Lossless),
            320_000 => Some(Self::ExHigh),
            192_000 => Some(Self::Higher),
            128_000 => Some(Self::Standard),
            _ => None,
        }
    }

    /// 低一级的档位，已经是最低档时返回 `None`。
    pub fn lower(self) -> Option<Self> {
        match self {
            Self::Lossless => Some(Self::ExHigh),
            Self::ExHigh => Some(Self::Higher),
            Self::Higher => Some(Self::Standard),
            Self::Standard => None,
        }
    }
}

/// 一次歌曲解析的搜索输入。
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// 歌曲名。
    pub track_name: String,
    /// 原始的艺术家列表。
    pub artists: Vec<String>,
    /// 专辑名。
    pub album: Option<String>,
    /// 艺术家名的全部组合（含空组合），用空格连接。
    pub artist_candidates: Vec<String>,
    /// 期望的音质档位。
    pub quality: MusicQuality,
}

impl SearchQuery {
    /// 构建搜索输入，同时计算艺术家组合。
    pub fn new(
        track_name: impl Into<String>,
        artists: Vec<String>,
        album: Option<String>,
        quality: MusicQuality,
    ) -> Self {
        let artists: Vec<String> = artists
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        let artist_candidates = artist_combinations(&artists);
        Self {
            track_name: track_name.into().trim().to_string(),
            artists,
            album,
            artist_candidates,
            quality,
        }
    }

    /// 每个艺术家组合对应的搜索关键词。
    pub fn keywords(&self) -> Vec<String> {
        self.artist_candidates
            .iter()
            .map(|combination| {
                if combination.is_empty() {
                    self.track_name.clone()
                } else {
                    format!("{} {combination}", self.track_name)
                }
            })
            .collect()
    }

    /// 以空格连接的全部艺术家。
    pub fn artist_line(&self) -> String {
        self.artists.join(" ")
    }
}

/// 计算艺术家列表的全部组合（幂集），保持输入顺序。
///
/// 空列表只产生一个空组合。
pub fn artist_combinations(artists: &[String]) -> Vec<String> {
    match artists {
        [] => vec![String::new()],
        [first, rest @ ..] => {
            let tail = artist_combinations(rest);
            let mut result = tail.clone();
            result.extend(
                tail.iter()
                    .map(|t| format!("{first} {t}").trim().to_string()),
            );
            let mut seen = std::collections::HashSet::new();
            result.retain(|c| seen.insert(c.clone()));
            result
        }
    }
}

/// 由备用音源返回的一首候选歌曲。
///
/// 除 `url`、`md5`、`size`、`bitrate` 会在解析链接后补齐外，其余字段创建后不再修改。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    /// 合成 ID（平台前缀 + 原生 ID）。
    pub id: String,
    /// 歌曲名。
    pub name: String,
    /// 艺术家，多个艺术家以空格分隔。
    pub artist: String,
    /// 专辑名。
    pub album_name: String,
    /// 播放链接，尚未解析时为空。
    pub url: String,
    /// 码率 (bps)，未知时为 0。
    pub bitrate: u64,
    /// 文件大小（字节），未知时为 0。
    pub size: u64,
    /// 文件的 MD5，未知时为空。
    pub md5: String,
    /// 匹配得分。
    pub match_score: f64,
    /// 来源平台。
    pub source: Option<Platform>,
    /// 平台返回的原始字段，解析播放链接时需要用到。
    pub raw: Map<String, Value>,
}

impl Song {
    /// 取原始字段中的字符串值，数字会被转换为字符串。
    pub fn raw_str(&self, key: &str) -> Option<String> {
        match self.raw.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artist_combinations_cover_power_set() {
        let artists = vec!["A".to_string(), "B".to_string()];
        let combinations = artist_combinations(&artists);
        assert_eq!(combinations, vec!["", "B", "A", "A B"]);

        assert_eq!(artist_combinations(&[]), vec![""]);
    }

    #[test]
    fn test_keywords_prefix_track_name() {
        let query = SearchQuery::new(
            "晴天",
            vec!["周杰伦".to_string()],
            None,
            MusicQuality::Lossless,
        );
        assert_eq!(query.keywords(), vec!["晴天", "晴天 周杰伦"]);
    }

    #[test]
    fn test_synthetic_id_round_trip() {
        let id = Platform::KuGou.synthetic_id("12345");
        assert_eq!(id, "9000312345");
        assert_eq!(
            Platform::split_synthetic_id(&id),
            Some((Platform::KuGou, "12345"))
        );
        assert_eq!(Platform::split_synthetic_id("186016"), None);
        assert_eq!(Platform::split_synthetic_id("90001"), None);
    }

    #[test]
    fn test_quality_parsing() {
        assert_eq!("exhigh".parse::<MusicQuality>().unwrap(), MusicQuality::ExHigh);
        assert_eq!(MusicQuality::from_bitrate(192_000), Some(MusicQuality::Higher));
        assert_eq!(MusicQuality::from_bitrate(1), None);
        assert_eq!(MusicQuality::Standard.lower(), None);
        assert_eq!("QQ".parse::<Platform>().unwrap(), Platform::QQ);
    }
}
