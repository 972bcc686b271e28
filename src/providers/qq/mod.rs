//! 实现了 QQ 音乐的备用音源。
//!
//! 未提供 Cookie 时只请求 320k MP3 一种文件；提供 Cookie 后会一次性请求
//! 128k、320k 与 FLAC 三种文件，再按期望音质向下挑选可用的那个。

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, header};
use serde_json::{Map, json};
use tracing::{debug, instrument, trace};

use crate::{
    error::{Result, UnblockError},
    model::song::{MusicQuality, Platform, Song},
    providers::Provider,
};

pub mod models;

use models::SongFileType;

const SEARCH_URL: &str = "https://c.y.qq.com/soso/fcgi-bin/client_search_cp";
const MUSIC_U_FCG_URL: &str = "https://u.y.qq.com/cgi-bin/musicu.fcg";

const GET_VKEY_MODULE: &str = "vkey.GetVkeyServer";
const GET_VKEY_METHOD: &str = "CgiGetVkey";

/// 按音质从高到低排列的文件类型。
const FILE_TYPES_DESC: [SongFileType; 3] =
    [SongFileType::Flac, SongFileType::Mp3_320, SongFileType::Mp3_128];

/// QQ 音乐的 Provider 实现
#[derive(Debug, Clone)]
pub struct QqProvider {
    http_client: Client,
    cookie: Option<String>,
}

impl QqProvider {
    pub fn new(http_client: Client, cookie: Option<String>) -> Self {
        let cookie = cookie.filter(|c| !c.trim().is_empty());
        Self {
            http_client,
            cookie,
        }
    }

    /// 本次请求要尝试的文件类型。
    fn requested_file_types(&self) -> Vec<SongFileType> {
        if self.cookie.is_some() {
            vec![SongFileType::Mp3_128, SongFileType::Mp3_320, SongFileType::Flac]
        } else {
            vec![SongFileType::Mp3_320]
        }
    }

    fn target_file_type(quality: MusicQuality) -> SongFileType {
        match quality {
            MusicQuality::Lossless => SongFileType::Flac,
            MusicQuality::ExHigh | MusicQuality::Higher => SongFileType::Mp3_320,
            MusicQuality::Standard => SongFileType::Mp3_128,
        }
    }

    /// 生成一个随机的数字 guid。
    fn generate_guid() -> String {
        rand::rng().random_range(1_000_000_000u64..10_000_000_000).to_string()
    }

    fn build_vkey_request(mid: &str, media_mid: &str, file_types: &[SongFileType]) -> String {
        let filenames: Vec<String> = file_types
            .iter()
            .map(|t| {
                let (code, ext) = t.get_parts();
                format!("{code}{media_mid}.{ext}")
            })
            .collect();
        json!({
            "req_0": {
                "module": GET_VKEY_MODULE,
                "method": GET_VKEY_METHOD,
                "param": {
                    "guid": Self::generate_guid(),
                    "loginflag": 1,
                    "filename": filenames,
                    "songmid": vec![mid; file_types.len()],
                    "songtype": vec![0; file_types.len()],
                    "uin": "0",
                    "platform": "20"
                }
            }
        })
        .to_string()
    }
}

/// 从期望的文件类型开始向下降级，返回第一个可用的链接。
///
/// 更低的档位都不可用时，退而使用任何一个可用的链接。
fn pick_file(
    available: &[(SongFileType, String)],
    target: SongFileType,
) -> Option<(SongFileType, String)> {
    let start = FILE_TYPES_DESC.iter().position(|t| *t == target).unwrap_or(0);
    FILE_TYPES_DESC[start..]
        .iter()
        .find_map(|wanted| available.iter().find(|(t, _)| t == wanted))
        .or_else(|| available.first())
        .cloned()
}

fn to_song(item: models::SongItem) -> Option<Song> {
    if item.mid.is_empty() {
        return None;
    }
    let media_mid = item
        .file
        .map(|f| f.media_mid)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| item.mid.clone());
    let artist = item
        .singer
        .into_iter()
        .map(|s| s.name)
        .collect::<Vec<_>>()
        .join(" & ");

    let mut raw = Map::new();
    raw.insert("mid".into(), json!(item.mid));
    raw.insert("media_mid".into(), json!(media_mid));

    Some(Song {
        id: Platform::QQ.synthetic_id(&item.mid),
        name: item.name,
        artist,
        album_name: item.album.map(|a| a.name).unwrap_or_default(),
        source: Some(Platform::QQ),
        raw,
        ..Default::default()
    })
}

#[async_trait]
impl Provider for QqProvider {
    fn name(&self) -> &'static str {
        "qq"
    }

    fn platform(&self) -> Platform {
        Platform::QQ
    }

    #[instrument(skip(self))]
    async fn search_songs(&self, keyword: &str) -> Result<Vec<Song>> {
        let response: models::SearchResponse = self
            .http_client
            .get(SEARCH_URL)
            .query(&[
                ("ct", "24"),
                ("qqmusic_ver", "1298"),
                ("new_json", "1"),
                ("remoteplace", "txt.yqq.center"),
                ("t", "0"),
                ("aggr", "1"),
                ("cr", "1"),
                ("catZhida", "1"),
                ("lossless", "0"),
                ("flag_qc", "0"),
                ("p", "1"),
                ("n", "20"),
                ("w", keyword),
                ("g_tk", "5381"),
                ("loginUin", "0"),
                ("hostUin", "0"),
                ("format", "json"),
                ("inCharset", "utf8"),
                ("outCharset", "utf-8"),
                ("notice", "0"),
                ("platform", "yqq"),
                ("needNewCode", "0"),
            ])
            .send()
            .await?
            .json()
            .await?;

        let songs: Vec<Song> = response
            .data
            .and_then(|data| data.song)
            .map(|song| song.list)
            .unwrap_or_default()
            .into_iter()
            .filter_map(to_song)
            .collect();
        debug!(count = songs.len(), "QQ 音乐搜索完成");
        Ok(songs)
    }

    #[instrument(skip(self, song), fields(id = %song.id))]
    async fn resolve_url(&self, song: &Song, quality: MusicQuality) -> Result<Song> {
        let mid = song
            .raw_str("mid")
            .ok_or_else(|| UnblockError::ApiError("QQ 音乐候选缺少 mid".into()))?;
        let media_mid = song.raw_str("media_mid").unwrap_or_else(|| mid.clone());
        let file_types = self.requested_file_types();
        let data = Self::build_vkey_request(&mid, &media_mid, &file_types);

        let mut request = self
            .http_client
            .get(MUSIC_U_FCG_URL)
            .query(&[("data", data.as_str())]);
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let response: models::VkeyResponse = request.send().await?.json().await?;
        trace!(?response, "QQ 音乐 vkey 响应");

        let vkey = response
            .req_0
            .and_then(|r| r.data)
            .ok_or_else(|| UnblockError::ApiError("QQ 音乐 vkey 响应为空".into()))?;
        let sip = vkey
            .sip
            .first()
            .ok_or_else(|| UnblockError::ApiError("QQ 音乐响应中没有 CDN 地址".into()))?;

        let available: Vec<(SongFileType, String)> = file_types
            .iter()
            .zip(vkey.midurlinfo.iter())
            .filter(|(_, info)| !info.purl.is_empty())
            .map(|(t, info)| (*t, format!("{sip}{}", info.purl)))
            .collect();
        let (file_type, url) = pick_file(&available, Self::target_file_type(quality))
            .ok_or_else(|| UnblockError::ApiError("QQ 音乐没有可用的文件 (purl 为空)".into()))?;

        let mut resolved = song.clone();
        resolved.url = url;
        resolved.bitrate = file_type.bitrate();
        Ok(resolved)
    }
}
