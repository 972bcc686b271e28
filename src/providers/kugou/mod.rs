//! 实现了酷狗音乐的备用音源。
//!
//! # 使用流程
//!
//! 1. 使用 `search_songs` 搜索歌曲，候选歌曲的原始字段中保存了各个音质的文件哈希。
//! 2. 调用 `resolve_url` 时按音质挑选哈希，向 `trackercdn` 请求播放链接。

use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::{Client, header};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    error::{Result, UnblockError},
    model::song::{MusicQuality, Platform, Song},
    providers::{Provider, id_string},
};

pub mod models;

const SEARCH_URL: &str = "http://mobilecdn.kugou.com/api/v3/search/song";
const TRACKER_URL: &str = "http://trackercdn.kugou.com/i/v2/";
const TRACKER_KEY_SUFFIX: &str = "kgcloudv2";
const APP_ID: &str = "1005";

/// 酷狗音乐的 Provider 实现
#[derive(Debug, Clone)]
pub struct KugouProvider {
    http_client: Client,
    /// `kg_mid` Cookie，每个实例随机生成一次。
    mid: String,
}

impl KugouProvider {
    pub fn new(http_client: Client) -> Self {
        let mid = format!("{:x}", Md5::digest(Uuid::new_v4().to_string().as_bytes()));
        Self { http_client, mid }
    }

    /// 按音质选择文件哈希，对应的哈希缺失时退回标准音质。
    fn pick_hash(song: &Song, quality: MusicQuality) -> Option<String> {
        let key = match quality {
            MusicQuality::Standard | MusicQuality::Higher => "hash",
            MusicQuality::ExHigh => "320hash",
            MusicQuality::Lossless => "sqhash",
        };
        song.raw_str(key).or_else(|| song.raw_str("hash"))
    }

    fn tracker_key(hash: &str) -> String {
        format!("{:x}", Md5::digest(format!("{hash}{TRACKER_KEY_SUFFIX}").as_bytes()))
    }
}

fn to_song(item: models::SongInfo) -> Option<Song> {
    if item.hash.is_empty() {
        return None;
    }
    let audio_id = id_string(&item.audio_id)?;
    let mut raw = Map::new();
    raw.insert("hash".into(), json!(item.hash));
    raw.insert("320hash".into(), json!(item.hash_320));
    raw.insert("sqhash".into(), json!(item.sqhash));
    raw.insert("album_id".into(), item.album_id);
    raw.insert("audio_id".into(), json!(audio_id));

    Some(Song {
        id: Platform::KuGou.synthetic_id(&audio_id),
        name: item.songname,
        artist: item.singername,
        album_name: item.album_name,
        source: Some(Platform::KuGou),
        raw,
        ..Default::default()
    })
}

#[async_trait]
impl Provider for KugouProvider {
    fn name(&self) -> &'static str {
        "kugou"
    }

    fn platform(&self) -> Platform {
        Platform::KuGou
    }

    #[instrument(skip(self))]
    async fn search_songs(&self, keyword: &str) -> Result<Vec<Song>> {
        let response: models::SearchSongResponse = self
            .http_client
            .get(SEARCH_URL)
            .query(&[("keyword", keyword), ("page", "1"), ("pagesize", "10")])
            .header(header::COOKIE, format!("kg_mid={}", self.mid))
            .send()
            .await?
            .json()
            .await?;

        let songs: Vec<Song> = response
            .data
            .map(|data| data.info)
            .unwrap_or_default()
            .into_iter()
            .filter_map(to_song)
            .collect();
        debug!(count = songs.len(), "酷狗搜索完成");
        Ok(songs)
    }

    #[instrument(skip(self, song), fields(id = %song.id))]
    async fn resolve_url(&self, song: &Song, quality: MusicQuality) -> Result<Song> {
        let hash = Self::pick_hash(song, quality)
            .ok_or_else(|| UnblockError::ApiError("酷狗候选缺少文件哈希".into()))?;
        let album_id = song.raw_str("album_id").unwrap_or_default();
        let key = Self::tracker_key(&hash);

        let response: models::TrackerResponse = self
            .http_client
            .get(TRACKER_URL)
            .query(&[
                ("key", key.as_str()),
                ("hash", hash.as_str()),
                ("appid", APP_ID),
                ("pid", "2"),
                ("cmd", "25"),
                ("behavior", "play"),
                ("album_id", album_id.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        if response.status != 1 {
            return Err(UnblockError::ApiError(format!(
                "酷狗拒绝提供播放链接 (status = {})",
                response.status
            )));
        }
        let url = response
            .url
            .as_array()
            .and_then(|urls| urls.first())
            .and_then(Value::as_str)
            .filter(|u| u.starts_with("http"))
            .ok_or_else(|| UnblockError::ApiError("酷狗响应中没有播放链接".into()))?;

        let mut resolved = song.clone();
        resolved.url = url.to_string();
        if let Some(br) = id_string(&response.bit_rate).and_then(|b| b.parse().ok()) {
            resolved.bitrate = br;
        }
        Ok(resolved)
    }
}
