//! 实现了咪咕音乐的备用音源。
//!
//! 播放信息接口要求请求参数经过 [`crypto`] 模块加密，
//! 加密结果以 `data` 与 `secKey` 两个查询参数发送。

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::{Map, json};
use tracing::{debug, instrument};

use crate::{
    error::{Result, UnblockError},
    model::song::{MusicQuality, Platform, Song},
    providers::{Provider, id_string},
};

pub mod crypto;
pub mod models;

const SEARCH_URL: &str = "http://m.music.migu.cn/migu/remoting/scr_search_tag";
const PLAY_INFO_URL: &str = "http://music.migu.cn/v3/api/music/audioPlayer/getPlayInfo";
const SITE_URL: &str = "http://music.migu.cn/";

/// 咪咕音乐的 Provider 实现
#[derive(Debug, Clone)]
pub struct MiguProvider {
    http_client: Client,
}

impl MiguProvider {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }

    /// 音质档位在播放信息接口中的编号。
    fn quality_type(quality: MusicQuality) -> u8 {
        match quality {
            MusicQuality::Standard | MusicQuality::Higher => 1,
            MusicQuality::ExHigh => 2,
            MusicQuality::Lossless => 3,
        }
    }
}

fn to_song(item: models::MusicItem) -> Option<Song> {
    let copyright_id = item.copyright_id.filter(|id| !id.is_empty())?;
    let mut raw = Map::new();
    raw.insert("copyrightId".into(), json!(copyright_id));
    if let Some(id) = id_string(&item.id) {
        raw.insert("id".into(), json!(id));
    }

    Some(Song {
        id: Platform::MiGu.synthetic_id(&copyright_id),
        name: item.song_name,
        artist: item.singer_name,
        album_name: item.album_name,
        source: Some(Platform::MiGu),
        raw,
        ..Default::default()
    })
}

/// 规范化接口返回的播放链接，协议相对的地址补上 `http:`。
fn normalize_play_url(url: &str) -> Option<String> {
    if url.starts_with("http") {
        Some(url.to_string())
    } else if url.starts_with("//") {
        Some(format!("http:{url}"))
    } else {
        None
    }
}

#[async_trait]
impl Provider for MiguProvider {
    fn name(&self) -> &'static str {
        "migu"
    }

    fn platform(&self) -> Platform {
        Platform::MiGu
    }

    #[instrument(skip(self))]
    async fn search_songs(&self, keyword: &str) -> Result<Vec<Song>> {
        let response: models::SearchResponse = self
            .http_client
            .get(SEARCH_URL)
            .query(&[
                ("keyword", keyword),
                ("type", "2"),
                ("rows", "20"),
                ("pgc", "1"),
            ])
            .send()
            .await?
            .json()
            .await?;

        let songs: Vec<Song> = response.musics.into_iter().filter_map(to_song).collect();
        debug!(count = songs.len(), "咪咕搜索完成");
        Ok(songs)
    }

    #[instrument(skip(self, song), fields(id = %song.id))]
    async fn resolve_url(&self, song: &Song, quality: MusicQuality) -> Result<Song> {
        let copyright_id = song
            .raw_str("copyrightId")
            .ok_or_else(|| UnblockError::ApiError("咪咕候选缺少 copyrightId".into()))?;
        let request = json!({
            "copyrightId": copyright_id,
            "type": Self::quality_type(quality),
        });
        let payload = crypto::encrypt_request(&request.to_string())?;

        let url = format!(
            "{PLAY_INFO_URL}?dataType=2&data={}&secKey={}",
            urlencoding::encode(&payload.data),
            urlencoding::encode(&payload.sec_key)
        );
        let response: models::PlayInfoResponse = self
            .http_client
            .get(url)
            .header(header::ORIGIN, SITE_URL)
            .header(header::REFERER, SITE_URL)
            .send()
            .await?
            .json()
            .await?;

        let play_url = response
            .data
            .and_then(|data| normalize_play_url(&data.play_url))
            .ok_or_else(|| UnblockError::ApiError("咪咕响应中没有播放链接".into()))?;

        let mut resolved = song.clone();
        resolved.url = play_url;
        Ok(resolved)
    }
}
