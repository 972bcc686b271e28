//! 实现了酷我音乐的备用音源。
//!
//! 搜索走网页接口，需要先从搜索页的 Cookie 中拿到 `kw_token`，
//! 并把它同时放进 `csrf` 请求头与 Cookie 中。
//! 播放链接走移动端接口，查询参数用 [`des`] 模块中的私有 DES 变体加密。

use std::sync::LazyLock;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use regex::Regex;
use reqwest::{Client, header};
use serde_json::{Map, json};
use tracing::{debug, instrument, trace};

use crate::{
    error::{Result, UnblockError},
    model::song::{MusicQuality, Platform, Song},
    providers::{Provider, id_string},
};

pub mod des;
pub mod models;

const TOKEN_URL: &str = "http://kuwo.cn/search/list";
const SEARCH_URL: &str = "http://www.kuwo.cn/api/www/search/searchMusicBykeyWord";
const REFERER_BASE: &str = "http://www.kuwo.cn/search/list?key=";
const MOBILE_URL: &str = "http://mobi.kuwo.cn/mobi.s?f=kuwo&q=";
const MOBILE_USER_AGENT: &str = "okhttp/3.10.0";

/// 酷我用来顶替无版权歌曲的占位音频：文件名与时长（秒）。
const PLACEHOLDER_AUDIO: [(&str, &str); 1] = [("2914632520.mp3", "7")];

static PLAY_URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"http[^\s$"]+"#).unwrap());

/// 酷我音乐的 Provider 实现
#[derive(Debug, Clone)]
pub struct KuwoProvider {
    http_client: Client,
}

impl KuwoProvider {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }

    /// 从搜索页的 `set-cookie` 中取出 `kw_token`。取不到时返回空字符串，搜索仍会照常发出。
    async fn fetch_token(&self, keyword: &str) -> String {
        let response = match self
            .http_client
            .get(TOKEN_URL)
            .query(&[("key", keyword)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!("获取 kw_token 失败: {e}");
                return String::new();
            }
        };
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(parse_token_cookie)
            .unwrap_or_default()
    }

    /// 拼出移动端接口的明文查询串。
    fn mobile_query(rid: &str, quality: MusicQuality) -> String {
        let (format, br) = match quality {
            MusicQuality::Standard => ("mp3", "&br=128kmp3"),
            MusicQuality::Higher => ("mp3", "&br=192kmp3"),
            MusicQuality::ExHigh => ("mp3", ""),
            MusicQuality::Lossless => ("flac|mp3", ""),
        };
        format!("corp=kuwo&p2p=1&type=convert_url2&sig=0&format={format}&rid={rid}{br}")
    }
}

fn parse_token_cookie(cookie: &str) -> Option<String> {
    let pair = cookie.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    (name == "kw_token").then(|| value.to_string())
}

fn unescape_html(text: &str) -> String {
    quick_xml::escape::unescape(text)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

fn to_song(item: models::SongItem) -> Option<Song> {
    let rid = id_string(&item.rid)?;
    let mut raw = Map::new();
    raw.insert("rid".into(), json!(rid));
    raw.insert("duration".into(), item.duration);

    Some(Song {
        id: Platform::KuWo.synthetic_id(&rid),
        name: unescape_html(&item.name),
        artist: unescape_html(&item.artist),
        album_name: unescape_html(&item.album),
        source: Some(Platform::KuWo),
        raw,
        ..Default::default()
    })
}

/// 检查链接是否指向占位音频。
fn is_placeholder(url: &str, song: &Song) -> bool {
    let file_name = url.rsplit('/').next().unwrap_or_default();
    let duration = song.raw_str("duration").unwrap_or_default();
    PLACEHOLDER_AUDIO
        .iter()
        .any(|(name, secs)| *name == file_name && *secs == duration)
}

#[async_trait]
impl Provider for KuwoProvider {
    fn name(&self) -> &'static str {
        "kuwo"
    }

    fn platform(&self) -> Platform {
        Platform::KuWo
    }

    #[instrument(skip(self))]
    async fn search_songs(&self, keyword: &str) -> Result<Vec<Song>> {
        let token = self.fetch_token(keyword).await;
        let referer = format!("{REFERER_BASE}{}", urlencoding::encode(keyword));

        let response: models::SearchResponse = self
            .http_client
            .get(SEARCH_URL)
            .query(&[("key", keyword), ("pn", "1"), ("rn", "30")])
            .header(header::REFERER, referer)
            .header("csrf", &token)
            .header(header::COOKIE, format!("kw_token={token}"))
            .send()
            .await?
            .json()
            .await?;

        let songs: Vec<Song> = response
            .data
            .map(|data| data.list)
            .unwrap_or_default()
            .into_iter()
            .filter_map(to_song)
            .collect();
        debug!(count = songs.len(), "酷我搜索完成");
        Ok(songs)
    }

    #[instrument(skip(self, song), fields(id = %song.id))]
    async fn resolve_url(&self, song: &Song, quality: MusicQuality) -> Result<Song> {
        let rid = song
            .raw_str("rid")
            .ok_or_else(|| UnblockError::ApiError("酷我候选缺少 rid".into()))?;
        let query = Self::mobile_query(&rid, quality);
        let encrypted = STANDARD.encode(des::encrypt(query.as_bytes()));

        let body = self
            .http_client
            .get(format!("{MOBILE_URL}{encrypted}"))
            .header(header::USER_AGENT, MOBILE_USER_AGENT)
            .send()
            .await?
            .text()
            .await?;
        trace!(response.body = %body, "酷我移动端响应");

        let url = PLAY_URL_RE
            .find(&body)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| UnblockError::ApiError("酷我响应中没有播放链接".into()))?;
        if is_placeholder(&url, song) {
            return Err(UnblockError::ApiError("酷我返回了版权占位音频".into()));
        }

        let mut resolved = song.clone();
        resolved.url = url;
        Ok(resolved)
    }
}
