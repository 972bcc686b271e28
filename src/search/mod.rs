//! 搜索模块
//!
//! [`SongResolver`] 负责把一首网易云音乐的灰色歌曲解析成备用音源上的可播放歌曲：
//! 查询元数据、在所有音源中并发搜索、打分挑选、解析播放链接，并把结果写入缓存。

use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::{
    cache::{CacheEntry, CacheKey, ResultCache},
    error::{Result, UnblockError},
    model::song::{MusicQuality, SearchQuery, Song},
    providers::Provider,
};

pub mod matcher;
pub mod probe;

use matcher::MatchScorer;

/// 网易云音乐歌曲的基础元数据。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackInfo {
    pub name: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
}

/// 按歌曲 ID 查询元数据的接口。
///
/// 灰色歌曲在响应中往往只有一个 ID，搜索前需要先补齐歌名与艺术家。
#[async_trait]
pub trait TrackInfoSource: Send + Sync {
    async fn track_info(&self, track_id: &str) -> Result<TrackInfo>;
}

#[derive(Debug, Deserialize)]
struct SongDetailResponse {
    #[serde(default)]
    songs: Vec<SongDetail>,
}

#[derive(Debug, Deserialize)]
struct SongDetail {
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Vec<NamedItem>,
    album: Option<NamedItem>,
}

#[derive(Debug, Deserialize)]
struct NamedItem {
    #[serde(default)]
    name: String,
}

/// 通过网易云音乐的 `/api/song/detail` 接口查询元数据。
#[derive(Debug, Clone)]
pub struct NeteaseTrackInfo {
    http_client: Client,
    upstream: String,
}

impl NeteaseTrackInfo {
    pub fn new(http_client: Client, upstream: impl Into<String>) -> Self {
        Self {
            http_client,
            upstream: upstream.into(),
        }
    }
}

#[async_trait]
impl TrackInfoSource for NeteaseTrackInfo {
    #[instrument(skip(self))]
    async fn track_info(&self, track_id: &str) -> Result<TrackInfo> {
        let url = format!(
            "{}/api/song/detail",
            self.upstream.trim_end_matches('/')
        );
        let response: SongDetailResponse = self
            .http_client
            .get(url)
            .query(&[("ids", format!("[{track_id}]"))])
            .send()
            .await?
            .json()
            .await?;
        track_info_from_detail(track_id, response)
    }
}

/// 取详情响应中的第一首歌，`songs` 为空说明网易云音乐查不到这个 ID。
fn track_info_from_detail(track_id: &str, response: SongDetailResponse) -> Result<TrackInfo> {
    let detail = response
        .songs
        .into_iter()
        .next()
        .ok_or_else(|| UnblockError::SongNotFound(track_id.to_string()))?;
    Ok(TrackInfo {
        name: detail.name,
        artists: detail.artists.into_iter().map(|a| a.name).collect(),
        album: detail.album.map(|a| a.name).filter(|n| !n.is_empty()),
    })
}

/// 一个打过分的候选。
#[derive(Debug, Clone)]
struct ScoredCandidate {
    song: Song,
    score: f64,
}

/// 歌曲解析器。
pub struct SongResolver {
    providers: Vec<Arc<dyn Provider>>,
    cache: Arc<ResultCache>,
    scorer: MatchScorer,
    track_info: Arc<dyn TrackInfoSource>,
    /// 探测播放链接用的客户端。
    http_client: Client,
}

impl SongResolver {
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        cache: Arc<ResultCache>,
        scorer: MatchScorer,
        track_info: Arc<dyn TrackInfoSource>,
        http_client: Client,
    ) -> Self {
        Self {
            providers,
            cache,
            scorer,
            track_info,
            http_client,
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    fn provider_for(&self, song: &Song) -> Option<&Arc<dyn Provider>> {
        let platform = song.source?;
        self.providers.iter().find(|p| p.platform() == platform)
    }

    /// 为客户端可见的歌曲 ID 找到一首可播放的歌曲。
    ///
    /// 依次尝试：缓存命中、缓存中的候选（合成 ID）、元数据搜索。
    /// 至少一个音源正常返回了搜索结果却仍然找不到时，返回 `None` 并记入缓存，
    /// 之后的请求不会再次搜索。所有音源都搜索失败时不写缓存，下次请求会重新搜索。
    #[instrument(skip(self))]
    pub async fn find(&self, track_id: &str, quality: MusicQuality) -> Option<Song> {
        let key = CacheKey::from_track_id(track_id, quality);
        match self.cache.get(&key) {
            Some(CacheEntry::Resolved(song)) if !song.url.is_empty() => {
                debug!("缓存命中");
                return Some(song);
            }
            Some(CacheEntry::Resolved(candidate)) => {
                return self.resolve_candidate(key, candidate, quality).await;
            }
            Some(CacheEntry::NotFound) => {
                debug!("缓存中记录为未找到");
                return None;
            }
            None => {}
        }

        if key.platform.is_some() {
            info!("合成 ID 没有对应的缓存候选，无法解析");
            return None;
        }

        let info = match self.track_info.track_info(track_id).await {
            Ok(info) => info,
            Err(e) => {
                warn!("获取歌曲元数据失败: {e}");
                return None;
            }
        };
        let query = SearchQuery::new(info.name, info.artists, info.album, quality);

        let (resolved, answered) = self.resolve_reporting(&query).await;
        match resolved {
            Some(song) => {
                self.cache.put(
                    CacheKey::from_track_id(&song.id, quality),
                    CacheEntry::Resolved(song.clone()),
                );
                self.cache.put(key, CacheEntry::Resolved(song.clone()));
                Some(song)
            }
            None if answered => {
                info!("所有音源都没有找到 '{}'", query.track_name);
                self.cache.put(key, CacheEntry::NotFound);
                None
            }
            None => {
                warn!("所有音源的搜索都失败了，不记录未找到: '{}'", query.track_name);
                None
            }
        }
    }

    /// 直接解析一个已知的候选（例如由搜索补充产生的条目）。
    async fn resolve_candidate(
        &self,
        key: CacheKey,
        candidate: Song,
        quality: MusicQuality,
    ) -> Option<Song> {
        let provider = self.provider_for(&candidate)?;
        match self.resolve_with(provider.as_ref(), &candidate, quality).await {
            Ok(song) => {
                self.cache.put(key, CacheEntry::Resolved(song.clone()));
                Some(song)
            }
            Err(e) => {
                warn!(provider = provider.name(), "解析候选歌曲失败: {e}");
                None
            }
        }
    }

    async fn resolve_with(
        &self,
        provider: &dyn Provider,
        candidate: &Song,
        quality: MusicQuality,
    ) -> Result<Song> {
        let song = provider.resolve_url(candidate, quality).await?;
        probe::probe_song(&self.http_client, song).await
    }

    /// 在所有音源中搜索并解析最匹配的歌曲。
    ///
    /// 全部搜索任务结束后才开始打分，候选的顺序与任务完成的先后无关。
    #[instrument(skip(self, query), fields(track = %query.track_name))]
    pub async fn resolve(&self, query: &SearchQuery) -> Option<Song> {
        self.resolve_reporting(query).await.0
    }

    /// 同 [`Self::resolve`]，另外返回是否至少有一个音源的搜索成功。
    async fn resolve_reporting(&self, query: &SearchQuery) -> (Option<Song>, bool) {
        let (candidates, answered) = self.collect_candidates(query).await;
        debug!("共收集到 {} 个可接受的候选", candidates.len());

        for candidate in candidates {
            let Some(provider) = self.provider_for(&candidate.song) else {
                continue;
            };
            match self
                .resolve_with(provider.as_ref(), &candidate.song, query.quality)
                .await
            {
                Ok(mut song) => {
                    song.match_score = candidate.score;
                    info!(
                        provider = provider.name(),
                        score = candidate.score,
                        "找到 '{}' - '{}'",
                        song.name,
                        song.artist
                    );
                    return (Some(song), answered);
                }
                Err(e) => warn!(
                    provider = provider.name(),
                    "候选 '{}' 解析失败，尝试下一个: {e}", candidate.song.id
                ),
            }
        }
        (None, answered)
    }

    /// 对每个艺术家组合 × 每个音源发起搜索，打分并按得分从高到低排序。
    ///
    /// 第二个返回值表示是否至少有一次搜索成功。
    async fn collect_candidates(&self, query: &SearchQuery) -> (Vec<ScoredCandidate>, bool) {
        let keywords = query.keywords();
        let tasks = keywords.iter().flat_map(|keyword| {
            self.providers
                .iter()
                .map(move |provider| async move {
                    (provider.name(), provider.search_songs(keyword).await)
                })
        });
        let results = future::join_all(tasks).await;

        let mut candidates: Vec<ScoredCandidate> = Vec::new();
        let mut answered = false;
        for (name, result) in results {
            let songs = match result {
                Ok(songs) => {
                    answered = true;
                    songs
                }
                Err(e) => {
                    warn!(provider = name, "搜索失败，忽略此音源的结果: {e}");
                    continue;
                }
            };
            let list_len = songs.len();
            for (position, song) in songs.into_iter().enumerate() {
                let (score, acceptable) = self.scorer.score(query, &song, position, list_len);
                if !acceptable {
                    continue;
                }
                // 同一首歌可能在多个关键词下出现，保留得分最高的一次
                match candidates.iter_mut().find(|c| c.song.id == song.id) {
                    Some(existing) if existing.score < score => {
                        existing.score = score;
                        existing.song = song;
                    }
                    Some(_) => {}
                    None => candidates.push(ScoredCandidate { song, score }),
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.song.size.cmp(&a.song.size))
        });
        (candidates, answered)
    }

    /// 在所有音源中搜索关键词，每个音源最多保留 `limit` 条结果。
    ///
    /// 结果会以“尚未解析链接”的形式写入缓存的全部音质档位，
    /// 客户端之后请求这些合成 ID 时可以直接解析。
    #[instrument(skip(self))]
    pub async fn search_all_sources(&self, keyword: &str, limit: usize) -> Vec<Song> {
        if limit == 0 {
            return Vec::new();
        }
        let tasks = self
            .providers
            .iter()
            .map(|provider| async move { (provider.name(), provider.search_songs(keyword).await) });

        let mut songs = Vec::new();
        for (name, result) in future::join_all(tasks).await {
            match result {
                Ok(mut list) => {
                    list.truncate(limit);
                    songs.extend(list);
                }
                Err(e) => warn!(provider = name, "补充搜索失败: {e}"),
            }
        }
        for song in &songs {
            self.cache.put_all_qualities(&song.id, song);
        }
        debug!("补充搜索共得到 {} 条结果", songs.len());
        songs
    }
}
