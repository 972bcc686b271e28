//! 进程级的歌曲解析结果缓存。
//!
//! 缓存以显式的服务对象存在，通过 `Arc` 在各个交换之间共享。
//! 内部使用分片锁的 `DashMap`，没有过期与淘汰：代理进程的生命周期与客户端会话相同。

use dashmap::DashMap;
use strum::IntoEnumIterator;
use tracing::trace;

use crate::model::song::{MusicQuality, Platform, Song};

/// 缓存键：平台 + 平台内歌曲 ID + 音质。
///
/// 网易云音乐自己的歌曲 ID 使用 `platform: None`。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// 来源平台。
    pub platform: Option<Platform>,
    /// 平台内的歌曲 ID。
    pub track_id: String,
    /// 音质档位。
    pub quality: MusicQuality,
}

impl CacheKey {
    /// 直接构造缓存键。
    pub fn new(platform: Option<Platform>, track_id: impl Into<String>, quality: MusicQuality) -> Self {
        Self {
            platform,
            track_id: track_id.into(),
            quality,
        }
    }

    /// 从客户端可见的歌曲 ID 构造缓存键，合成 ID 会被拆成平台与原生 ID。
    pub fn from_track_id(id: &str, quality: MusicQuality) -> Self {
        match Platform::split_synthetic_id(id) {
            Some((platform, native)) => Self::new(Some(platform), native, quality),
            None => Self::new(None, id, quality),
        }
    }
}

/// 缓存条目。
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// 已解析（或已知）的歌曲。
    Resolved(Song),
    /// 所有音源都没有找到合适的歌曲。
    NotFound,
}

/// 歌曲解析结果缓存。
#[derive(Debug, Default)]
pub struct ResultCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl ResultCache {
    /// 创建一个空缓存。
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取缓存条目。
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// 写入缓存条目，同一个键重复写入是安全的。
    pub fn put(&self, key: CacheKey, entry: CacheEntry) {
        trace!(?key, "写入缓存");
        self.entries.insert(key, entry);
    }

    /// 以同一首歌填充某个 ID 下的全部音质档位。
    pub fn put_all_qualities(&self, track_id: &str, song: &Song) {
        for quality in MusicQuality::iter() {
            self.put(
                CacheKey::from_track_id(track_id, quality),
                CacheEntry::Resolved(song.clone()),
            );
        }
    }

    /// 更新已缓存歌曲的 MD5。
    ///
    /// # 返回
    /// 键存在且为已解析歌曲时返回 `true`。
    pub fn update_checksum(&self, key: &CacheKey, md5: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => match entry.value_mut() {
                CacheEntry::Resolved(song) => {
                    song.md5 = md5.to_string();
                    true
                }
                CacheEntry::NotFound => false,
            },
            None => false,
        }
    }

    /// 缓存中的条目数。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 缓存是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
