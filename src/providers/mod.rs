//! 备用音源模块
//!
//! 该模块定义了与第三方音乐平台进行交互的核心抽象。

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::{
    config::UnblockConfig,
    error::Result,
    model::song::{MusicQuality, Platform, Song},
};

pub mod kugou;
pub mod kuwo;
pub mod migu;
pub mod qq;

/// 定义了所有备用音源需要实现的通用接口。
#[async_trait]
pub trait Provider: Send + Sync {
    ///
    /// 返回音源的唯一名称。
    ///
    /// 一个全小写的静态字符串，例如 `"kuwo"`, `"qq"`。
    ///
    fn name(&self) -> &'static str;

    /// 音源对应的平台。
    fn platform(&self) -> Platform;

    ///
    /// 根据关键词（歌名 + 艺术家）搜索歌曲。
    ///
    /// # 参数
    /// * `keyword` - 搜索关键词。
    ///
    /// # 返回
    /// 按平台自身的相关度排序的候选歌曲列表，`id` 为合成 ID。
    ///
    async fn search_songs(&self, keyword: &str) -> Result<Vec<Song>>;

    ///
    /// 为一首候选歌曲解析播放链接。
    ///
    /// # 参数
    /// * `song` - 由 `search_songs` 返回的候选歌曲（需要其中的原始字段）。
    /// * `quality` - 期望的音质。
    ///
    /// # 返回
    /// 填好 `url`（以及平台能给出的 `bitrate`）的歌曲。平台拒绝提供链接时返回错误。
    ///
    async fn resolve_url(&self, song: &Song, quality: MusicQuality) -> Result<Song>;
}

/// 构建所有音源共用的 HTTP 客户端。
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// 按配置中的顺序构建启用的音源。
pub fn build_providers(config: &UnblockConfig, http_client: &Client) -> Vec<Arc<dyn Provider>> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
    for platform in &config.sources {
        if providers.iter().any(|p| p.platform() == *platform) {
            warn!("音源 {platform} 重复配置，已忽略");
            continue;
        }
        let provider: Arc<dyn Provider> = match platform {
            Platform::KuGou => Arc::new(kugou::KugouProvider::new(http_client.clone())),
            Platform::KuWo => Arc::new(kuwo::KuwoProvider::new(http_client.clone())),
            Platform::MiGu => Arc::new(migu::MiguProvider::new(http_client.clone())),
            Platform::QQ => Arc::new(qq::QqProvider::new(
                http_client.clone(),
                config.qq_cookie.clone(),
            )),
        };
        providers.push(provider);
    }
    providers
}

/// 把字符串或数字形式的 ID 统一转换为字符串。
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
