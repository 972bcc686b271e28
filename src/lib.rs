//! # Netease Unblock RS
//!
//! 网易云音乐接口流量的解密、改写与灰色歌曲替换引擎。
//!
//! 本库不负责网络层的拦截（TLS 终止、证书等），调用方在拿到明文的 HTTP 请求与响应后，
//! 分别交给 [`UnblockHelper::inspect_request`] 与 [`UnblockHelper::rewrite_response`] 处理。
//!
//! ## 主要功能
//!
//! - **协议识别**: 识别网页端、EAPI 与 Linux 转发三种线路协议，还原接口路径与参数。
//! - **响应改写**: 屏蔽广告与版本更新、本地会员、解锁音效、统一音质标记。
//! - **灰色歌曲替换**: 在酷狗、酷我、咪咕与 QQ 音乐中搜索替代歌曲，替换播放链接。
//! - **搜索补充**: 把备用音源的搜索结果插入网易云音乐的搜索结果。
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use netease_unblock_rs::{RequestVerdict, UnblockHelper, config::UnblockConfig};
//! use reqwest::{Method, header::HeaderMap};
//!
//! async {
//!     let helper = UnblockHelper::new(UnblockConfig::default()).unwrap();
//!
//!     let mut request_headers = HeaderMap::new();
//!     let body = b"params=...";
//!     let verdict = helper.inspect_request(
//!         &Method::POST,
//!         "/eapi/song/enhance/player/url/v1",
//!         &mut request_headers,
//!         body,
//!     );
//!     let RequestVerdict::Forward(mut exchange) = verdict else {
//!         return; // 广告请求，直接丢弃
//!     };
//!
//!     // ……把请求转发给上游，拿到响应……
//!     let mut response_headers = HeaderMap::new();
//!     let upstream_body: Vec<u8> = Vec::new();
//!     let body = helper
//!         .rewrite_response(&mut exchange, 200, &mut response_headers, &upstream_body)
//!         .await;
//!     println!("返回给客户端 {} 字节", body.len());
//! };
//! ```
pub mod cache;
pub mod checksum;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod model;
pub mod providers;
pub mod rewriter;
pub mod search;

use std::sync::Arc;

use reqwest::{
    Method,
    header::{self, HeaderMap},
};
use tracing::{debug, info, warn};

pub use crate::error::{Result, UnblockError};

use crate::{
    cache::ResultCache,
    checksum::{ChecksumQueue, HttpStreamHasher, StreamHasher},
    config::UnblockConfig,
    model::exchange::{PendingSearch, ProxiedExchange},
    providers::{Provider, build_http_client, build_providers},
    rewriter::{
        ResponseRewriter,
        session::{HttpNeteaseSession, NeteaseSession},
    },
    search::{NeteaseTrackInfo, SongResolver, TrackInfoSource, matcher::MatchScorer},
};

// ==========================================================
//  顶层 API
// ==========================================================

/// 请求检查的结论。
#[derive(Debug)]
pub enum RequestVerdict {
    /// 转发给上游，响应回来后用这个交换调用 [`UnblockHelper::rewrite_response`]。
    Forward(ProxiedExchange),
    /// 广告或日志上报请求，调用方应直接丢弃。
    Block,
}

/// 改写引擎的顶层入口，持有缓存、音源与改写器。
///
/// 所有方法都不会返回错误：内部失败会记录日志，并退化为原样放行。
pub struct UnblockHelper {
    config: Arc<UnblockConfig>,
    resolver: Arc<SongResolver>,
    checksums: Arc<ChecksumQueue>,
    rewriter: ResponseRewriter,
}

impl UnblockHelper {
    /// 按配置构建全部组件。
    ///
    /// 只有 HTTP 客户端构建失败时才会返回错误。
    pub fn new(config: UnblockConfig) -> Result<Self> {
        let http_client = build_http_client(config.provider_timeout_secs)?;
        let providers = build_providers(&config, &http_client);
        let track_info = Arc::new(NeteaseTrackInfo::new(
            http_client.clone(),
            config.upstream.clone(),
        ));
        let session = Arc::new(HttpNeteaseSession::new(
            http_client.clone(),
            config.upstream.clone(),
        ));
        // 计算摘要需要下载整个文件，不使用音源的超时设置
        let hasher = Arc::new(HttpStreamHasher::new(reqwest::Client::new()));

        info!(
            "已启用 {} 个音源: {:?}",
            providers.len(),
            providers.iter().map(|p| p.name()).collect::<Vec<_>>()
        );
        Ok(Self::with_components(
            config,
            providers,
            track_info,
            session,
            hasher,
            http_client,
        ))
    }

    /// 使用自定义组件构建，测试中可以传入模拟的音源与会话。
    pub fn with_components(
        config: UnblockConfig,
        providers: Vec<Arc<dyn Provider>>,
        track_info: Arc<dyn TrackInfoSource>,
        session: Arc<dyn NeteaseSession>,
        hasher: Arc<dyn StreamHasher>,
        http_client: reqwest::Client,
    ) -> Self {
        let config = Arc::new(config);
        let cache = Arc::new(ResultCache::new());
        let resolver = Arc::new(SongResolver::new(
            providers,
            Arc::clone(&cache),
            MatchScorer::new(config.scoring.clone()),
            track_info,
            http_client,
        ));
        let checksums = Arc::new(ChecksumQueue::new(hasher, cache));
        let rewriter = ResponseRewriter::new(
            Arc::clone(&config),
            Arc::clone(&resolver),
            Arc::clone(&checksums),
            session,
        );
        Self {
            config,
            resolver,
            checksums,
            rewriter,
        }
    }

    /// 当前配置。
    pub fn config(&self) -> &UnblockConfig {
        &self.config
    }

    /// 歌曲解析器，也可以单独用来查找歌曲。
    pub fn resolver(&self) -> &Arc<SongResolver> {
        &self.resolver
    }

    /// 检查一个即将发往上游的请求。
    ///
    /// 会就地清理请求头（去掉重试计数、固定客户端 IP）。
    /// 对第一页的搜索请求，会在后台提前开始备用音源搜索。
    ///
    /// # 参数
    /// * `method` - 请求方法。
    /// * `url` - 完整 URL 或以 `/` 开头的路径。
    /// * `headers` - 请求头，会被修改。
    /// * `body` - 请求体。
    pub fn inspect_request(
        &self,
        method: &Method,
        url: &str,
        headers: &mut HeaderMap,
        body: &[u8],
    ) -> RequestVerdict {
        if self.config.block_ads && classifier::is_ad_request(url) {
            info!(url, "已屏蔽广告请求");
            return RequestVerdict::Block;
        }
        classifier::scrub_headers(headers);
        let mut exchange =
            classifier::classify(method, url, headers, body, self.config.force_best_quality);
        debug!(path = %exchange.path, scheme = ?exchange.scheme, quality = %exchange.quality, "请求已分类");

        if self.config.search_limit > 0 {
            exchange.pending_search = self.start_search(&exchange);
        }
        RequestVerdict::Forward(exchange)
    }

    fn start_search(&self, exchange: &ProxiedExchange) -> Option<PendingSearch> {
        let (search_path, keyword) = classifier::extract_search_keyword(exchange)?;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("当前不在 Tokio 运行时中，跳过备用音源搜索");
            return None;
        };
        let resolver = Arc::clone(&self.resolver);
        let limit = self.config.search_limit;
        debug!(keyword, "提前开始备用音源搜索");
        let task = runtime.spawn(async move { resolver.search_all_sources(&keyword, limit).await });
        Some(PendingSearch { search_path, task })
    }

    /// 改写上游返回的响应。
    ///
    /// 只处理状态码为 200、且接口在改写表中的响应。JSON 没有被修改时原样返回 `body`；
    /// 被修改时按原协议重新编码，并移除 `Content-Encoding`、`Content-Length` 与 `Transfer-Encoding`。
    pub async fn rewrite_response(
        &self,
        exchange: &mut ProxiedExchange,
        status: u16,
        headers: &mut HeaderMap,
        body: &[u8],
    ) -> Vec<u8> {
        if status != 200 || body.is_empty() || classifier::path_kind(&exchange.path).is_none() {
            return body.to_vec();
        }

        let content_encoding = headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        // 压缩头与实际内容不符时按未压缩的原始字节继续解码
        let plain = match codec::decompress(body, &content_encoding) {
            Ok(plain) => plain,
            Err(e) => {
                debug!("响应解压失败，按原始字节解码: {e}");
                body.to_vec()
            }
        };

        let key = codec::key_for(exchange.scheme);
        let Some((tree, encrypted)) = codec::decode(&plain, key) else {
            return body.to_vec();
        };
        exchange.is_encrypted = encrypted;
        exchange.decoded_body = Some(tree);

        if !self.rewriter.rewrite(exchange).await {
            return body.to_vec();
        }
        let Some(tree) = exchange.decoded_body.as_ref() else {
            return body.to_vec();
        };
        let key = if exchange.is_encrypted { key } else { None };
        match codec::encode(tree, key) {
            Ok(encoded) => {
                for name in [
                    header::CONTENT_ENCODING,
                    header::CONTENT_LENGTH,
                    header::TRANSFER_ENCODING,
                ] {
                    headers.remove(name);
                }
                encoded
            }
            Err(e) => {
                warn!("重新编码响应失败，原样放行: {e}");
                body.to_vec()
            }
        }
    }

    /// 等待所有后台摘要任务结束。
    pub async fn wait_checksums(&self) {
        self.checksums.wait_idle().await;
    }
}
