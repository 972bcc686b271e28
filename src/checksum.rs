//! 播放链接的 MD5 计算。
//!
//! 下载请求需要同步等待真实的文件摘要；普通播放请求先返回占位摘要，
//! 真实摘要由后台队列计算后写回缓存，供之后的请求使用。

use std::sync::Arc;

use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::Client;
use tokio::{sync::Mutex, task::JoinSet};
use tracing::{debug, instrument, warn};

use crate::{
    cache::{CacheKey, ResultCache},
    error::Result,
};

/// 计算远程文件摘要的接口。
#[async_trait]
pub trait StreamHasher: Send + Sync {
    /// 下载 `url` 指向的完整文件并返回其小写十六进制 MD5。
    async fn md5_of(&self, url: &str) -> Result<String>;
}

/// 基于 `reqwest` 的流式摘要实现，边下载边计算，不缓存文件内容。
#[derive(Debug, Clone)]
pub struct HttpStreamHasher {
    http_client: Client,
}

impl HttpStreamHasher {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl StreamHasher for HttpStreamHasher {
    #[instrument(skip(self))]
    async fn md5_of(&self, url: &str) -> Result<String> {
        let mut response = self
            .http_client
            .get(url)
            .send()
            .await?
            .error_for_status()?;

        let mut hasher = Md5::new();
        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// 占位摘要：链接本身的 MD5。
///
/// 同一个链接总是得到同一个占位值。
pub fn placeholder_md5(url: &str) -> String {
    format!("{:x}", Md5::digest(url.as_bytes()))
}

/// 后台摘要任务队列。
///
/// 任务完成后把结果写回缓存，失败时写入占位摘要。
/// `wait_idle` 会等待当前所有任务结束，测试可以借此确定地观察结果。
pub struct ChecksumQueue {
    hasher: Arc<dyn StreamHasher>,
    cache: Arc<ResultCache>,
    tasks: Mutex<JoinSet<()>>,
}

impl ChecksumQueue {
    pub fn new(hasher: Arc<dyn StreamHasher>, cache: Arc<ResultCache>) -> Self {
        Self {
            hasher,
            cache,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// 同步计算摘要，失败时返回占位摘要。
    pub async fn compute_now(&self, url: &str) -> String {
        match self.hasher.md5_of(url).await {
            Ok(md5) => md5,
            Err(e) => {
                warn!("计算文件摘要失败，改用占位摘要: {e}");
                placeholder_md5(url)
            }
        }
    }

    /// 提交一个后台摘要任务，结果会写入 `keys` 对应的全部缓存条目。
    pub async fn enqueue(&self, keys: Vec<CacheKey>, url: String) {
        let hasher = Arc::clone(&self.hasher);
        let cache = Arc::clone(&self.cache);

        let mut tasks = self.tasks.lock().await;
        // 顺手回收已经结束的任务
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let md5 = match hasher.md5_of(&url).await {
                Ok(md5) => md5,
                Err(e) => {
                    warn!(%url, "后台计算文件摘要失败: {e}");
                    placeholder_md5(&url)
                }
            };
            for key in &keys {
                cache.update_checksum(key, &md5);
            }
            debug!(%url, %md5, "后台摘要已写回缓存");
        });
    }

    /// 等待当前已提交的全部任务结束。
    pub async fn wait_idle(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.tasks.lock().await);
            if pending.is_empty() {
                return;
            }
            while let Some(result) = pending.join_next().await {
                if let Err(e) = result {
                    warn!("后台摘要任务异常退出: {e}");
                }
            }
        }
    }
}
