//! 收藏与红心的重放
//!
//! 部分客户端以内部鉴权调用歌单修改与红心接口，对替换进来的歌曲会返回 401/512。
//! 这里用原请求头通过完整会话重新执行同样的操作，并用其结果替换响应。

use async_trait::async_trait;
use reqwest::{
    Client,
    header::{self, HeaderMap, HeaderValue},
};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use super::ResponseRewriter;
use crate::{
    error::{Result, UnblockError},
    model::exchange::ProxiedExchange,
    providers::id_string,
};

const MANIPULATE_PATH: &str = "/api/playlist/manipulate/tracks";
const USER_INFO_PATH: &str = "/api/v1/user/info";

/// 以用户完整会话访问网易云音乐接口。
#[async_trait]
pub trait NeteaseSession: Send + Sync {
    /// 发送 GET 请求，`path` 可以带查询串。
    async fn get(&self, path: &str, headers: &HeaderMap) -> Result<Value>;

    /// 发送表单 POST 请求。
    async fn post_form(&self, path: &str, body: String, headers: &HeaderMap) -> Result<Value>;
}

/// 基于 `reqwest` 的会话实现，直接访问上游地址。
#[derive(Debug, Clone)]
pub struct HttpNeteaseSession {
    http_client: Client,
    upstream: String,
}

impl HttpNeteaseSession {
    pub fn new(http_client: Client, upstream: impl Into<String>) -> Self {
        Self {
            http_client,
            upstream: upstream.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.upstream.trim_end_matches('/'))
    }

    /// 复制原请求头，去掉与原请求体绑定的字段。
    fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
        let mut forwarded = headers.clone();
        for name in [
            header::HOST,
            header::CONTENT_LENGTH,
            header::CONTENT_TYPE,
            header::ACCEPT_ENCODING,
            header::TRANSFER_ENCODING,
        ] {
            forwarded.remove(name);
        }
        forwarded
    }
}

#[async_trait]
impl NeteaseSession for HttpNeteaseSession {
    #[instrument(skip(self, headers))]
    async fn get(&self, path: &str, headers: &HeaderMap) -> Result<Value> {
        Ok(self
            .http_client
            .get(self.url(path))
            .headers(Self::forwarded_headers(headers))
            .send()
            .await?
            .json()
            .await?)
    }

    #[instrument(skip(self, headers))]
    async fn post_form(&self, path: &str, body: String, headers: &HeaderMap) -> Result<Value> {
        Ok(self
            .http_client
            .post(self.url(path))
            .headers(Self::forwarded_headers(headers))
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .body(body)
            .send()
            .await?
            .json()
            .await?)
    }
}

/// 从 `trackIds` 参数中取出第一首歌的 ID。参数可能是 JSON 字符串，也可能是数组。
fn first_track_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(s).ok()? {
            Value::Array(ids) => ids.first().and_then(id_string),
            _ => None,
        },
        Value::Array(ids) => ids.first().and_then(id_string),
        _ => None,
    }
}

fn manipulate_body(track_id: &str, pid: &str, op: &str) -> String {
    format!("trackIds=[{track_id},{track_id}]&pid={pid}&op={op}")
}

impl ResponseRewriter {
    /// 重放歌单增删操作。
    pub(super) async fn try_collect(&self, exchange: &ProxiedExchange, tree: &mut Value) -> bool {
        let Some(track_id) = exchange.raw_params.get("trackIds").and_then(first_track_id) else {
            return false;
        };
        let (Some(pid), Some(op)) = (exchange.param_str("pid"), exchange.param_str("op")) else {
            return false;
        };

        let body = manipulate_body(&track_id, &pid, &op);
        match self
            .session
            .post_form(MANIPULATE_PATH, body, &exchange.request_headers)
            .await
        {
            Ok(result) => {
                info!(track_id, pid, op, "已通过完整会话重放歌单操作");
                *tree = result;
                true
            }
            Err(e) => {
                debug!("重放歌单操作失败: {e}");
                false
            }
        }
    }

    /// 重放红心操作：把歌曲加入用户的第一个歌单（“我喜欢的音乐”）。
    pub(super) async fn try_like(&self, exchange: &ProxiedExchange, tree: &mut Value) -> bool {
        let Some(track_id) = exchange.param_str("trackId") else {
            return false;
        };
        match self.replay_like(&track_id, &exchange.request_headers).await {
            Ok(Some(playlist_id)) => {
                info!(track_id, "已通过完整会话重放红心操作");
                *tree = json!({ "code": 200, "playlistId": playlist_id });
                true
            }
            Ok(None) => false,
            Err(e) => {
                debug!("重放红心操作失败: {e}");
                false
            }
        }
    }

    async fn replay_like(&self, track_id: &str, headers: &HeaderMap) -> Result<Option<Value>> {
        let user = self.session.get(USER_INFO_PATH, headers).await?;
        let user_id = user
            .pointer("/userPoint/userId")
            .and_then(id_string)
            .ok_or_else(|| UnblockError::ApiError(USER_INFO_PATH.into()))?;

        let playlists = self
            .session
            .get(&format!("/api/user/playlist?uid={user_id}&limit=1"), headers)
            .await?;
        let playlist_id = playlists
            .pointer("/playlist/0/id")
            .cloned()
            .ok_or_else(|| UnblockError::ApiError("/api/user/playlist".into()))?;
        let pid = id_string(&playlist_id)
            .ok_or_else(|| UnblockError::ApiError("/api/user/playlist".into()))?;

        let result = self
            .session
            .post_form(MANIPULATE_PATH, manipulate_body(track_id, &pid, "add"), headers)
            .await?;
        let code = super::response_code(&result);
        Ok((code == "200" || code == "502").then_some(playlist_id))
    }
}
