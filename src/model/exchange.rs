//! 一次被代理的 HTTP 交换（请求 + 响应）在处理期间携带的状态。

use reqwest::header::HeaderMap;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::model::song::{MusicQuality, Song};

/// 客户端使用的线路协议。
///
/// 协议唯一决定了请求和响应使用的密钥，两者不会混用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemeTag {
    /// 网页端协议，`/weapi/` 或 `/api/` 前缀，不做加解密。
    #[default]
    Web,
    /// `/eapi/` 协议，请求体为十六进制密文。
    EApi,
    /// Linux 客户端的 `/api/linux/forward` 转发协议。
    LinuxForward,
}

/// 搜索接口的类别，决定了关键词与结果列表的位置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// 移动端搜索，关键词在 `s` 或 `keyword` 参数中。
    Mobile,
    /// PC 端搜索，参数以 JSON 字符串的形式嵌套在接口路径键下。
    Pc,
}

/// 在请求阶段提前发起的备用音源搜索。
#[derive(Debug)]
pub struct PendingSearch {
    /// 触发搜索的接口路径。
    pub search_path: String,
    /// 后台搜索任务。
    pub task: JoinHandle<Vec<Song>>,
}

/// 一次被代理的 HTTP 交换。
///
/// 每个交换由处理它的任务独占，生命周期与一次请求/响应相同。
#[derive(Debug, Default)]
pub struct ProxiedExchange {
    /// 归一化后的逻辑接口路径，例如 `/api/song/enhance/player/url`。
    pub path: String,
    /// 请求参数。
    pub raw_params: Map<String, Value>,
    /// 响应体是否经过加密（在改写响应时确定）。
    pub is_encrypted: bool,
    /// 线路协议。
    pub scheme: SchemeTag,
    /// 解码后的响应 JSON。
    pub decoded_body: Option<Value>,
    /// 客户端请求的音质。
    pub quality: MusicQuality,
    /// 原始请求头，重放需要完整会话的请求时使用。
    pub request_headers: HeaderMap,
    /// 请求体末尾的全零填充，与有效密文分开保存。
    pub body_padding: Vec<u8>,
    /// 提前发起的搜索任务。
    pub pending_search: Option<PendingSearch>,
}

impl ProxiedExchange {
    /// 是否为网页端协议。
    pub fn is_web(&self) -> bool {
        self.scheme == SchemeTag::Web
    }

    /// 是否为下载接口。
    pub fn is_download(&self) -> bool {
        self.path.contains("download")
    }

    /// 取字符串参数，数字参数会被转换为字符串。
    pub fn param_str(&self, key: &str) -> Option<String> {
        match self.raw_params.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
