//! 替换后播放链接的最终形式。

use serde_json::{Map, Value};

const TUNNEL_PATH: &str = "://music.163.com/unblockmusic/";

/// 根据客户端平台决定播放链接的协议，并在开启隧道时把链接包进固定的同源地址。
#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointBuilder {
    enabled: bool,
}

impl EndpointBuilder {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// PC 客户端使用 `http`，其他客户端使用 `https`。
    ///
    /// 平台信息可能直接出现在 `os` 参数中，也可能嵌套在 `header` 参数里
    /// （JSON 字符串或对象两种形式都有）。
    pub fn protocol(params: &Map<String, Value>) -> &'static str {
        let header_os = match params.get("header") {
            Some(Value::String(s)) => serde_json::from_str::<Value>(s)
                .ok()
                .and_then(|h| h.get("os").and_then(Value::as_str).map(str::to_string)),
            Some(Value::Object(h)) => h.get("os").and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        let direct_os = params.get("os").and_then(Value::as_str);

        let is_pc = header_os
            .as_deref()
            .into_iter()
            .chain(direct_os)
            .any(|os| os.to_ascii_lowercase().contains("pc"));
        if is_pc { "http" } else { "https" }
    }

    /// 隧道入口地址，例如 `https://music.163.com/unblockmusic/`。
    pub fn tunnel_base(params: &Map<String, Value>) -> String {
        format!("{}{TUNNEL_PATH}", Self::protocol(params))
    }

    /// 生成最终返回给客户端的播放链接。
    pub fn finalize(&self, url: &str, params: &Map<String, Value>) -> String {
        if self.enabled {
            format!("{}{url}", Self::tunnel_base(params))
        } else {
            url.to_string()
        }
    }
}
