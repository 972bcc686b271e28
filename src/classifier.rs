//! 请求分类：识别线路协议，还原逻辑接口路径与请求参数。
//!
//! 解密或解析失败不会报错，交换的路径保持原样，后续的改写规则自然不会命中。

use std::sync::LazyLock;

use regex::Regex;
use reqwest::{
    Method, Url,
    header::{HeaderMap, HeaderValue},
};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::{
    codec::{self, EAPI_DELIMITER},
    error::{Result, UnblockError},
    model::{
        exchange::{ProxiedExchange, SchemeTag, SearchKind},
        song::MusicQuality,
    },
};

/// 所有请求都会带上的伪造客户端 IP。
pub const FAKE_CLIENT_IP: &str = "118.66.66.66";

const EAPI_BODY_PREFIX: &str = "params=";
const LINUX_FORWARD_BODY_PREFIX: &str = "eparams=";
const LINUX_FORWARD_PATH: &str = "/api/linux/forward";

const HOST_PREFIXES: [&str; 2] = ["https://music.163.com", "http://music.163.com"];

/// 广告与日志上报相关的路径片段。
const AD_PATH_MARKERS: [&str; 3] = ["api/ad/", "api/clientlog/upload", "api/feedback/weblog"];

static TRAILING_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\d*$").unwrap());
static QUERY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?.+$").unwrap());
static WEAPI_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/weapi/").unwrap());
static ZERO_PADDING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%0+$").unwrap());

/// 可改写接口的类别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// 普通的可改写接口。
    Rewritable,
    /// 搜索接口，结果中可以追加备用音源的歌曲。
    Search(SearchKind),
}

/// 查询接口是否需要改写。
///
/// 只有表中列出的接口才会进入响应改写流程。
pub fn path_kind(path: &str) -> Option<PathKind> {
    let kind = match path {
        "/batch" | "/api/v1/search/get" | "/api/v1/search/song/get"
        | "/api/search/complex/get/v2" => PathKind::Search(SearchKind::Mobile),
        "/api/cloudsearch/pc" => PathKind::Search(SearchKind::Pc),
        "/api/v3/playlist/detail"
        | "/api/v3/song/detail"
        | "/api/v6/playlist/detail"
        | "/api/album/play"
        | "/api/artist/privilege"
        | "/api/album/privilege"
        | "/api/v1/artist"
        | "/api/v1/artist/songs"
        | "/api/artist/top/song"
        | "/api/v1/album"
        | "/api/album/v3/detail"
        | "/api/playlist/privilege"
        | "/api/song/enhance/player/url"
        | "/api/song/enhance/player/url/v1"
        | "/api/song/enhance/download/url"
        | "/api/batch"
        | "/api/search/complex/get"
        | "/api/v1/playlist/manipulate/tracks"
        | "/api/playlist/manipulate/tracks"
        | "/api/song/like"
        | "/api/v1/play/record"
        | "/api/playlist/v4/detail"
        | "/api/v1/radio/get"
        | "/api/v1/discovery/recommend/songs"
        | "/api/cloudsearch/get/web"
        | "/api/song/enhance/privilege"
        | "/api/osx/version"
        | "/api/pc/upgrade/get"
        | "/api/usertool/sound/mobile/promote"
        | "/api/usertool/sound/mobile/theme"
        | "/api/usertool/sound/mobile/animationList"
        | "/api/usertool/sound/mobile/all"
        | "/api/usertool/sound/mobile/detail" => PathKind::Rewritable,
        _ => return None,
    };
    Some(kind)
}

/// 判断请求是否为广告或日志上报。
pub fn is_ad_request(path: &str) -> bool {
    AD_PATH_MARKERS.iter().any(|marker| path.contains(marker))
}

/// 清理请求头：去掉重试计数，并固定客户端 IP。
pub fn scrub_headers(headers: &mut HeaderMap) {
    headers.remove("x-napm-retry");
    headers.insert("x-real-ip", HeaderValue::from_static(FAKE_CLIENT_IP));
}

/// 对一个请求进行分类。
///
/// # 参数
/// * `method` - 请求方法。
/// * `url` - 完整 URL 或以 `/` 开头的路径（可带查询串）。
/// * `headers` - 请求头，会被复制到交换中。
/// * `body` - 请求体。
/// * `force_best_quality` - 为 `true` 时忽略客户端请求的音质。
pub fn classify(
    method: &Method,
    url: &str,
    headers: &HeaderMap,
    body: &[u8],
    force_best_quality: bool,
) -> ProxiedExchange {
    let (raw_path, query) = split_url(url);
    let mut exchange = ProxiedExchange {
        path: raw_path.clone(),
        request_headers: headers.clone(),
        ..Default::default()
    };

    let is_post = *method == Method::POST;
    if is_post && raw_path.contains(LINUX_FORWARD_PATH) {
        exchange.scheme = SchemeTag::LinuxForward;
        match decode_linux_forward_body(body) {
            Ok((path, params, padding)) => {
                exchange.path = normalize_decoded_path(&path);
                exchange.raw_params = params;
                exchange.body_padding = padding;
            }
            Err(e) => debug!("Linux 转发请求体解码失败，将原样放行: {e}"),
        }
    } else if is_post && raw_path.starts_with("/eapi/") {
        exchange.scheme = SchemeTag::EApi;
        match decode_eapi_body(body) {
            Ok((path, params, padding)) => {
                exchange.path = normalize_decoded_path(&path);
                exchange.raw_params = params;
                exchange.body_padding = padding;
            }
            Err(e) => debug!("EAPI 请求体解码失败，将原样放行: {e}"),
        }
    } else if raw_path.starts_with("/weapi/") || raw_path.starts_with("/api/") {
        exchange.scheme = SchemeTag::Web;
        exchange.path = normalize_web_path(&raw_path);
        exchange.raw_params = query;
    }

    exchange.quality = derive_quality(&exchange.raw_params, force_best_quality);
    trace!(path = %exchange.path, scheme = ?exchange.scheme, "请求分类完成");
    exchange
}

/// 拆出路径（含查询串）与查询参数。
fn split_url(url: &str) -> (String, Map<String, Value>) {
    match Url::parse(url) {
        Ok(parsed) => {
            let query = parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect();
            let path = match parsed.query() {
                Some(q) => format!("{}?{q}", parsed.path()),
                None => parsed.path().to_string(),
            };
            (path, query)
        }
        Err(_) => {
            let query = url
                .split_once('?')
                .map(|(_, q)| {
                    q.split('&')
                        .filter_map(|pair| pair.split_once('='))
                        .map(|(k, v)| {
                            let v = urlencoding::decode(v)
                                .map(|d| d.into_owned())
                                .unwrap_or_else(|_| v.to_string());
                            (k.to_string(), Value::String(v))
                        })
                        .collect()
                })
                .unwrap_or_default();
            (url.to_string(), query)
        }
    }
}

/// 网页端路径归一化：`/weapi/` 换成 `/api/`，去掉查询串与末尾的数字段。
pub fn normalize_web_path(path: &str) -> String {
    let path = WEAPI_PREFIX_RE.replace(path, "/api/");
    let path = QUERY_RE.replace(&path, "");
    TRAILING_ID_RE.replace(&path, "").into_owned()
}

/// 解密得到的路径归一化：去掉域名前缀与末尾的数字段。
pub fn normalize_decoded_path(path: &str) -> String {
    let mut path = path;
    for prefix in HOST_PREFIXES {
        if let Some(stripped) = path.strip_prefix(prefix) {
            path = stripped;
            break;
        }
    }
    TRAILING_ID_RE.replace(path, "").into_owned()
}

/// 从 `<prefix><HEX>[%000...]` 形式的请求体中取出密文与末尾的填充。
fn split_hex_body<'a>(body: &'a str, prefix: &str) -> Result<(&'a str, Vec<u8>)> {
    let payload = body
        .strip_prefix(prefix)
        .ok_or_else(|| UnblockError::Decryption(format!("请求体缺少 `{prefix}` 前缀")))?;
    let padding_len = ZERO_PADDING_RE
        .find(payload)
        .map_or(0, |m| m.end() - m.start());
    let (hex_part, padding) = payload.split_at(payload.len() - padding_len);
    Ok((hex_part, padding.as_bytes().to_vec()))
}

fn decrypt_hex_body(body: &[u8], prefix: &str, key: &[u8; 16]) -> Result<(String, Vec<u8>)> {
    let body = std::str::from_utf8(body)
        .map_err(|e| UnblockError::Decryption(format!("请求体不是合法的 UTF-8: {e}")))?;
    let (hex_part, padding) = split_hex_body(body.trim(), prefix)?;
    let ciphertext = hex::decode(hex_part)?;
    let plain = codec::aes_ecb_decrypt(&ciphertext, key)?;
    Ok((String::from_utf8(plain)?, padding))
}

/// 解码 EAPI 请求体，明文格式为 `路径-36cd479b6b5-参数JSON[-36cd479b6b5-摘要]`。
pub fn decode_eapi_body(body: &[u8]) -> Result<(String, Map<String, Value>, Vec<u8>)> {
    let (plain, padding) = decrypt_hex_body(body, EAPI_BODY_PREFIX, codec::EAPI_KEY)?;
    let mut parts = plain.split(EAPI_DELIMITER);
    let path = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| UnblockError::Decryption("EAPI 明文中缺少路径".into()))?
        .to_string();
    let params = match parts.next() {
        Some(json) => match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => map,
            _ => Map::new(),
        },
        None => Map::new(),
    };
    Ok((path, params, padding))
}

/// 解码 Linux 转发请求体，明文是 `{url, params}` 形式的 JSON。
pub fn decode_linux_forward_body(body: &[u8]) -> Result<(String, Map<String, Value>, Vec<u8>)> {
    let (plain, padding) =
        decrypt_hex_body(body, LINUX_FORWARD_BODY_PREFIX, codec::LINUX_FORWARD_KEY)?;
    let envelope: Value = serde_json::from_str(&plain)?;
    let url = envelope
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| UnblockError::Decryption("Linux 转发请求中缺少 url".into()))?
        .to_string();
    let params = match envelope.get("params") {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        _ => Map::new(),
    };
    Ok((url, params, padding))
}

/// 根据请求参数推断客户端想要的音质。
pub fn derive_quality(params: &Map<String, Value>, force_best_quality: bool) -> MusicQuality {
    if force_best_quality {
        return MusicQuality::Lossless;
    }
    if let Some(level) = params.get("level").and_then(Value::as_str) {
        match level {
            "standard" => return MusicQuality::Standard,
            "higher" => return MusicQuality::Higher,
            "exhigh" => return MusicQuality::ExHigh,
            "lossless" | "hires" | "jyeffect" | "sky" | "jymaster" => {
                return MusicQuality::Lossless;
            }
            _ => {}
        }
    }
    let br = match params.get("br") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    br.and_then(MusicQuality::from_bitrate).unwrap_or_default()
}

/// 从搜索请求中取出关键词。
///
/// 只有第一页（`offset == 0`）的搜索才会触发备用音源搜索。
///
/// # 返回
/// `(结果所在的接口路径, 关键词)`，不是搜索请求或不是第一页时返回 `None`。
pub fn extract_search_keyword(exchange: &ProxiedExchange) -> Option<(String, String)> {
    if path_kind(&exchange.path) != Some(PathKind::Search(SearchKind::Mobile)) {
        return None;
    }
    let params = &exchange.raw_params;

    let (search_path, search_params) =
        if params.contains_key("s") || params.contains_key("keyword") {
            (exchange.path.clone(), params.clone())
        } else {
            params.iter().find_map(|(key, value)| {
                if path_kind(key) != Some(PathKind::Search(SearchKind::Pc)) {
                    return None;
                }
                match serde_json::from_str::<Value>(value.as_str()?) {
                    Ok(Value::Object(map)) => Some((key.clone(), map)),
                    _ => None,
                }
            })?
        };

    let offset = match search_params.get("offset") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    };
    if offset != 0 {
        return None;
    }

    ["s", "keyword"]
        .iter()
        .find_map(|key| search_params.get(*key).and_then(Value::as_str))
        .filter(|kw| !kw.trim().is_empty())
        .map(|kw| (search_path, kw.to_string()))
}
