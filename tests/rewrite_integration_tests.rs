use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use flate2::{Compression, write::GzEncoder};
use netease_unblock_rs::{
    RequestVerdict, Result, UnblockError, UnblockHelper,
    checksum::StreamHasher,
    codec::{self, EAPI_DELIMITER, EAPI_KEY, LINUX_FORWARD_KEY},
    config::UnblockConfig,
    model::{
        exchange::{ProxiedExchange, SchemeTag},
        song::{MusicQuality, Platform, Song},
    },
    providers::Provider,
    rewriter::session::NeteaseSession,
    search::{TrackInfo, TrackInfoSource},
};
use reqwest::{
    Method,
    header::{self, HeaderMap, HeaderValue},
};
use serde_json::{Value, json};

const FIXED_MD5: &str = "fedcba9876543210fedcba9876543210";

struct StaticProvider {
    songs: Vec<Song>,
    search_calls: AtomicUsize,
}

impl StaticProvider {
    fn new(songs: Vec<Song>) -> Arc<Self> {
        Arc::new(Self {
            songs,
            search_calls: AtomicUsize::new(0),
        })
    }

    fn searches(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    fn platform(&self) -> Platform {
        Platform::KuWo
    }

    async fn search_songs(&self, _keyword: &str) -> Result<Vec<Song>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.songs.clone())
    }

    async fn resolve_url(&self, song: &Song, _quality: MusicQuality) -> Result<Song> {
        let mut resolved = song.clone();
        resolved.url = format!("http://other.example/{}.flac", song.id);
        resolved.bitrate = 999_000;
        resolved.size = 4096;
        Ok(resolved)
    }
}

struct StaticTrackInfo;

#[async_trait]
impl TrackInfoSource for StaticTrackInfo {
    async fn track_info(&self, track_id: &str) -> Result<TrackInfo> {
        if track_id == "404" {
            return Err(UnblockError::SongNotFound(track_id.to_string()));
        }
        Ok(TrackInfo {
            name: "晴天".to_string(),
            artists: vec!["周杰伦".to_string()],
            album: Some("叶惠美".to_string()),
        })
    }
}

struct OfflineSession;

#[async_trait]
impl NeteaseSession for OfflineSession {
    async fn get(&self, path: &str, _headers: &HeaderMap) -> Result<Value> {
        Err(UnblockError::Network(format!("离线测试不访问 {path}")))
    }

    async fn post_form(&self, path: &str, _body: String, _headers: &HeaderMap) -> Result<Value> {
        Err(UnblockError::Network(format!("离线测试不访问 {path}")))
    }
}

struct FixedHasher;

#[async_trait]
impl StreamHasher for FixedHasher {
    async fn md5_of(&self, _url: &str) -> Result<String> {
        Ok(FIXED_MD5.to_string())
    }
}

fn candidate(native_id: &str) -> Song {
    Song {
        id: Platform::KuWo.synthetic_id(native_id),
        name: "晴天".to_string(),
        artist: "周杰伦".to_string(),
        album_name: "叶惠美".to_string(),
        source: Some(Platform::KuWo),
        ..Default::default()
    }
}

fn helper_with(config: UnblockConfig, provider: Arc<StaticProvider>) -> UnblockHelper {
    UnblockHelper::with_components(
        config,
        vec![provider],
        Arc::new(StaticTrackInfo),
        Arc::new(OfflineSession),
        Arc::new(FixedHasher),
        reqwest::Client::new(),
    )
}

fn encrypted_body(prefix: &str, plain: &str, key: &[u8; 16]) -> Vec<u8> {
    let ciphertext = codec::aes_ecb_encrypt(plain.as_bytes(), key).unwrap();
    format!("{prefix}{}", hex::encode_upper(ciphertext)).into_bytes()
}

fn eapi_request(path: &str, params: &Value) -> Vec<u8> {
    let plain = format!("{path}{EAPI_DELIMITER}{params}{EAPI_DELIMITER}0123abcd");
    encrypted_body("params=", &plain, EAPI_KEY)
}

fn forward(verdict: RequestVerdict) -> ProxiedExchange {
    match verdict {
        RequestVerdict::Forward(exchange) => exchange,
        RequestVerdict::Block => panic!("请求不应被屏蔽"),
    }
}

#[test_log::test(tokio::test)]
async fn test_eapi_grey_track_is_unlocked_end_to_end() {
    let provider = StaticProvider::new(vec![candidate("42")]);
    let helper = helper_with(UnblockConfig::default(), provider.clone());

    let request = eapi_request(
        "/api/song/enhance/player/url/v1",
        &json!({ "ids": "[186016]", "level": "exhigh" }),
    );
    let mut headers = HeaderMap::new();
    headers.insert("x-napm-retry", HeaderValue::from_static("2"));
    let mut exchange = forward(helper.inspect_request(
        &Method::POST,
        "https://interface.music.163.com/eapi/song/enhance/player/url/v1",
        &mut headers,
        &request,
    ));
    assert_eq!(exchange.scheme, SchemeTag::EApi);
    assert_eq!(exchange.path, "/api/song/enhance/player/url/v1");
    assert_eq!(exchange.quality, MusicQuality::ExHigh);
    assert!(headers.get("x-napm-retry").is_none(), "重试计数头应被移除");
    assert_eq!(headers["x-real-ip"], "118.66.66.66");

    let upstream = json!({
        "code": 200,
        "data": [{
            "id": 186016,
            "url": null,
            "br": 0,
            "fee": 1,
            "freeTrialInfo": { "start": 0, "end": 30 }
        }]
    });
    let upstream_body = codec::encode(&upstream, Some(EAPI_KEY)).unwrap();
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(upstream_body.len()));

    let body = helper
        .rewrite_response(&mut exchange, 200, &mut response_headers, &upstream_body)
        .await;
    assert!(exchange.is_encrypted, "上游响应是密文");
    assert!(
        response_headers.get(header::CONTENT_LENGTH).is_none(),
        "改写后应移除 Content-Length"
    );

    let plain = codec::aes_ecb_decrypt(&body, EAPI_KEY).unwrap();
    let tree: Value = serde_json::from_slice(&plain).unwrap();
    let node = &tree["data"][0];
    assert_eq!(node["url"], "http://other.example/9000142.flac");
    assert_eq!(node["fee"], 8);
    assert!(node["freeTrialInfo"].is_null(), "试听信息应被清除");
    assert_eq!(node["type"], "flac");
    assert_eq!(node["br"], 999000);
    assert_eq!(node["size"], 4096);
    assert_eq!(node["code"], 200);

    helper.wait_checksums().await;
    let cached = helper
        .resolver()
        .find("186016", MusicQuality::ExHigh)
        .await
        .unwrap();
    assert_eq!(cached.md5, FIXED_MD5, "后台摘要应写回缓存");
    assert_eq!(provider.searches(), 2, "第二次查找应命中缓存");
}

#[tokio::test]
async fn test_second_grey_request_is_served_from_cache() {
    let provider = StaticProvider::new(vec![candidate("42")]);
    let helper = helper_with(UnblockConfig::default(), provider.clone());

    let upstream = serde_json::to_vec(&json!({ "data": [{ "id": 186016, "url": null }] })).unwrap();
    let mut first_searches = 0;
    for round in 0..2 {
        let mut exchange = forward(helper.inspect_request(
            &Method::GET,
            "https://music.163.com/api/song/enhance/player/url?ids=[186016]&br=320000",
            &mut HeaderMap::new(),
            b"",
        ));
        let body = helper
            .rewrite_response(&mut exchange, 200, &mut HeaderMap::new(), &upstream)
            .await;
        let tree: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(tree["data"][0]["fee"], 8);
        if round == 0 {
            first_searches = provider.searches();
            assert!(first_searches > 0);
        }
    }
    assert_eq!(provider.searches(), first_searches, "命中缓存后不应再次调用音源");
}

#[tokio::test]
async fn test_ad_request_is_blocked_and_batch_ads_are_emptied() {
    let helper = helper_with(UnblockConfig::default(), StaticProvider::new(vec![]));

    let verdict = helper.inspect_request(
        &Method::POST,
        "https://music.163.com/api/ad/get",
        &mut HeaderMap::new(),
        b"",
    );
    assert!(matches!(verdict, RequestVerdict::Block), "广告请求应被屏蔽");

    let mut exchange = forward(helper.inspect_request(
        &Method::POST,
        "https://music.163.com/api/batch",
        &mut HeaderMap::new(),
        b"",
    ));
    assert_eq!(exchange.path, "/api/batch");

    let upstream = serde_json::to_vec(&json!({
        "code": 200,
        "/api/ad/get": { "code": 200, "ads": [{ "id": 1 }] },
        "/api/v1/user/detail": { "code": 200 }
    }))
    .unwrap();
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(upstream.len()));
    let body = helper
        .rewrite_response(&mut exchange, 200, &mut headers, &upstream)
        .await;

    let tree: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(tree["/api/ad/get"], json!({}));
    assert_eq!(tree["/api/v1/user/detail"], json!({ "code": 200 }));
    assert!(!exchange.is_encrypted, "网页端响应不加密");
    assert!(headers.get(header::CONTENT_LENGTH).is_none());
}

#[tokio::test]
async fn test_unmodified_response_passes_through_byte_for_byte() {
    let helper = helper_with(UnblockConfig::default(), StaticProvider::new(vec![]));

    // 保留空格，重新序列化后一定不同
    let upstream = br#"{ "code": 200, "songs": [ { "id": 1, "name": "x" } ] }"#.to_vec();
    let mut exchange = forward(helper.inspect_request(
        &Method::GET,
        "https://music.163.com/api/v3/song/detail",
        &mut HeaderMap::new(),
        b"",
    ));
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(upstream.len()));

    let body = helper
        .rewrite_response(&mut exchange, 200, &mut headers, &upstream)
        .await;
    assert_eq!(body, upstream);
    assert!(headers.get(header::CONTENT_LENGTH).is_some(), "未修改时响应头保持不变");
}

#[tokio::test]
async fn test_unlisted_paths_and_errors_pass_through() {
    let helper = helper_with(UnblockConfig::default(), StaticProvider::new(vec![]));
    let grey = serde_json::to_vec(&json!({ "data": [{ "id": 1, "url": null }] })).unwrap();

    let mut unlisted = forward(helper.inspect_request(
        &Method::GET,
        "https://music.163.com/api/some/other/url",
        &mut HeaderMap::new(),
        b"",
    ));
    let body = helper
        .rewrite_response(&mut unlisted, 200, &mut HeaderMap::new(), &grey)
        .await;
    assert_eq!(body, grey, "不在改写表中的接口原样放行");
    assert!(unlisted.decoded_body.is_none());

    let mut failed = forward(helper.inspect_request(
        &Method::GET,
        "https://music.163.com/api/song/enhance/player/url",
        &mut HeaderMap::new(),
        b"",
    ));
    let body = helper
        .rewrite_response(&mut failed, 502, &mut HeaderMap::new(), &grey)
        .await;
    assert_eq!(body, grey, "非 200 响应原样放行");

    let garbage = b"\x00\x01not json at all".to_vec();
    let body = helper
        .rewrite_response(&mut failed, 200, &mut HeaderMap::new(), &garbage)
        .await;
    assert_eq!(body, garbage, "无法解码的响应原样放行");
}

#[tokio::test]
async fn test_gzip_response_is_decompressed_before_rewrite() {
    let provider = StaticProvider::new(vec![candidate("7")]);
    let helper = helper_with(UnblockConfig::default(), provider);

    let plain = serde_json::to_vec(&json!({ "data": { "id": 186016, "url": null } })).unwrap();
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&plain).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut exchange = forward(helper.inspect_request(
        &Method::GET,
        "https://music.163.com/api/song/enhance/download/url?id=186016&br=999000",
        &mut HeaderMap::new(),
        b"",
    ));
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));

    let body = helper
        .rewrite_response(&mut exchange, 200, &mut headers, &compressed)
        .await;
    assert!(headers.get(header::CONTENT_ENCODING).is_none(), "改写后的响应不再压缩");
    let tree: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(tree["data"]["md5"], FIXED_MD5, "下载接口同步计算摘要");
    assert_eq!(tree["data"]["url"], "http://other.example/900017.flac");
}

#[tokio::test]
async fn test_mislabelled_gzip_response_is_still_rewritten() {
    let helper = helper_with(UnblockConfig::default(), StaticProvider::new(vec![]));

    let mut exchange = forward(helper.inspect_request(
        &Method::POST,
        "https://music.163.com/api/batch",
        &mut HeaderMap::new(),
        b"",
    ));
    // 声明了 gzip，实际内容却是明文
    let upstream = br#"{"/api/ad/get":{"code":200,"ads":[{"id":1}]}}"#.to_vec();
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));

    let body = helper
        .rewrite_response(&mut exchange, 200, &mut headers, &upstream)
        .await;
    let tree: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(tree["/api/ad/get"], json!({}), "解压失败时应按原始字节继续改写");
    assert!(headers.get(header::CONTENT_ENCODING).is_none(), "改写后应移除压缩头");
}

#[test]
fn test_linux_forward_request_decoding_is_deterministic() {
    let helper = helper_with(UnblockConfig::default(), StaticProvider::new(vec![]));
    let envelope = json!({
        "method": "POST",
        "url": "https://music.163.com/api/song/enhance/player/url",
        "params": { "ids": "[186016]", "br": 999000 }
    });
    let body = encrypted_body("eparams=", &envelope.to_string(), LINUX_FORWARD_KEY);
    let mut padded = body.clone();
    padded.extend_from_slice(b"%0000");

    let classify = |body: &[u8]| {
        forward(helper.inspect_request(
            &Method::POST,
            "https://music.163.com/api/linux/forward",
            &mut HeaderMap::new(),
            body,
        ))
    };
    let first = classify(&padded);
    let second = classify(&padded);

    assert_eq!(first.scheme, SchemeTag::LinuxForward);
    assert_eq!(first.path, "/api/song/enhance/player/url");
    assert_eq!(first.quality, MusicQuality::Lossless);
    assert_eq!(first.body_padding, b"%0000".to_vec(), "末尾填充应与密文分开保存");
    assert_eq!(first.path, second.path);
    assert_eq!(first.raw_params, second.raw_params);
    assert_eq!(first.quality, second.quality);

    let unpadded = classify(&body);
    assert_eq!(unpadded.raw_params, first.raw_params);
    assert!(unpadded.body_padding.is_empty());
}

#[tokio::test]
async fn test_search_results_are_augmented_from_other_sources() {
    let provider = StaticProvider::new(vec![candidate("42"), candidate("43")]);
    let config = UnblockConfig {
        search_limit: 1,
        ..Default::default()
    };
    let helper = helper_with(config, provider.clone());

    let mut exchange = forward(helper.inspect_request(
        &Method::GET,
        "https://music.163.com/api/v1/search/get?s=%E6%99%B4%E5%A4%A9&offset=0",
        &mut HeaderMap::new(),
        b"",
    ));
    assert!(exchange.pending_search.is_some(), "第一页搜索应提前发起补充搜索");

    let upstream = serde_json::to_vec(&json!({
        "code": 200,
        "result": {
            "songs": [{
                "id": 186016,
                "name": "晴天",
                "ar": [{ "id": 6452, "name": "周杰伦" }],
                "al": { "id": 18905, "name": "叶惠美" }
            }]
        }
    }))
    .unwrap();
    let body = helper
        .rewrite_response(&mut exchange, 200, &mut HeaderMap::new(), &upstream)
        .await;
    let tree: Value = serde_json::from_slice(&body).unwrap();
    let songs = tree["result"]["songs"].as_array().unwrap();
    assert_eq!(songs.len(), 2, "每个音源最多补充 search_limit 条");
    assert_eq!(songs[0]["id"], 9000142i64);
    assert_eq!(songs[0]["alia"], json!(["来自酷我音乐"]));
    assert_eq!(songs[1]["id"], 186016);

    // 补充结果已写入缓存，请求合成 ID 时不再重新搜索
    let searches = provider.searches();
    let song = helper
        .resolver()
        .find("9000142", MusicQuality::Standard)
        .await
        .unwrap();
    assert_eq!(song.url, "http://other.example/9000142.flac");
    assert_eq!(provider.searches(), searches);
}

#[tokio::test]
async fn test_second_page_search_is_not_augmented() {
    let provider = StaticProvider::new(vec![candidate("42")]);
    let config = UnblockConfig {
        search_limit: 3,
        ..Default::default()
    };
    let helper = helper_with(config, provider.clone());

    let exchange = forward(helper.inspect_request(
        &Method::GET,
        "https://music.163.com/api/v1/search/get?s=abc&offset=30",
        &mut HeaderMap::new(),
        b"",
    ));
    assert!(exchange.pending_search.is_none());
    assert_eq!(provider.searches(), 0);
}

#[tokio::test]
async fn test_quality_flags_are_normalized_on_detail_responses() {
    let helper = helper_with(UnblockConfig::default(), StaticProvider::new(vec![]));
    let mut exchange = forward(helper.inspect_request(
        &Method::GET,
        "https://music.163.com/api/v3/song/detail",
        &mut HeaderMap::new(),
        b"",
    ));
    let upstream = serde_json::to_vec(&json!({
        "songs": [{ "id": 1 }],
        "privileges": [{ "id": 1, "st": -200, "subp": 0, "pl": 0, "dl": 0 }]
    }))
    .unwrap();
    let body = helper
        .rewrite_response(&mut exchange, 200, &mut HeaderMap::new(), &upstream)
        .await;
    let tree: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        tree["privileges"][0],
        json!({ "id": 1, "st": 0, "subp": 1, "pl": 320000, "dl": 320000 })
    );
}

#[tokio::test]
async fn test_unknown_track_metadata_leaves_grey_song_alone() {
    let provider = StaticProvider::new(vec![candidate("42")]);
    let helper = helper_with(UnblockConfig::default(), provider.clone());
    let upstream = serde_json::to_vec(&json!({ "data": [{ "id": 404, "url": null }] })).unwrap();

    let mut exchange = forward(helper.inspect_request(
        &Method::GET,
        "https://music.163.com/api/song/enhance/player/url?ids=[404]",
        &mut HeaderMap::new(),
        b"",
    ));
    let body = helper
        .rewrite_response(&mut exchange, 200, &mut HeaderMap::new(), &upstream)
        .await;
    assert_eq!(body, upstream);
    assert_eq!(provider.searches(), 0, "拿不到元数据时不搜索");
}
