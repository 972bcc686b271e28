//! 对解析出的播放链接做一次小范围的探测，补齐文件大小、码率与 MD5。

use reqwest::{Client, header};
use tracing::{debug, instrument};

use crate::{
    error::{Result, UnblockError},
    model::song::Song,
};

const PROBE_RANGE: &str = "bytes=0-8191";
const PROBE_LEN: usize = 8192;

/// 无损音频在码率表中的标记值 (kbps)。
const LOSSLESS_MARKER: u64 = 999;

/// MPEG 音频帧头的码率表，按 `[版本][层][码率索引]` 排列，单位 kbps。
/// 版本 1（保留值）没有对应的表。
const MPEG_V2_TABLE: [[u64; 16]; 3] = [
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 500],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 500],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 500],
];
const MPEG_V1_TABLE: [[u64; 16]; 3] = [
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 500],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 500],
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 500],
];

/// 是否需要探测。
///
/// QQ 音乐的链接即使信息齐全也要探测一次，用来拿到服务端给出的 MD5。
pub fn needs_probe(song: &Song) -> bool {
    if song.url.is_empty() {
        return false;
    }
    if !song.md5.is_empty() && song.bitrate > 0 && song.size > 0 {
        return false;
    }
    !(song.bitrate > 0 && song.size > 0 && !song.url.contains("qq.com"))
}

/// 探测播放链接。
///
/// # 返回
/// 补齐信息后的歌曲。网络错误时原样返回；服务器返回非 2xx 时说明链接不可用，返回错误。
#[instrument(skip(client, song), fields(url = %song.url))]
pub async fn probe_song(client: &Client, mut song: Song) -> Result<Song> {
    if !needs_probe(&song) {
        return Ok(song);
    }

    let response = match client
        .get(&song.url)
        .header(header::RANGE, PROBE_RANGE)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            debug!("探测请求失败，保留现有信息: {e}");
            return Ok(song);
        }
    };
    if !response.status().is_success() {
        return Err(UnblockError::ApiError(format!(
            "播放链接不可用，状态码 {}",
            response.status()
        )));
    }

    let headers = response.headers();
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    if song.url.contains("qq.com")
        && let Some(md5) = header_str("server-md5")
    {
        song.md5 = md5;
    }
    if song.size == 0 {
        song.size = parse_total_size(
            header_str("content-range").as_deref(),
            header_str("content-length").as_deref(),
        );
    }

    let full_probe = response.content_length() == Some(PROBE_LEN as u64);
    if song.bitrate == 0 && full_probe {
        let body = response.bytes().await?;
        let kbps = decode_bitrate(&body);
        if kbps == LOSSLESS_MARKER || (kbps > 0 && kbps < 500) {
            song.bitrate = kbps * 1000;
        }
    }
    Ok(song)
}

/// 从 `Content-Range`（取 `/` 之后的总长度）或 `Content-Length` 中读出文件大小。
pub fn parse_total_size(content_range: Option<&str>, content_length: Option<&str>) -> u64 {
    match content_range {
        Some(range) => range
            .rsplit('/')
            .next()
            .and_then(|total| total.trim().parse().ok())
            .unwrap_or(0),
        None => content_length
            .and_then(|len| len.trim().parse().ok())
            .unwrap_or(0),
    }
}

/// 从音频文件开头的数据中识别码率 (kbps)。
///
/// `fLaC` 文件返回 999；MP3 文件会跳过 ID3 标签后寻找第一个帧头；无法识别时返回 0。
pub fn decode_bitrate(data: &[u8]) -> u64 {
    if data.len() >= 4 && data[..4].eq_ignore_ascii_case(b"fLaC") {
        return LOSSLESS_MARKER;
    }

    let mut pointer = 0usize;
    if data.len() >= 10 && data[..3].eq_ignore_ascii_case(b"ID3") {
        // ID3v2 标签长度为 4 字节的同步安全整数
        let size = data[6..10]
            .iter()
            .fold(0usize, |acc, b| (acc << 7) | (b & 0x7f) as usize);
        pointer = 10 + size;
    }

    let Some(offset) = data.get(pointer..).and_then(|rest| rest.iter().position(|&b| b == 0xff))
    else {
        return 0;
    };
    pointer += offset;
    let Some(frame) = data.get(pointer..pointer + 4) else {
        return 0;
    };

    let (h1, h2) = (frame[1], frame[2]);
    let is_frame_header = (h1 >> 5) & 0x7 == 0x7
        && (h1 >> 1) & 0x3 != 0
        && (h2 >> 4) & 0xf != 0xf
        && (h2 >> 2) & 0x3 != 0x3;
    if !is_frame_header {
        return 0;
    }

    let version = (h1 >> 3) & 0x3;
    let layer = ((h1 >> 1) & 0x3) as usize;
    let index = (h2 >> 4) as usize;
    match version {
        3 => MPEG_V1_TABLE[layer - 1][index],
        0 | 2 => MPEG_V2_TABLE[layer - 1][index],
        _ => 0,
    }
}
