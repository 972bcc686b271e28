//! 定义了整个 `netease-unblock` 库的错误类型 `UnblockError`。
//!
//! 注意：库的对外入口（请求检查与响应改写）本身不会返回错误，
//! 这里的错误只在内部流转，最终会被记录日志并降级为“原样放行”。

use std::{io, string::FromUtf8Error};
use thiserror::Error;

/// `netease-unblock` 库的通用错误枚举。
#[derive(Error, Debug)]
pub enum UnblockError {
    /// 网络请求失败 (源自 `reqwest::Error`)
    #[error("网络请求失败: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// JSON 解析失败 (源自 `serde_json::Error`)
    #[error("JSON 解析失败: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// 十六进制解码失败 (源自 `hex::FromHexError`)
    #[error("十六进制解码失败: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Base64 解码失败 (源自 `base64::DecodeError`)
    #[error("Base64 解码失败: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// UTF-8 转换失败 (源自 `string::FromUtf8Error`)
    #[error("UTF-8 转换失败: {0}")]
    FromUtf8(#[from] FromUtf8Error),

    /// I/O 错误 (源自 `io::Error`)
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),

    /// API 返回错误或空数据
    #[error("API 为 `{0}` 返回了错误或空数据")]
    ApiError(String),

    /// 网易云音乐查不到这首歌
    #[error("未找到歌曲: {0}")]
    SongNotFound(String),

    /// 解密失败
    #[error("解密失败: {0}")]
    Decryption(String),

    /// 加密失败
    #[error("加密失败: {0}")]
    Encryption(String),

    /// 更通用的网络层错误
    #[error("网络错误: {0}")]
    Network(String),
}

/// `UnblockError` 的 `Result` 类型别名，方便在函数签名中使用。
pub type Result<T> = std::result::Result<T, UnblockError>;
