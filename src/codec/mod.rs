//! 网易云音乐接口报文的加解密与解压缩。
//!
//! EAPI 与 Linux 转发协议都使用 AES-128-ECB + PKCS#7，只是密钥不同。
//! 本实现仅用于处理网易云音乐接口报文，不应用于实际安全目的。

use std::io::Read;

use aes::{Aes128, cipher::generic_array::GenericArray};
use block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, BlockSizeUser, KeyInit};
use ecb::{Decryptor as EcbModeDecryptor, Encryptor as EcbModeEncryptor};
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::{Result, UnblockError},
    model::exchange::SchemeTag,
};

/// EAPI 协议使用的固定 AES 密钥。
pub const EAPI_KEY: &[u8; 16] = b"e82ckenh8dichen8";
/// Linux 转发协议使用的固定 AES 密钥。
pub const LINUX_FORWARD_KEY: &[u8; 16] = b"rFgB&h#%2?^eDg:Q";

/// EAPI 明文中分隔路径、参数与摘要的固定字符串。
pub const EAPI_DELIMITER: &str = "-36cd479b6b5-";

/// 返回协议对应的密钥。网页端协议不加密，返回 `None`。
pub fn key_for(scheme: SchemeTag) -> Option<&'static [u8; 16]> {
    match scheme {
        SchemeTag::Web => None,
        SchemeTag::EApi => Some(EAPI_KEY),
        SchemeTag::LinuxForward => Some(LINUX_FORWARD_KEY),
    }
}

/// AES-128-ECB 加密，PKCS#7 填充。
pub fn aes_ecb_encrypt(data: &[u8], key: &[u8; 16]) -> Result<Vec<u8>> {
    let cipher = EcbModeEncryptor::<Aes128>::new(GenericArray::from_slice(key));

    let block_size = Aes128::block_size();
    let msg_len = data.len();
    let mut buffer = data.to_vec();
    buffer.resize((msg_len / block_size + 1) * block_size, 0);

    let ciphertext = cipher
        .encrypt_padded_mut::<Pkcs7>(&mut buffer, msg_len)
        .map_err(|e| UnblockError::Encryption(format!("AES ECB 加密失败: {e:?}")))?;
    Ok(ciphertext.to_vec())
}

/// AES-128-ECB 解密，去除 PKCS#7 填充。
pub fn aes_ecb_decrypt(data: &[u8], key: &[u8; 16]) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % Aes128::block_size() != 0 {
        return Err(UnblockError::Decryption(format!(
            "密文长度 {} 不是分组长度的整数倍",
            data.len()
        )));
    }
    let cipher = EcbModeDecryptor::<Aes128>::new(GenericArray::from_slice(key));
    let mut buffer = data.to_vec();
    let plaintext = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .map_err(|e| UnblockError::Decryption(format!("AES ECB 解密失败: {e:?}")))?;
    Ok(plaintext.to_vec())
}

/// 解码响应体。
///
/// 先尝试直接解析 JSON（上游偶尔会在加密接口上返回明文），失败后再用密钥解密并重新解析。
/// 此函数没有副作用，失败时调用方可以换一个密钥重试。
///
/// # 返回
/// 成功时返回 `(JSON, 是否经过解密)`，两种方式都失败时返回 `None`。
pub fn decode(bytes: &[u8], key: Option<&[u8; 16]>) -> Option<(Value, bool)> {
    if let Ok(tree) = serde_json::from_slice::<Value>(bytes) {
        return Some((tree, false));
    }
    let key = key?;
    let decrypted = aes_ecb_decrypt(bytes, key)
        .and_then(|plain| Ok(serde_json::from_slice::<Value>(&plain)?));
    match decrypted {
        Ok(tree) => Some((tree, true)),
        Err(e) => {
            debug!("响应体无法解码，将原样放行: {e}");
            None
        }
    }
}

/// 将 JSON 重新编码为响应体。
///
/// 提供密钥时使用与解码相同的模式与填充加密。
pub fn encode(tree: &Value, key: Option<&[u8; 16]>) -> Result<Vec<u8>> {
    let plain = serde_json::to_vec(tree)?;
    match key {
        Some(key) => aes_ecb_encrypt(&plain, key),
        None => Ok(plain),
    }
}

/// 按 `Content-Encoding` 解压响应体。
///
/// 未知或空的编码原样返回。`deflate` 先按 zlib 格式尝试，再按裸 deflate 尝试。
pub fn decompress(bytes: &[u8], content_encoding: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match content_encoding.trim().to_ascii_lowercase().as_str() {
        "gzip" | "x-gzip" => {
            GzDecoder::new(bytes).read_to_end(&mut out)?;
        }
        "deflate" => {
            if ZlibDecoder::new(bytes).read_to_end(&mut out).is_err() {
                out.clear();
                DeflateDecoder::new(bytes).read_to_end(&mut out)?;
            }
        }
        _ => out.extend_from_slice(bytes),
    }
    Ok(out)
}
