//! 咪咕音乐播放接口的请求加密。
//!
//! 请求数据使用 OpenSSL 兼容的 `Salted__` 格式（AES-256-CBC，密钥与 IV 由 MD5 链式派生），
//! 随机口令再用固定的 RSA 公钥加密后作为 `secKey` 一起发送。

use aes::{Aes256, cipher::generic_array::GenericArray};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use block_padding::Pkcs7;
use cbc::Encryptor as CbcModeEncryptor;
use cipher::{BlockEncryptMut, BlockSizeUser, KeyIvInit};
use md5::{Digest, Md5};
use rand::Rng;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey, pkcs8::DecodePublicKey, rand_core::OsRng};

use crate::error::{Result, UnblockError};

const PUBLIC_KEY: &str = r"-----BEGIN PUBLIC KEY-----
MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQC8asrfSaoOb4je+DSmKdriQJKW
VJ2oDZrs3wi5W67m3LwTB9QVR+cE3XWU21Nx+YBxS0yun8wDcjgQvYt625ZCcgin
2ro/eOkNyUOTBIbuj9CvMnhUYiR61lC1f1IGbrSYYimqBVSjpifVufxtx/I3exRe
ZosTByYp4Xwpb1+WAQIDAQAB
-----END PUBLIC KEY-----";

const SALTED_MAGIC: &[u8; 8] = b"Salted__";
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// 加密后的请求参数，两个字段都是 Base64 字符串（尚未做 URL 编码）。
#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    pub data: String,
    pub sec_key: String,
}

/// 按 OpenSSL `EVP_BytesToKey`（MD5、单轮）的方式派生密钥与 IV。
pub fn derive_key_iv(password: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let repeat = (KEY_LEN + IV_LEN * 8).div_ceil(32);
    let mut material = Vec::with_capacity(repeat * 16);
    let mut last: Vec<u8> = Vec::new();
    for _ in 0..repeat {
        let mut hasher = Md5::new();
        hasher.update(&last);
        hasher.update(password);
        hasher.update(salt);
        last = hasher.finalize().to_vec();
        material.extend_from_slice(&last);
    }

    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&material[..KEY_LEN]);
    iv.copy_from_slice(&material[KEY_LEN..KEY_LEN + IV_LEN]);
    (key, iv)
}

/// AES-256-CBC 加密，PKCS#7 填充，输出带 `Salted__` 头。
pub fn salted_encrypt(plain: &[u8], password: &[u8], salt: &[u8; 8]) -> Result<Vec<u8>> {
    let (key, iv) = derive_key_iv(password, salt);
    let cipher =
        CbcModeEncryptor::<Aes256>::new(GenericArray::from_slice(&key), GenericArray::from_slice(&iv));

    let block_size = Aes256::block_size();
    let msg_len = plain.len();
    let mut buffer = plain.to_vec();
    buffer.resize((msg_len / block_size + 1) * block_size, 0);
    let ciphertext = cipher
        .encrypt_padded_mut::<Pkcs7>(&mut buffer, msg_len)
        .map_err(|e| UnblockError::Encryption(format!("AES CBC 模式加密失败: {e:?}")))?;

    let mut out = Vec::with_capacity(16 + ciphertext.len());
    out.extend_from_slice(SALTED_MAGIC);
    out.extend_from_slice(salt);
    out.extend_from_slice(ciphertext);
    Ok(out)
}

fn rsa_encrypt(content: &[u8]) -> Result<Vec<u8>> {
    let public_key = RsaPublicKey::from_public_key_pem(PUBLIC_KEY.trim())
        .map_err(|e| UnblockError::Encryption(format!("RSA 公钥解析失败: {e}")))?;
    public_key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, content)
        .map_err(|e| UnblockError::Encryption(format!("RSA 加密失败: {e}")))
}

/// 加密一段请求 JSON。
///
/// 口令是 32 个随机字节的十六进制文本，盐是 8 个随机字节。
pub fn encrypt_request(text: &str) -> Result<EncryptedPayload> {
    let mut rng = rand::rng();
    let mut random = [0u8; 32];
    rng.fill(&mut random);
    let password = hex::encode(random);
    let mut salt = [0u8; 8];
    rng.fill(&mut salt);

    let data = salted_encrypt(text.as_bytes(), password.as_bytes(), &salt)?;
    let sec_key = rsa_encrypt(password.as_bytes())?;
    Ok(EncryptedPayload {
        data: STANDARD.encode(data),
        sec_key: STANDARD.encode(sec_key),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockDecryptMut;

    #[test]
    fn test_derive_known_vector() {
        let password = b"d8e28215ed6573e0fd5eb8b8ae8062542589e96f669bee6503af003c63cdfbd4";
        let salt = [0xde, 0xfc, 0x9f, 0x26, 0x29, 0xdd, 0xec, 0x37];
        let (key, iv) = derive_key_iv(password, &salt);
        assert_eq!(
            hex::encode(key),
            "afb3ac50cd1d2381585fa7bcbd8cbe02560fade7d17e2eb114816f27ab7b6a75"
        );
        assert_eq!(hex::encode(iv), "fb1089b01332f2a7025149ffbc16f040");
    }

    #[test]
    fn test_salted_layout_decrypts() {
        let salt = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let plain = br#"{"copyrightId":"60084600553","type":3}"#;
        let out = salted_encrypt(plain, b"secret", &salt).unwrap();
        assert_eq!(&out[..8], SALTED_MAGIC);
        assert_eq!(&out[8..16], &salt);
        assert_eq!((out.len() - 16) % 16, 0);

        let (key, iv) = derive_key_iv(b"secret", &salt);
        let decryptor = cbc::Decryptor::<Aes256>::new(
            GenericArray::from_slice(&key),
            GenericArray::from_slice(&iv),
        );
        let mut buffer = out[16..].to_vec();
        let decrypted = decryptor.decrypt_padded_mut::<Pkcs7>(&mut buffer).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_encrypt_request_produces_base64_fields() {
        let payload = encrypt_request(r#"{"copyrightId":"1","type":1}"#).unwrap();
        let sec_key = STANDARD.decode(&payload.sec_key).unwrap();
        assert_eq!(sec_key.len(), 128, "1024 位 RSA 的密文应为 128 字节");
        let data = STANDARD.decode(&payload.data).unwrap();
        assert!(data.starts_with(SALTED_MAGIC));
    }
}
