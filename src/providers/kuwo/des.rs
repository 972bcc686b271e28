//! 酷我音乐移动端接口使用的 DES 变体。
//!
//! **警告**：
//! 该实现不是标准 DES！位序按小端处理，子密钥的循环移位也与标准算法不同，
//! 并且无论明文长度如何，末尾总会多出一个用零补齐的分组。
//! 本实现仅用于生成酷我接口的查询参数，不应用于实际安全目的。

use std::sync::LazyLock;

use rayon::prelude::*;

const BLOCK_SIZE: usize = 8;
const SECRET_KEY: &[u8; 8] = b"ylzsxkwm";

static SUB_KEYS: LazyLock<[u64; 16]> =
    LazyLock::new(|| sub_keys(u64::from_le_bytes(*SECRET_KEY)));

#[rustfmt::skip]
const IP: [i8; 64] = [
    57, 49, 41, 33, 25, 17, 9, 1, 59, 51, 43, 35, 27, 19, 11, 3,
    61, 53, 45, 37, 29, 21, 13, 5, 63, 55, 47, 39, 31, 23, 15, 7,
    56, 48, 40, 32, 24, 16, 8, 0, 58, 50, 42, 34, 26, 18, 10, 2,
    60, 52, 44, 36, 28, 20, 12, 4, 62, 54, 46, 38, 30, 22, 14, 6,
];

#[rustfmt::skip]
const E: [i8; 64] = [
    31, 0, 1, 2, 3, 4, -1, -1, 3, 4, 5, 6, 7, 8, -1, -1,
    7, 8, 9, 10, 11, 12, -1, -1, 11, 12, 13, 14, 15, 16, -1, -1,
    15, 16, 17, 18, 19, 20, -1, -1, 19, 20, 21, 22, 23, 24, -1, -1,
    23, 24, 25, 26, 27, 28, -1, -1, 27, 28, 29, 30, 31, 30, -1, -1,
];

#[rustfmt::skip]
const S_BOX: [[u8; 64]; 8] = [
    [14, 4, 3, 15, 2, 13, 5, 3, 13, 14, 6, 9, 11, 2, 0, 5, 4, 1, 10, 12, 15, 6, 9, 10, 1, 8, 12, 7, 8, 11, 7, 0,
     0, 15, 10, 5, 14, 4, 9, 10, 7, 8, 12, 3, 13, 1, 3, 6, 15, 12, 6, 11, 2, 9, 5, 0, 4, 2, 11, 14, 1, 7, 8, 13],
    [15, 0, 9, 5, 6, 10, 12, 9, 8, 7, 2, 12, 3, 13, 5, 2, 1, 14, 7, 8, 11, 4, 0, 3, 14, 11, 13, 6, 4, 1, 10, 15,
     3, 13, 12, 11, 15, 3, 6, 0, 4, 10, 1, 7, 8, 4, 11, 14, 13, 8, 0, 6, 2, 15, 9, 5, 7, 1, 10, 12, 14, 2, 5, 9],
    [10, 13, 1, 11, 6, 8, 11, 5, 9, 4, 12, 2, 15, 3, 2, 14, 0, 6, 13, 1, 3, 15, 4, 10, 14, 9, 7, 12, 5, 0, 8, 7,
     13, 1, 2, 4, 3, 6, 12, 11, 0, 13, 5, 14, 6, 8, 15, 2, 7, 10, 8, 15, 4, 9, 11, 5, 9, 0, 14, 3, 10, 7, 1, 12],
    [7, 10, 1, 15, 0, 12, 11, 5, 14, 9, 8, 3, 9, 7, 4, 8, 13, 6, 2, 1, 6, 11, 12, 2, 3, 0, 5, 14, 10, 13, 15, 4,
     13, 3, 4, 9, 6, 10, 1, 12, 11, 0, 2, 5, 0, 13, 14, 2, 8, 15, 7, 4, 15, 1, 10, 7, 5, 6, 12, 11, 3, 8, 9, 14],
    [2, 4, 8, 15, 7, 10, 13, 6, 4, 1, 3, 12, 11, 7, 14, 0, 12, 2, 5, 9, 10, 13, 0, 3, 1, 11, 15, 5, 6, 8, 9, 14,
     14, 11, 5, 6, 4, 1, 3, 10, 2, 12, 15, 0, 13, 2, 8, 5, 11, 8, 0, 15, 7, 14, 9, 4, 12, 7, 10, 9, 1, 13, 6, 3],
    [12, 9, 0, 7, 9, 2, 14, 1, 10, 15, 3, 4, 6, 12, 5, 11, 1, 14, 13, 0, 2, 8, 7, 13, 15, 5, 4, 10, 8, 3, 11, 6,
     10, 4, 6, 11, 7, 9, 0, 6, 4, 2, 13, 1, 9, 15, 3, 8, 15, 3, 1, 14, 12, 5, 11, 0, 2, 12, 14, 7, 5, 10, 8, 13],
    [4, 1, 3, 10, 15, 12, 5, 0, 2, 11, 9, 6, 8, 7, 6, 9, 11, 4, 12, 15, 0, 3, 10, 5, 14, 13, 7, 8, 13, 14, 1, 2,
     13, 6, 14, 9, 4, 1, 2, 14, 11, 13, 5, 0, 1, 10, 8, 3, 0, 11, 3, 5, 9, 4, 15, 2, 7, 8, 12, 15, 10, 7, 6, 12],
    [13, 7, 10, 0, 6, 9, 5, 15, 8, 4, 3, 10, 11, 14, 12, 5, 2, 11, 9, 6, 15, 12, 0, 3, 4, 1, 14, 13, 1, 2, 7, 8,
     1, 2, 12, 15, 10, 4, 0, 3, 13, 14, 6, 9, 7, 8, 9, 6, 15, 1, 5, 12, 3, 10, 14, 5, 8, 7, 11, 0, 4, 13, 2, 11],
];

#[rustfmt::skip]
const P: [i8; 32] = [
    15, 6, 19, 20, 28, 11, 27, 16, 0, 14, 22, 25, 4, 17, 30, 9,
    1, 7, 23, 13, 31, 26, 2, 8, 18, 12, 29, 5, 21, 10, 3, 24,
];

#[rustfmt::skip]
const IP_INV: [i8; 64] = [
    39, 7, 47, 15, 55, 23, 63, 31, 38, 6, 46, 14, 54, 22, 62, 30,
    37, 5, 45, 13, 53, 21, 61, 29, 36, 4, 44, 12, 52, 20, 60, 28,
    35, 3, 43, 11, 51, 19, 59, 27, 34, 2, 42, 10, 50, 18, 58, 26,
    33, 1, 41, 9, 49, 17, 57, 25, 32, 0, 40, 8, 48, 16, 56, 24,
];

#[rustfmt::skip]
const PC1: [i8; 56] = [
    56, 48, 40, 32, 24, 16, 8, 0, 57, 49, 41, 33, 25, 17, 9, 1,
    58, 50, 42, 34, 26, 18, 10, 2, 59, 51, 43, 35, 62, 54, 46, 38,
    30, 22, 14, 6, 61, 53, 45, 37, 29, 21, 13, 5, 60, 52, 44, 36,
    28, 20, 12, 4, 27, 19, 11, 3,
];

#[rustfmt::skip]
const PC2: [i8; 64] = [
    13, 16, 10, 23, 0, 4, -1, -1, 2, 27, 14, 5, 20, 9, -1, -1,
    22, 18, 11, 3, 25, 7, -1, -1, 15, 6, 26, 19, 12, 1, -1, -1,
    40, 51, 30, 36, 46, 54, -1, -1, 29, 39, 50, 44, 32, 47, -1, -1,
    43, 48, 38, 55, 33, 52, -1, -1, 45, 41, 49, 35, 28, 31, -1, -1,
];

const LEFT_SHIFTS: [u32; 16] = [1, 1, 2, 2, 2, 2, 2, 2, 1, 2, 2, 2, 2, 2, 2, 1];
const LEFT_SHIFT_MASKS: [u64; 3] = [0x0000_0000, 0x0010_0001, 0x0030_0003];

/// 按置换表重排位：目标的第 `i` 位取自源的第 `table[i]` 位，负数表示该位恒为 0。
fn bit_transform(table: &[i8], src: u64) -> u64 {
    table
        .iter()
        .enumerate()
        .filter(|&(_, &from)| from >= 0 && (src >> from) & 1 == 1)
        .fold(0u64, |dest, (i, _)| dest | (1 << i))
}

fn sub_keys(key: u64) -> [u64; 16] {
    let mut keys = [0u64; 16];
    let mut temp = bit_transform(&PC1, key);
    for (round, sub_key) in keys.iter_mut().enumerate() {
        let shift = LEFT_SHIFTS[round];
        let mask = LEFT_SHIFT_MASKS[shift as usize];
        temp = ((temp & mask) << (28 - shift)) | ((temp & !mask) >> shift);
        *sub_key = bit_transform(&PC2, temp);
    }
    keys
}

fn des64(sub_keys: &[u64; 16], data: u64) -> u64 {
    let out = bit_transform(&IP, data);
    let mut left = out & 0xffff_ffff;
    let mut right = out >> 32;

    for sub_key in sub_keys {
        let expanded = bit_transform(&E, right) ^ sub_key;
        let s_out = (0..8).rev().fold(0u64, |acc, i| {
            let index = ((expanded >> (i * 8)) & 0xff) as usize;
            (acc << 4) | S_BOX[i][index] as u64
        });
        let f = bit_transform(&P, s_out);
        (left, right) = (right, left ^ f);
    }

    // 最后一轮之后交换左右两半
    let joined = ((left << 32) & 0xffff_ffff_0000_0000) | (right & 0xffff_ffff);
    bit_transform(&IP_INV, joined)
}

/// 加密任意长度的数据。
///
/// 输出长度总是 `(len / 8 + 1) * 8`：末尾不足 8 字节的部分（可能为空）用零补齐后单独加密。
pub fn encrypt(data: &[u8]) -> Vec<u8> {
    let block_count = data.len() / BLOCK_SIZE + 1;
    let mut padded = data.to_vec();
    padded.resize(block_count * BLOCK_SIZE, 0);

    let mut encrypted = vec![0u8; padded.len()];
    encrypted
        .par_chunks_mut(BLOCK_SIZE)
        .zip(padded.par_chunks(BLOCK_SIZE))
        .for_each(|(out, chunk)| {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            let cipher = des64(&SUB_KEYS, u64::from_le_bytes(block));
            out.copy_from_slice(&cipher.to_le_bytes());
        });
    encrypted
}
