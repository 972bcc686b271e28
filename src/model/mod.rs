//! 数据模型：歌曲、音质与被代理的 HTTP 交换。

pub mod exchange;
pub mod song;
