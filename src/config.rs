//! 负责处理改写引擎的持久化配置。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::{model::song::Platform, search::matcher::ScoringPolicy};

const CONFIG_DIR_NAME: &str = "netease-unblock";
const CONFIG_FILE_NAME: &str = "config.json";

/// 改写引擎的全部开关与参数。
///
/// 每个改写规则都可以单独关闭，缺省值与常见的解锁场景一致。
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct UnblockConfig {
    /// 屏蔽广告请求，并从批量响应中剔除广告数据。
    pub block_ads: bool,
    /// 屏蔽客户端的版本更新提示。
    pub block_update: bool,
    /// 在本地伪造黑胶会员信息。
    pub enable_local_vip: bool,
    /// 解锁音效相关接口。
    pub unlock_sound_effect: bool,
    /// 每个音源追加到搜索结果中的条目上限，`0` 表示关闭搜索补充。
    pub search_limit: usize,
    /// 忽略客户端请求的音质，总是尝试无损。
    pub force_best_quality: bool,
    /// 通过同源隧道地址返回替换后的播放链接。
    pub endpoint: bool,
    /// 启用的音源，顺序即查询顺序。
    pub sources: Vec<Platform>,
    /// 每次对外网络请求的超时时间（秒）。
    pub provider_timeout_secs: u64,
    /// 需要完整会话时直接访问的网易云音乐地址。
    pub upstream: String,
    /// QQ 音乐的 Cookie，提供后可以获取更高音质。
    pub qq_cookie: Option<String>,
    /// 候选歌曲的打分策略。
    pub scoring: ScoringPolicy,
}

impl Default for UnblockConfig {
    fn default() -> Self {
        Self {
            block_ads: true,
            block_update: true,
            enable_local_vip: true,
            unlock_sound_effect: true,
            search_limit: 0,
            force_best_quality: false,
            endpoint: false,
            sources: vec![Platform::KuGou, Platform::KuWo, Platform::MiGu, Platform::QQ],
            provider_timeout_secs: 10,
            upstream: "https://music.163.com".to_string(),
            qq_cookie: None,
            scoring: ScoringPolicy::default(),
        }
    }
}

/// 获取应用配置目录下指定文件的完整路径。
///
/// # 参数
/// * `filename` - 目标配置文件的名称，例如 "config.json"。
pub(crate) fn get_config_file_path(filename: &str) -> Result<PathBuf, std::io::Error> {
    if let Some(mut config_dir) = dirs::config_dir() {
        config_dir.push(CONFIG_DIR_NAME);
        fs::create_dir_all(&config_dir)?;
        config_dir.push(filename);
        Ok(config_dir)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "无法找到用户配置目录",
        ))
    }
}

/// 从文件加载配置。
///
/// 配置文件不存在时返回默认配置，不会创建文件。
pub fn load_config() -> Result<UnblockConfig, Box<dyn std::error::Error>> {
    let config_path = get_config_file_path(CONFIG_FILE_NAME)?;
    match fs::read_to_string(&config_path) {
        Ok(content) => {
            let config: UnblockConfig = serde_json::from_str(&content)?;
            info!("已从 {} 加载配置。", config_path.display());
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("配置文件不存在，将使用默认配置。");
            Ok(UnblockConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// 将配置序列化为 JSON 并保存到文件。
pub fn save_config(config: &UnblockConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = get_config_file_path(CONFIG_FILE_NAME)?;
    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_path, content)?;
    info!("配置已保存。");
    Ok(())
}
