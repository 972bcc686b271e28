//! 候选歌曲的匹配打分。
//!
//! 名称相似度取两种度量的最大值：
//! - 关键词剥离：把较短的字符串拆成关键词，逐个从较长的字符串中删去，按剩余比例打分；
//! - 归一化编辑距离。
//!
//! 各项权重与阈值都放在 [`ScoringPolicy`] 中，可以通过配置调整。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use crate::model::song::{SearchQuery, Song};

/// 打分策略。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ScoringPolicy {
    /// 歌名相似度的权重。
    pub name_weight: f64,
    /// 艺术家相似度的权重。
    pub artist_weight: f64,
    /// 歌名完全一致时的额外加分。
    pub exact_bonus: f64,
    /// 最低接受分数，低于此分数的候选一律丢弃。
    pub acceptance_floor: f64,
    /// 不扣分的前排窗口上限。
    pub window_cap: usize,
    /// 窗口之外每靠后一位扣除的分数。
    pub rank_penalty: f64,
    /// 候选码率达到请求音质时的额外加分。
    pub quality_bonus: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            name_weight: 0.6,
            artist_weight: 0.4,
            exact_bonus: 0.1,
            acceptance_floor: 0.55,
            window_cap: 5,
            rank_penalty: 0.03,
            quality_bonus: 0.02,
        }
    }
}

/// 关键词的拆分方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    /// 歌名：按括号、书名号与常见标点拆分。
    SongName,
    /// 艺术家：按顿号、逗号、斜杠等拆分。
    Singer,
}

const SONG_SEPARATORS: [&str; 14] = [
    "(", "[", "{", "<", "《", "「", "【", "『", "+", "/", ":", ",", "｡", " ",
];
const SINGER_SEPARATORS: [&str; 6] = ["、", ",", "/", "&", "･", " "];

const PAIRED_SYMBOLS: [(char, char); 8] = [
    ('(', ')'),
    ('[', ']'),
    ('{', '}'),
    ('<', '>'),
    ('《', '》'),
    ('「', '」'),
    ('【', '】'),
    ('『', '』'),
];

/// 全角字符转半角、转大写并去除首尾空白。
pub fn fold_width(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .flat_map(char::to_uppercase)
        .collect::<String>()
        .trim()
        .to_string()
}

/// 把字符串拆成关键词，按长度从长到短排序。
pub fn parse_keywords(data: &str, kind: KeywordKind) -> Vec<String> {
    let separators: &[&str] = match kind {
        KeywordKind::SongName => &SONG_SEPARATORS,
        KeywordKind::Singer => &SINGER_SEPARATORS,
    };
    let mut found = Vec::new();
    collect_keywords(&fold_width(data), separators, &mut found);

    let mut seen = HashSet::new();
    found.retain(|k| seen.insert(k.clone()));
    found.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    found
}

fn collect_keywords(data: &str, separators: &[&str], out: &mut Vec<String>) {
    let mut data = data.trim().to_string();
    if data.is_empty() {
        return;
    }
    for (i, sep) in separators.iter().enumerate() {
        if !data.contains(sep) {
            continue;
        }
        let pair = PAIRED_SYMBOLS
            .iter()
            .find(|(left, _)| sep.starts_with(*left) && sep.chars().count() == 1);
        match pair {
            Some(&pair) => data = strip_paired(&data, pair, &separators[i + 1..], out),
            None => {
                for part in data.split(sep) {
                    collect_keywords(part, separators, out);
                }
                data.clear();
            }
        }
    }
    let rest = data.trim();
    if !rest.is_empty() {
        if rest.eq_ignore_ascii_case("LIVE版") {
            out.push("LIVE".to_string());
        } else {
            out.push(rest.to_string());
        }
    }
}

/// 取出成对括号中的内容作为独立的关键词，并把括号整体从原串中删掉。
///
/// 左右括号数量不一致时不做处理。
fn strip_paired(
    data: &str,
    (left, right): (char, char),
    rest: &[&str],
    out: &mut Vec<String>,
) -> String {
    let mut data = data.trim().to_string();
    let left_count = data.matches(left).count();
    if left_count == 0 || left_count != data.matches(right).count() {
        return data;
    }
    for _ in 0..left_count {
        let Some(l) = data.rfind(left) else { break };
        let Some(r_rel) = data[l..].find(right) else {
            continue;
        };
        let r = l + r_rel;
        let inner = data[l + left.len_utf8()..r].trim().to_string();
        data = format!("{} {}", &data[..l], &data[r + right.len_utf8()..]);
        collect_keywords(&inner, rest, out);
    }
    data
}

/// 关键词剥离得分。
///
/// 把较短一方拆出的关键词逐个（每个只删一次）从较长一方中删掉，
/// 得分为 `1 - 剩余长度 / 原长度`。一个关键词都没有删掉时得 0 分。
pub fn keyword_strip_score(a: &str, b: &str, kind: KeywordKind) -> f64 {
    let a = fold_width(a);
    let b = fold_width(b);
    let (longer, shorter) = if a.chars().count() < b.chars().count() {
        (b, a)
    } else {
        (a, b)
    };
    if longer.is_empty() {
        return 0.0;
    }

    let mut remaining = longer.clone();
    for keyword in parse_keywords(&shorter, kind) {
        if let Some(pos) = remaining.find(&keyword) {
            remaining.replace_range(pos..pos + keyword.len(), "");
        }
    }
    if remaining == longer {
        return 0.0;
    }
    1.0 - remaining.chars().count() as f64 / longer.chars().count() as f64
}

/// 歌名相似度：关键词剥离与编辑距离两者取大。
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let strip = keyword_strip_score(a, b, KeywordKind::SongName);
    let edit = normalized_levenshtein(&fold_width(a), &fold_width(b));
    strip.max(edit)
}

/// 候选歌曲打分器。
#[derive(Debug, Clone, Default)]
pub struct MatchScorer {
    policy: ScoringPolicy,
}

impl MatchScorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// 不扣分的前排窗口大小：列表的前一半（至少一个），不超过 `window_cap`。
    pub fn window(&self, list_len: usize) -> usize {
        (list_len / 2 + 1).min(self.policy.window_cap.max(1))
    }

    /// 计算候选歌曲的得分。
    ///
    /// # 参数
    /// * `query` - 搜索输入。
    /// * `candidate` - 候选歌曲。
    /// * `position` - 候选在其平台结果列表中的位置（从 0 开始）。
    /// * `list_len` - 该结果列表的长度。
    ///
    /// # 返回
    /// `(得分, 是否可接受)`。
    pub fn score(
        &self,
        query: &SearchQuery,
        candidate: &Song,
        position: usize,
        list_len: usize,
    ) -> (f64, bool) {
        let p = &self.policy;

        let name_score = name_similarity(&query.track_name, &candidate.name);
        let artist_score = if query.artists.is_empty() {
            1.0
        } else {
            keyword_strip_score(&query.artist_line(), &candidate.artist, KeywordKind::Singer)
        };

        let mut score = p.name_weight * name_score + p.artist_weight * artist_score;
        if fold_width(&query.track_name) == fold_width(&candidate.name) {
            score += p.exact_bonus;
        }
        let window = self.window(list_len);
        if position >= window {
            score -= p.rank_penalty * (position + 1 - window) as f64;
        }
        if candidate.bitrate > 0 && candidate.bitrate >= query.quality.bitrate() {
            score += p.quality_bonus;
        }

        let score = score.max(0.0);
        (score, name_score > 0.0 && score >= p.acceptance_floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::song::MusicQuality;

    fn candidate(name: &str, artist: &str) -> Song {
        Song {
            name: name.to_string(),
            artist: artist.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_fold_width() {
        assert_eq!(fold_width("  ＡＢＣ（ｌｉｖｅ） "), "ABC(LIVE)");
        assert_eq!(fold_width("晴天\u{3000}"), "晴天");
    }

    #[test]
    fn test_parse_song_keywords() {
        let keywords = parse_keywords("夜曲 (Live版)", KeywordKind::SongName);
        assert_eq!(keywords, vec!["LIVE", "夜曲"]);

        let keywords = parse_keywords("Hello/World", KeywordKind::SongName);
        assert_eq!(keywords, vec!["HELLO", "WORLD"]);
    }

    #[test]
    fn test_parse_singer_keywords() {
        let keywords = parse_keywords("周杰伦、费玉清", KeywordKind::Singer);
        assert_eq!(keywords, vec!["周杰伦", "费玉清"]);
    }

    #[test]
    fn test_keyword_strip_score() {
        assert_eq!(keyword_strip_score("晴天", "晴天", KeywordKind::SongName), 1.0);
        assert_eq!(keyword_strip_score("晴天", "七里香", KeywordKind::SongName), 0.0);
        let partial = keyword_strip_score("晴天", "晴天 (Live)", KeywordKind::SongName);
        assert!(partial > 0.0 && partial < 1.0, "部分匹配的得分应在 0 和 1 之间: {partial}");
    }

    #[test]
    fn test_exact_match_is_accepted() {
        let scorer = MatchScorer::default();
        let query = SearchQuery::new("晴天", vec!["周杰伦".into()], None, MusicQuality::Lossless);
        let (score, ok) = scorer.score(&query, &candidate("晴天", "周杰伦"), 0, 10);
        assert!(ok);
        assert!(score > 1.0, "完全匹配应当得到额外加分: {score}");
    }

    #[test]
    fn test_unrelated_candidate_is_rejected() {
        let scorer = MatchScorer::default();
        let query = SearchQuery::new("晴天", vec!["周杰伦".into()], None, MusicQuality::Lossless);
        let (_, ok) = scorer.score(&query, &candidate("Yesterday", "The Beatles"), 0, 10);
        assert!(!ok);
    }

    #[test]
    fn test_rank_penalty_beyond_window() {
        let scorer = MatchScorer::default();
        assert_eq!(scorer.window(10), 5);
        assert_eq!(scorer.window(3), 2);

        let query = SearchQuery::new("晴天", vec![], None, MusicQuality::Lossless);
        let song = candidate("晴天", "");
        let (top, _) = scorer.score(&query, &song, 0, 10);
        let (inside, _) = scorer.score(&query, &song, 4, 10);
        let (outside, _) = scorer.score(&query, &song, 7, 10);
        assert_eq!(top, inside, "窗口内的位置不应扣分");
        assert!(outside < inside, "窗口外的位置应当扣分");
    }

    #[test]
    fn test_quality_bonus() {
        let scorer = MatchScorer::default();
        let query = SearchQuery::new("晴天", vec![], None, MusicQuality::ExHigh);
        let mut song = candidate("晴天", "");
        let (plain, _) = scorer.score(&query, &song, 0, 1);
        song.bitrate = 320_000;
        let (bonus, _) = scorer.score(&query, &song, 0, 1);
        assert!(bonus > plain);
    }
}
