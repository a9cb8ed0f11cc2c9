use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::anchor::{locate_window, Anchor, ScanWindow};
use crate::utils::char_prefix;

/// 命中标题后截取的字符数
pub const NARRATIVE_WINDOW: ScanWindow = ScanWindow::new(0, 5000);
/// 未找到任何标题时，从文首截取的字符数
pub const FALLBACK_CHARS: usize = 10_000;

/// 常见 MD&A 标题，按优先级排列
pub const NARRATIVE_HEADINGS: &[&str] = &[
    "管理层讨论与分析",
    "董事会报告",
    "经营情况讨论",
    "公司业务概要",
    "MD&A",
    "(?i)Management's Discussion and Analysis",
    "(?i)Management Discussion and Analysis",
];

static NARRATIVE_ANCHORS: Lazy<Vec<Anchor>> = Lazy::new(|| {
    NARRATIVE_HEADINGS
        .iter()
        .map(|heading| heading_anchor(heading))
        .collect()
});

/// 标题后可选跟一个半角或全角冒号，撇号兼容 PDF 中常见的弯引号
fn heading_anchor(heading: &str) -> Anchor {
    let (flags, keyword) = match heading.strip_prefix("(?i)") {
        Some(rest) => ("(?i)", rest),
        None => ("", heading),
    };
    let keyword = regex::escape(keyword).replace('\'', "['’]");
    let pattern = format!("{}{}[:：]?", flags, keyword);
    Anchor::Pattern(Regex::new(&pattern).unwrap_or_else(|e| panic!("invalid heading '{}': {}", heading, e)))
}

/// 提取管理层讨论与分析部分
pub fn locate_narrative(text: &str) -> String {
    for (heading, anchor) in NARRATIVE_HEADINGS.iter().zip(NARRATIVE_ANCHORS.iter()) {
        if let Some(window) = locate_window(text, anchor, NARRATIVE_WINDOW) {
            debug!("命中 MD&A 标题: {}", heading);
            return window.trim().to_string();
        }
    }

    debug!("未找到 MD&A 标题，使用文首 {} 字", FALLBACK_CHARS);
    char_prefix(text, FALLBACK_CHARS).to_string()
}
