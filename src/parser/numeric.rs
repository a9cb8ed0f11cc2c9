use once_cell::sync::Lazy;
use regex::Regex;

/// 数字语法：整数部分可带千分位逗号，可选小数部分
pub const NUMBER_PATTERN: &str = r"[0-9]+(?:,[0-9]{3})*(?:\.[0-9]+)?";

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(NUMBER_PATTERN).expect("Failed to compile NUMBER_RE"));

static WHOLE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{NUMBER_PATTERN}$")).expect("Failed to compile WHOLE_NUMBER_RE"));

static PERCENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"({NUMBER_PATTERN})\s*[%％]")).expect("Failed to compile PERCENT_RE")
});

/// 在窗口中查找第一个数字并解析为 f64
///
/// 千分位分组不完整的数字（如 `1,2345`）视为格式错误，返回 None 而不是截断后的值。
pub fn scan(window: &str) -> Option<f64> {
    let mat = NUMBER_RE.find(window)?;
    if runs_on(&window[mat.end()..]) {
        return None;
    }
    parse_number(mat.as_str())
}

/// 查找紧跟百分号（半角或全角）的第一个数字
pub fn scan_percent(window: &str) -> Option<f64> {
    let caps = PERCENT_RE.captures(window)?;
    parse_number(caps.get(1)?.as_str())
}

/// 解析 `text[start..end]` 处已定位的数字，之后若仍紧跟数字则视为格式错误
///
/// 起点落在某个数字中间时回退到该数字的开头，整段仍须符合数字语法。
pub fn parse_at(text: &str, start: usize, end: usize) -> Option<f64> {
    if runs_on(text.get(end..)?) {
        return None;
    }
    let token = text.get(token_start(text, start)?..end)?;
    if !WHOLE_NUMBER_RE.is_match(token) {
        return None;
    }
    parse_number(token)
}

/// 去掉千分位逗号后解析
pub fn parse_number(token: &str) -> Option<f64> {
    let cleaned: String = token.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn token_start(text: &str, start: usize) -> Option<usize> {
    let head = text.get(..start)?;
    let mut begin = start;
    for (idx, c) in head.char_indices().rev() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            begin = idx;
        } else {
            break;
        }
    }
    // 前导的逗号或小数点不属于数字
    while begin < start && matches!(text.as_bytes()[begin], b'.' | b',') {
        begin += 1;
    }
    Some(begin)
}

/// 匹配结束后仍紧跟数字或 `,数字`，说明分隔符有歧义
fn runs_on(rest: &str) -> bool {
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some(',') => chars.next().map(|c| c.is_ascii_digit()).unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_strips_thousands_separators() {
        assert_eq!(scan("（千元）\n1,234,567 元"), Some(1_234_567.0));
        assert_eq!(scan("合计 98,765.43"), Some(98_765.43));
    }

    #[test]
    fn test_scan_takes_first_number() {
        assert_eq!(scan("2023年 营业收入 15.6 亿元"), Some(2023.0));
    }

    #[test]
    fn test_scan_ignores_leading_separator_or_point() {
        assert_eq!(scan(",5"), Some(5.0));
        assert_eq!(scan(".75 元"), Some(75.0));
    }

    #[test]
    fn test_scan_rejects_ambiguous_grouping() {
        assert_eq!(scan("1,2345"), None);
        assert_eq!(scan("12,34"), None);
    }

    #[test]
    fn test_scan_trailing_comma_is_punctuation() {
        assert_eq!(scan("营业收入 1,234, 同比增长"), Some(1234.0));
    }

    #[test]
    fn test_scan_returns_none_without_digits() {
        assert_eq!(scan("无数据"), None);
        assert_eq!(scan(""), None);
    }

    #[test]
    fn test_scan_ignores_full_width_digits() {
        assert_eq!(scan("１２３ 元"), None);
    }

    #[test]
    fn test_parse_at_checks_following_text() {
        let text = "净利润 1,2345";
        let start = text.find('1').unwrap();
        assert_eq!(parse_at(text, start, start + 5), None);
        assert_eq!(parse_at("净利润 1,234亿", start, start + 5), Some(1234.0));
    }

    #[test]
    fn test_parse_at_extends_back_to_number_start() {
        let text = "毛利率 30.25%";
        let start = text.find("0.25").unwrap();
        assert_eq!(parse_at(text, start, start + 4), Some(30.25));

        let grouped = "合计 1,234,567 元";
        let start = grouped.find("234,567").unwrap();
        assert_eq!(parse_at(grouped, start, start + 7), Some(1_234_567.0));

        let malformed = "比例 1.2.25%";
        let start = malformed.find("25").unwrap();
        assert_eq!(parse_at(malformed, start, start + 2), None);

        let separator = "数值,25";
        let start = separator.find("25").unwrap();
        assert_eq!(parse_at(separator, start, start + 2), Some(25.0));
    }

    #[test]
    fn test_scan_percent_accepts_full_width_sign() {
        assert_eq!(scan_percent("毛利率 23.45 %"), Some(23.45));
        assert_eq!(scan_percent("毛利率 18.2％"), Some(18.2));
        assert_eq!(scan_percent("2023 年 毛利率 30%"), Some(30.0));
        assert_eq!(scan_percent("没有百分比 12.5"), None);
    }
}
