use regex::Regex;

/// 锚点：固定关键词或允许中间出现单位/表格内容的小模式
#[derive(Debug, Clone)]
pub enum Anchor {
    Literal(&'static str),
    Pattern(Regex),
}

impl Anchor {
    /// 返回第一次匹配结束处的字节偏移
    pub fn locate(&self, text: &str) -> Option<usize> {
        match self {
            Anchor::Literal(keyword) => text.find(keyword).map(|idx| idx + keyword.len()),
            Anchor::Pattern(re) => re.find(text).map(|m| m.end()),
        }
    }
}

/// 锚点之后的扫描窗口，单位为字符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub offset: usize,
    pub length: usize,
}

impl ScanWindow {
    pub const fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    /// 从 `start`（字节偏移）开始切出窗口，总在字符边界上
    pub fn slice<'a>(&self, text: &'a str, start: usize) -> &'a str {
        let rest = match text.get(start..) {
            Some(rest) => rest,
            None => return "",
        };
        let mut boundaries = rest
            .char_indices()
            .map(|(idx, _)| idx)
            .chain(std::iter::once(rest.len()));
        let begin = match boundaries.nth(self.offset) {
            Some(idx) => idx,
            None => return "",
        };
        let end = if self.length == 0 {
            begin
        } else {
            boundaries.nth(self.length - 1).unwrap_or(rest.len())
        };
        &rest[begin..end]
    }
}

/// 定位锚点并返回其后的扫描窗口
pub fn locate_window<'a>(text: &'a str, anchor: &Anchor, window: ScanWindow) -> Option<&'a str> {
    let end = anchor.locate(text)?;
    Some(window.slice(text, end))
}
