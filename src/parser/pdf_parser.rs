use std::path::Path;
use tracing::{info, warn};

use crate::utils::{FinError, FinResult};

/// 文档文本提取接口，核心只依赖这个接口而不依赖具体的文档格式库
pub trait TextExtractor {
    fn extract_text(&self, path: &Path) -> FinResult<String>;

    /// 页数，无法得知时返回 None
    fn page_count(&self, _path: &Path) -> Option<usize> {
        None
    }
}

pub struct PdfParser;

impl PdfParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TextExtractor for PdfParser {
    /// 提取完整文本
    fn extract_text(&self, path: &Path) -> FinResult<String> {
        info!("提取PDF完整文本: {}", path.display());
        ensure_exists(path)?;

        let text = pdf_extract::extract_text(path)
            .map_err(|e| FinError::PdfError(format!("{}: {}", path.display(), e)))?;

        if text.trim().is_empty() {
            warn!("PDF中未提取到文本内容（可能是扫描件）");
        } else {
            info!("提取文本长度: {} 字符", text.chars().count());
        }

        Ok(text)
    }

    fn page_count(&self, path: &Path) -> Option<usize> {
        match lopdf::Document::load(path) {
            Ok(doc) => Some(doc.get_pages().len()),
            Err(e) => {
                warn!("无法读取PDF页数 {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// 已经提取好的 UTF-8 文本文件
pub struct PlainTextParser;

impl TextExtractor for PlainTextParser {
    fn extract_text(&self, path: &Path) -> FinResult<String> {
        info!("读取文本文件: {}", path.display());
        ensure_exists(path)?;
        Ok(std::fs::read_to_string(path)?)
    }
}

/// 按扩展名选择提取器
pub fn extractor_for(path: &Path) -> Box<dyn TextExtractor> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        Box::new(PdfParser::new())
    } else {
        Box::new(PlainTextParser)
    }
}

fn ensure_exists(path: &Path) -> FinResult<()> {
    if !path.exists() {
        return Err(FinError::InvalidInput(format!("文件不存在: {}", path.display())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_pdf_is_invalid_input() {
        let err = PdfParser::new().extract_text(Path::new("/nonexistent/report.pdf")).unwrap_err();
        assert!(matches!(err, FinError::InvalidInput(_)));
    }

    #[test]
    fn test_plain_text_reads_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annual.txt");
        std::fs::write(&path, "营业收入（千元）\n1,234,567").unwrap();

        let text = PlainTextParser.extract_text(&path).unwrap();
        assert!(text.starts_with("营业收入"));
        assert_eq!(PlainTextParser.page_count(&path), None);
    }

    #[test]
    fn test_corrupt_pdf_is_reported_not_panicked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf at all").unwrap();

        let parser = extractor_for(&path);
        assert!(parser.page_count(&path).is_none());
    }
}
