pub mod anchor;
pub mod metrics;
pub mod narrative;
pub mod numeric;
pub mod pdf_parser;

pub use metrics::{extract_metrics, MetricExtractor, MetricKey, MetricSet};
pub use narrative::locate_narrative;
pub use pdf_parser::{extractor_for, PdfParser, PlainTextParser, TextExtractor};

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::utils::FinResult;

/// 单篇年报的提取结果快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub metrics: MetricSet,
    pub narrative: String,
}

/// 从文件读出的全文及其元信息
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub file: String,
    pub text: String,
    pub page_count: Option<usize>,
}

/// 对全文依次执行指标提取和 MD&A 定位
pub fn assemble(text: &str) -> DocumentReport {
    DocumentReport {
        metrics: extract_metrics(text),
        narrative: locate_narrative(text),
    }
}

/// 统一提取管道
pub struct ReportPipeline {
    metric_extractor: MetricExtractor,
}

impl ReportPipeline {
    pub fn new() -> Self {
        Self {
            metric_extractor: MetricExtractor::new(),
        }
    }

    pub fn with_extractor(metric_extractor: MetricExtractor) -> Self {
        Self { metric_extractor }
    }

    pub fn assemble(&self, text: &str) -> DocumentReport {
        let metrics = self.metric_extractor.extract(text);
        info!("提取到 {}/{} 项财务指标", metrics.found_count(), MetricKey::ALL.len());

        let narrative = locate_narrative(text);
        info!("MD&A 文本长度: {} 字符", narrative.chars().count());

        DocumentReport { metrics, narrative }
    }

    /// 读取文档全文
    pub fn load(&self, path: &Path, source: &dyn TextExtractor) -> FinResult<SourceDocument> {
        info!("开始提取管道: {}", path.display());

        let text = source.extract_text(path)?;
        let page_count = source.page_count(path);
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(SourceDocument { file, text, page_count })
    }
}

impl Default for ReportPipeline {
    fn default() -> Self {
        Self::new()
    }
}
