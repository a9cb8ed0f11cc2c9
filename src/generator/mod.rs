use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parser::{DocumentReport, MetricKey, MetricSet, SourceDocument};
use crate::summarizer::SummaryOutcome;
use crate::utils::{char_prefix, FinResult};

/// 报告中 MD&A 预览的字符数
const NARRATIVE_PREVIEW_CHARS: usize = 800;

/// 单个文件的完整分析记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub file: String,
    pub text_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    pub metrics: MetricSet,
    pub mda_extracted: usize,
    pub narrative: String,
    pub analyzed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<SummaryOutcome>,
}

impl DocumentAnalysis {
    pub fn new(source: &SourceDocument, report: DocumentReport, analysis: Option<SummaryOutcome>) -> Self {
        Self {
            file: source.file.clone(),
            text_length: source.text.chars().count(),
            page_count: source.page_count,
            mda_extracted: report.narrative.chars().count(),
            metrics: report.metrics,
            narrative: report.narrative,
            analyzed_at: Utc::now(),
            analysis,
        }
    }
}

pub fn render_json(analyses: &[DocumentAnalysis]) -> FinResult<String> {
    Ok(serde_json::to_string_pretty(analyses)?)
}

/// 指标的显示文本，缺失值显示为破折号
pub fn format_metric(key: MetricKey, value: Option<f64>) -> String {
    match value {
        Some(v) if key.is_ratio() => format!("{:.2}%", v),
        Some(v) => format!("{:.2} 亿元", v),
        None => "—".to_string(),
    }
}

pub fn render_html(analyses: &[DocumentAnalysis], generated_at: DateTime<Utc>) -> String {
    let date = generated_at.format("%Y-%m-%d %H:%M UTC").to_string();
    let mut html = format!(r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>年报分析报告 - {date}</title>
<style>
* {{ margin: 0; padding: 0; box-sizing: border-box; }}
body {{ font-family: -apple-system, "Segoe UI", Roboto, "Noto Sans SC", sans-serif; background: #f5f5f5; color: #333; line-height: 1.6; }}
.container {{ max-width: 1100px; margin: 0 auto; padding: 20px; }}
header {{ background: linear-gradient(135deg, #0d47a1 0%, #1565c0 100%); color: white; padding: 40px 30px; border-radius: 12px; margin-bottom: 30px; }}
header h1 {{ font-size: 28px; margin-bottom: 8px; }}
header .meta {{ opacity: 0.85; font-size: 14px; }}
.doc {{ background: white; border-radius: 12px; padding: 30px; margin-bottom: 24px; box-shadow: 0 2px 8px rgba(0,0,0,0.08); }}
.doc-title {{ font-size: 22px; color: #0d47a1; margin-bottom: 8px; padding-bottom: 12px; border-bottom: 2px solid #e3f2fd; }}
.stats {{ display: flex; gap: 16px; margin-bottom: 20px; flex-wrap: wrap; }}
.stat {{ background: #f5f5f5; padding: 8px 16px; border-radius: 8px; font-size: 14px; }}
.stat b {{ color: #0d47a1; }}
h3 {{ font-size: 17px; color: #1565c0; margin: 24px 0 12px 0; padding-left: 12px; border-left: 4px solid #42a5f5; }}
table.metrics {{ width: 100%; border-collapse: collapse; font-size: 14px; }}
table.metrics th {{ background: #e3f2fd; padding: 8px 12px; text-align: left; border: 1px solid #bbdefb; }}
table.metrics td {{ padding: 8px 12px; border: 1px solid #e0e0e0; }}
table.metrics td.missing {{ color: #999; }}
.section-body {{ background: #fafafa; border-radius: 8px; padding: 16px; font-size: 14px; color: #555; white-space: pre-wrap; word-break: break-word; max-height: 300px; overflow-y: auto; }}
.analysis {{ background: #e8f5e9; border-left: 3px solid #4caf50; padding: 12px 16px; border-radius: 0 8px 8px 0; font-size: 14px; white-space: pre-wrap; }}
.failure {{ background: #ffebee; border-left: 3px solid #e53935; padding: 12px 16px; border-radius: 0 8px 8px 0; font-size: 14px; color: #b71c1c; }}
.empty {{ color: #999; font-style: italic; padding: 12px; }}
</style>
</head>
<body>
<div class="container">
<header>
  <h1>公司年报分析报告</h1>
  <div class="meta">生成时间: {date} &nbsp;|&nbsp; 文件数: {count}</div>
</header>
"#, date = date, count = analyses.len());

    for analysis in analyses {
        html.push_str(&format!(
            "<div class=\"doc\">\n<div class=\"doc-title\">{}</div>\n",
            html_escape(&analysis.file)
        ));

        let pages = analysis
            .page_count
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        html.push_str(&format!(r#"<div class="stats">
  <div class="stat"><b>{pages}</b> 页</div>
  <div class="stat"><b>{chars}</b> 字符</div>
  <div class="stat"><b>{found}/{total}</b> 项指标</div>
  <div class="stat"><b>{mda}</b> 字 MD&amp;A</div>
</div>
"#,
            pages = pages,
            chars = analysis.text_length,
            found = analysis.metrics.found_count(),
            total = MetricKey::ALL.len(),
            mda = analysis.mda_extracted,
        ));

        html.push_str("<h3>财务指标</h3>\n<table class=\"metrics\"><thead><tr><th>指标</th><th>数值</th></tr></thead><tbody>");
        for (key, value) in analysis.metrics.iter() {
            let class = if value.is_some() { "" } else { " class=\"missing\"" };
            html.push_str(&format!(
                "<tr><td>{label}</td><td{class}>{value}</td></tr>",
                label = key.label_zh(),
                class = class,
                value = html_escape(&format_metric(key, value)),
            ));
        }
        html.push_str("</tbody></table>\n");

        html.push_str("<h3>管理层讨论与分析</h3>\n");
        if analysis.narrative.trim().is_empty() {
            html.push_str(r#"<div class="empty">未提取到内容</div>"#);
        } else {
            let preview = char_prefix(&analysis.narrative, NARRATIVE_PREVIEW_CHARS);
            let ellipsis = if preview.len() < analysis.narrative.len() { "..." } else { "" };
            html.push_str(&format!(
                r#"<div class="section-body">{}{}</div>"#,
                html_escape(preview),
                ellipsis
            ));
        }
        html.push('\n');

        match &analysis.analysis {
            Some(SummaryOutcome::Success { analysis: text, .. }) => {
                html.push_str("<h3>智能分析</h3>\n");
                html.push_str(&format!(r#"<div class="analysis">{}</div>"#, html_escape(text)));
            }
            Some(SummaryOutcome::Failure { kind, message, suggestion, .. }) => {
                html.push_str("<h3>智能分析</h3>\n");
                let hint = suggestion
                    .as_deref()
                    .map(|s| format!("<br>{}", html_escape(s)))
                    .unwrap_or_default();
                html.push_str(&format!(
                    r#"<div class="failure">[{}] {}{}</div>"#,
                    kind.as_str(),
                    html_escape(message),
                    hint
                ));
            }
            None => {}
        }
        html.push('\n');

        html.push_str("</div>\n");
    }

    if analyses.is_empty() {
        html.push_str(r#"<div class="empty">没有分析结果</div>"#);
    }

    html.push_str("</div>\n</body>\n</html>");
    html
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
     .replace('<', "&lt;")
     .replace('>', "&gt;")
     .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::assemble;
    use crate::summarizer::SummaryErrorKind;

    const TEXT: &str = "管理层讨论与分析：收入增长 <显著> & 稳定\n营业收入：200亿元\n净利润：30亿元";

    fn sample(analysis: Option<SummaryOutcome>) -> DocumentAnalysis {
        let source = SourceDocument {
            file: "2023 \"年报\".txt".to_string(),
            text: TEXT.to_string(),
            page_count: Some(12),
        };
        DocumentAnalysis::new(&source, assemble(TEXT), analysis)
    }

    #[test]
    fn test_format_metric_units() {
        assert_eq!(format_metric(MetricKey::Revenue, Some(123.4567)), "123.46 亿元");
        assert_eq!(format_metric(MetricKey::DebtRatio, Some(60.0)), "60.00%");
        assert_eq!(format_metric(MetricKey::GrossMargin, None), "—");
    }

    #[test]
    fn test_analysis_record_counts_characters() {
        let record = sample(None);
        assert_eq!(record.text_length, TEXT.chars().count());
        assert_eq!(record.mda_extracted, record.narrative.chars().count());
        assert_eq!(record.metrics.profit_margin, Some(15.0));
    }

    #[test]
    fn test_html_escapes_document_content() {
        let html = render_html(&[sample(None)], Utc::now());
        assert!(html.contains("&lt;显著&gt; &amp; 稳定"));
        assert!(html.contains("2023 &quot;年报&quot;.txt"));
        assert!(html.contains("<td>净利率</td><td>15.00%</td>"));
        assert!(html.contains(r#"<td class="missing">—</td>"#));
        assert!(!html.contains("智能分析"));
    }

    #[test]
    fn test_html_shows_failure_kind() {
        let failure = SummaryOutcome::Failure {
            kind: SummaryErrorKind::MissingApiKey,
            message: "API Key not configured".to_string(),
            suggestion: Some("Please set DASHSCOPE_API_KEY environment variable".to_string()),
            code: None,
        };
        let html = render_html(&[sample(Some(failure))], Utc::now());
        assert!(html.contains("[missing_api_key] API Key not configured"));
        assert!(html.contains("DASHSCOPE_API_KEY"));
    }

    #[test]
    fn test_json_keeps_null_metrics() {
        let json = render_json(&[sample(None)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value[0]["metrics"]["gross_margin"].is_null());
        assert_eq!(value[0]["page_count"], 12);
        assert!(value[0].get("analysis").is_none());
    }

    #[test]
    fn test_empty_batch_renders_placeholder() {
        assert!(render_html(&[], Utc::now()).contains("没有分析结果"));
    }
}
