//! 公司年报分析：从年报全文中提取财务指标和管理层讨论与分析（MD&A）片段，
//! 并可交给大模型生成分析报告。
//!
//! 核心入口是 [`parser::assemble`]，它只接收文本，不做任何 I/O，也不会因为输入格式而报错。

pub mod config;
pub mod generator;
pub mod parser;
pub mod summarizer;
pub mod utils;

pub use parser::{assemble, DocumentReport, MetricKey, MetricSet};
pub use summarizer::{Summarizer, SummaryOutcome};
