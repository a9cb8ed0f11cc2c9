use async_trait::async_trait;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{SummarizerConfig, API_KEY_ENV};
use crate::parser::MetricSet;
use crate::utils::{char_prefix, FinError, FinResult};

/// 提示词中最多带入的 MD&A 字符数
const PROMPT_NARRATIVE_CHARS: usize = 3000;
/// 结果中保留的 MD&A 摘要字符数
const MDA_SUMMARY_CHARS: usize = 500;

/// 重试退避的基础间隔和上限
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_MAX_MS: u64 = 30_000;

const SYSTEM_PROMPT: &str = "You are a professional financial analyst specializing in corporate financial analysis and investment value assessment.";

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("API Key not configured")]
    MissingApiKey,

    #[error("API authentication failed ({status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("API call failed ({status}): {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryErrorKind {
    MissingApiKey,
    Unauthorized,
    Network,
    HttpStatus,
    InvalidResponse,
}

impl SummaryErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryErrorKind::MissingApiKey => "missing_api_key",
            SummaryErrorKind::Unauthorized => "unauthorized",
            SummaryErrorKind::Network => "network",
            SummaryErrorKind::HttpStatus => "http_status",
            SummaryErrorKind::InvalidResponse => "invalid_response",
        }
    }
}

impl SummaryError {
    pub fn kind(&self) -> SummaryErrorKind {
        match self {
            SummaryError::MissingApiKey => SummaryErrorKind::MissingApiKey,
            SummaryError::Unauthorized { .. } => SummaryErrorKind::Unauthorized,
            SummaryError::HttpStatus { .. } => SummaryErrorKind::HttpStatus,
            SummaryError::Network(_) => SummaryErrorKind::Network,
            SummaryError::InvalidResponse(_) => SummaryErrorKind::InvalidResponse,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            SummaryError::Unauthorized { status, .. } | SummaryError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 网络错误、限流和服务端错误值得重试
    pub fn is_retryable(&self) -> bool {
        match self {
            SummaryError::Network(_) => true,
            SummaryError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            SummaryError::MissingApiKey | SummaryError::Unauthorized { .. } => {
                Some(format!("Please set {} environment variable", API_KEY_ENV))
            }
            _ => None,
        }
    }
}

/// 总结服务的调用结果，失败也作为数据返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryOutcome {
    Success {
        analysis: String,
        mda_summary: String,
    },
    Failure {
        kind: SummaryErrorKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        suggestion: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },
}

impl SummaryOutcome {
    pub fn from_error(err: &SummaryError) -> Self {
        SummaryOutcome::Failure {
            kind: err.kind(),
            message: err.to_string(),
            suggestion: err.suggestion(),
            code: err.status_code(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SummaryOutcome::Success { .. })
    }
}

/// 叙述总结服务接口
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, metrics: &MetricSet, narrative: &str) -> Result<String, SummaryError>;
}

/// 调用总结服务，并把任何失败转换成结构化结果
pub async fn summarize_outcome(summarizer: &dyn Summarizer, metrics: &MetricSet, narrative: &str) -> SummaryOutcome {
    match summarizer.summarize(metrics, narrative).await {
        Ok(analysis) => SummaryOutcome::Success {
            analysis,
            mda_summary: mda_summary(narrative),
        },
        Err(e) => {
            warn!("分析服务调用失败: {}", e);
            SummaryOutcome::from_error(&e)
        }
    }
}

pub fn mda_summary(narrative: &str) -> String {
    let prefix = char_prefix(narrative, MDA_SUMMARY_CHARS);
    if prefix.len() < narrative.len() {
        format!("{}...", prefix)
    } else {
        narrative.to_string()
    }
}

/// 构造分析提示词
pub fn build_prompt(metrics: &MetricSet, narrative: &str) -> String {
    let metrics_json = serde_json::to_string_pretty(metrics).unwrap_or_else(|_| "{}".to_string());

    format!(
        "You are a professional financial analyst. Please analyze the following corporate annual report data:\n\n\
         ## Financial Metrics\n\
         {metrics_json}\n\n\
         ## Management Discussion & Analysis (MD&A)\n\
         {mda}\n\n\
         Please analyze from the following dimensions:\n\n\
         ### 1. Financial Health\n\
         - Profitability Analysis\n\
         - Solvency Analysis\n\
         - Operational Efficiency Analysis\n\n\
         ### 2. Business Development Prospects\n\
         - Industry Trend Assessment\n\
         - Company Competitive Advantages\n\
         - Potential Risk Factors\n\n\
         ### 3. Investment Value Assessment\n\
         - Valuation Level Judgment\n\
         - Growth Space Analysis\n\
         - Investment Recommendations\n\n\
         Please use professional but accessible language, present in bullet points, \
         with each point not exceeding 100 words. Respond in English.",
        metrics_json = metrics_json,
        mda = char_prefix(narrative, PROMPT_NARRATIVE_CHARS),
    )
}

/// OpenAI 兼容的请求体
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// 通义千问（DashScope 兼容模式）
pub struct QwenSummarizer {
    client: reqwest::Client,
    config: SummarizerConfig,
}

impl QwenSummarizer {
    pub fn new(config: SummarizerConfig) -> FinResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FinError::ConfigError(format!("无法创建 HTTP 客户端: {}", e)))?;
        Ok(Self { client, config })
    }

    /// 检查 API key 是否已配置
    pub fn is_configured(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    fn build_request(&self, metrics: &MetricSet, narrative: &str) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(metrics, narrative),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream: false,
        }
    }

    /// 调用 API，可重试的错误按指数退避重试，首次调用之外最多再试 `max_retries` 次
    async fn call_api(&self, request: &ChatRequest) -> Result<String, SummaryError> {
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                info!("API 重试 ({}/{})，等待 {}ms...", attempt, max_retries, delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            match self.do_request(request).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    warn!("API 调用失败 (第 {} 次): {}", attempt + 1, e);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn do_request(&self, request: &ChatRequest) -> Result<String, SummaryError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), body));
        }

        parse_chat_response(&body)
    }
}

#[async_trait]
impl Summarizer for QwenSummarizer {
    async fn summarize(&self, metrics: &MetricSet, narrative: &str) -> Result<String, SummaryError> {
        if !self.is_configured() {
            return Err(SummaryError::MissingApiKey);
        }

        info!("调用 {} 生成分析报告", self.config.model);
        let request = self.build_request(metrics, narrative);
        self.call_api(&request).await
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let millis = BACKOFF_BASE_MS
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(BACKOFF_MAX_MS);
    Duration::from_millis(millis)
}

fn classify_status(status: u16, body: String) -> SummaryError {
    match status {
        401 | 403 => SummaryError::Unauthorized { status, body },
        _ => SummaryError::HttpStatus { status, body },
    }
}

fn parse_chat_response(body: &str) -> Result<String, SummaryError> {
    let chat_response: ChatResponse =
        serde_json::from_str(body).map_err(|e| SummaryError::InvalidResponse(e.to_string()))?;

    chat_response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| SummaryError::InvalidResponse("响应中没有 choices".to_string()))
}
