use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use finscan::config::{AppConfig, API_KEY_ENV};
use finscan::generator::{self, DocumentAnalysis};
use finscan::parser::{self, ReportPipeline};
use finscan::summarizer::{self, QwenSummarizer};
use finscan::utils::logger;

#[derive(Parser)]
#[command(name = "finscan")]
#[command(version, about = "公司年报财务指标提取与分析", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 生成默认配置文件和输出目录
    Init,
    /// 分析一个或多个年报文件（PDF 或文本）
    Analyze {
        /// 年报文件路径
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// 只提取指标，不调用大模型
        #[arg(long)]
        no_llm: bool,
        /// 将结果写入 JSON 文件（默认输出到标准输出）
        #[arg(long)]
        json: Option<PathBuf>,
        /// 生成 HTML 报告
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// 只提取财务指标和 MD&A 片段
    Metrics {
        /// 年报文件路径
        path: PathBuf,
    },
    /// 检查服务状态
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logger::init_logger();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_command().await?;
        }
        Commands::Analyze { paths, no_llm, json, html } => {
            analyze_command(&paths, no_llm, json, html).await?;
        }
        Commands::Metrics { path } => {
            metrics_command(&path)?;
        }
        Commands::Status => {
            status_command()?;
        }
    }

    Ok(())
}

async fn init_command() -> Result<()> {
    info!("初始化配置...");

    let app_config = AppConfig::default();
    tokio::fs::create_dir_all("config").await?;
    tokio::fs::create_dir_all(app_config.reports_dir()).await?;

    app_config.save("config/settings.toml")?;
    info!("已生成配置文件: config/settings.toml");
    info!("下一步:");
    info!("  1. 在 config/settings.toml 或 .env 中配置 {}", API_KEY_ENV);
    info!("  2. 运行 'finscan analyze <年报.pdf>' 开始分析");

    Ok(())
}

async fn analyze_command(paths: &[PathBuf], no_llm: bool, json: Option<PathBuf>, html: Option<PathBuf>) -> Result<()> {
    let app_config = AppConfig::load()?;
    let pipeline = ReportPipeline::new();

    let summarizer = if no_llm {
        None
    } else {
        let summarizer = QwenSummarizer::new(app_config.summarizer.clone())?;
        if !summarizer.is_configured() {
            warn!("⚠️ API key 未配置，分析结果中将包含错误信息。请设置 {}", API_KEY_ENV);
        }
        Some(summarizer)
    };

    let mut analyses: Vec<DocumentAnalysis> = Vec::new();
    let mut fail_count = 0;

    for path in paths {
        info!("处理: {}", path.display());

        if let Err(e) = app_config.input.validate(path) {
            warn!("跳过 {}: {}", path.display(), e);
            fail_count += 1;
            continue;
        }

        let source = parser::extractor_for(path);
        let document = match pipeline.load(path, source.as_ref()) {
            Ok(document) => document,
            Err(e) => {
                warn!("读取 {} 失败: {}", path.display(), e);
                fail_count += 1;
                continue;
            }
        };

        let report = pipeline.assemble(&document.text);

        let outcome = match &summarizer {
            Some(client) => Some(summarizer::summarize_outcome(client, &report.metrics, &report.narrative).await),
            None => None,
        };
        if let Some(ref outcome) = outcome {
            if outcome.is_success() {
                info!("  ✅ 分析完成");
            }
        }

        analyses.push(DocumentAnalysis::new(&document, report, outcome));
    }

    info!("✅ 处理完成: {} 成功, {} 失败", analyses.len(), fail_count);

    let json_output = generator::render_json(&analyses)?;
    match json {
        Some(path) => {
            write_output(&path, &json_output).await?;
            info!("JSON 结果已写入: {}", path.display());
        }
        None => println!("{}", json_output),
    }

    if let Some(path) = html {
        let html_output = generator::render_html(&analyses, chrono::Utc::now());
        write_output(&path, &html_output).await?;
        info!("✅ 报告已生成: {}", path.display());
    }

    Ok(())
}

fn metrics_command(path: &Path) -> Result<()> {
    let app_config = AppConfig::load()?;
    app_config.input.validate(path)?;

    let pipeline = ReportPipeline::new();
    let source = parser::extractor_for(path);
    let document = pipeline.load(path, source.as_ref())?;
    let report = pipeline.assemble(&document.text);

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn status_command() -> Result<()> {
    let app_config = AppConfig::load()?;
    let status = serde_json::json!({
        "status": "running",
        "api_configured": !app_config.summarizer.api_key.trim().is_empty(),
        "model": app_config.summarizer.model,
        "version": env!("CARGO_PKG_VERSION"),
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}
