use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::utils::{allowed_file, FinError, FinResult};

/// 环境变量中的 API Key，优先级高于配置文件
pub const API_KEY_ENV: &str = "DASHSCOPE_API_KEY";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    pub allowed_extensions: Vec<String>,
    pub max_file_mb: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub reports_dir: String,
}

impl AppConfig {
    pub fn load() -> FinResult<Self> {
        Self::load_from(Path::new("config/settings.toml"))
    }

    /// 读取配置文件（不存在时使用默认值），再用环境变量覆盖 API Key
    pub fn load_from(config_path: &Path) -> FinResult<Self> {
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            toml::from_str::<AppConfig>(&content)?
        } else {
            debug!("配置文件不存在，使用默认配置: {}", config_path.display());
            Self::default()
        };

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                config.summarizer.api_key = key.trim().to_string();
            }
        }

        Ok(config)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn reports_dir(&self) -> PathBuf {
        PathBuf::from(&self.output.reports_dir)
    }
}

impl InputConfig {
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_mb * 1024 * 1024
    }

    /// 读取前检查扩展名和文件大小
    pub fn validate(&self, path: &Path) -> FinResult<()> {
        if !allowed_file(path, &self.allowed_extensions) {
            return Err(FinError::InvalidInput(format!(
                "仅支持 {} 文件: {}",
                self.allowed_extensions.join("/"),
                path.display()
            )));
        }

        let size = std::fs::metadata(path)
            .map_err(|_| FinError::InvalidInput(format!("文件不存在: {}", path.display())))?
            .len();
        if size > self.max_file_bytes() {
            return Err(FinError::InvalidInput(format!(
                "文件过大 ({} 字节，上限 {} MB): {}",
                size,
                self.max_file_mb,
                path.display()
            )));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            summarizer: SummarizerConfig::default(),
            input: InputConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions".to_string(),
            model: "qwen-max".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["pdf".to_string(), "txt".to_string()],
            max_file_mb: 50,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            reports_dir: "data/reports".to_string(),
        }
    }
}
