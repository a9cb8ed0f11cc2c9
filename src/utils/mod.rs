pub mod logger;

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinError {
    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("配置解析错误: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("PDF处理错误: {0}")]
    PdfError(String),

    #[error("输入文件无效: {0}")]
    InvalidInput(String),
}

pub type FinResult<T> = Result<T, FinError>;

/// 检查文件扩展名是否在允许列表中（不区分大小写）
pub fn allowed_file(path: &Path, allowed_extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// 按字符数截取前缀，保证不会切断多字节字符
pub fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
