use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// 单次 fetch 的失败；`Clone` 以便合并的等待方共享同一结果。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("too large: {size}B > {limit}B")]
    TooLarge { size: u64, limit: u64 },
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        FetchError::Transport(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

/// 索引落盘失败；只记录日志，从不向调用方传播。
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("encode index failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
}
