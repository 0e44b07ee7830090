//! 聊天命令与宿主框架之间的边界：消息结构与发送能力。

pub mod vd;

use std::future::Future;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;

pub use vd::VdModule;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("attachment {path} unreadable: {source}")]
    Attachment {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    Rejected(String),
}

/// 附件：路径与已打开的只读句柄。
#[derive(Debug)]
pub struct Attachment {
    pub path: PathBuf,
    pub file: tokio::fs::File,
}

impl Attachment {
    pub async fn open(path: &Path) -> Result<Self, SendError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| SendError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }
}

#[derive(Debug)]
pub struct OutgoingMessage {
    pub body: String,
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(body: impl Into<String>, attachment: Attachment) -> Self {
        Self {
            body: body.into(),
            attachment: Some(attachment),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadTarget {
    pub thread_id: String,
    /// 要回复的消息 id。
    pub reply_to: Option<String>,
}

impl ThreadTarget {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            reply_to: None,
        }
    }
}

/// 宿主聊天框架提供的发送能力。
pub trait MessageSender: Send + Sync {
    fn send(
        &self,
        message: OutgoingMessage,
        target: &ThreadTarget,
    ) -> impl Future<Output = Result<(), SendError>> + Send;
}

/// 把消息打印到标准输出，供 CLI 的 `vd` 子命令使用。附件只输出路径与大小。
pub struct ConsoleSender;

impl MessageSender for ConsoleSender {
    async fn send(&self, message: OutgoingMessage, target: &ThreadTarget) -> Result<(), SendError> {
        let reply = target
            .reply_to
            .as_deref()
            .map(|id| format!(" ↩{id}"))
            .unwrap_or_default();
        let mut line = format!("[{}{reply}] {}", target.thread_id, message.body);
        if let Some(att) = &message.attachment {
            let meta = att
                .file
                .metadata()
                .await
                .map_err(|source| SendError::Attachment {
                    path: att.path.clone(),
                    source,
                })?;
            line.push_str(&format!(" ({}, {} bytes)", att.path.display(), meta.len()));
        }
        line.push('\n');

        let mut out = tokio::io::stdout();
        out.write_all(line.as_bytes())
            .await
            .map_err(|err| SendError::Rejected(format!("stdout: {err}")))?;
        out.flush()
            .await
            .map_err(|err| SendError::Rejected(format!("stdout: {err}")))
    }
}
