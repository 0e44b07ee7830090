//! `vd <anime|gái|trai>`：从本地缓存随机发送一个已下载的文件。
//!
//! 加载时在后台启动预取；命令本身从不触发网络下载。

use std::path::PathBuf;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{Attachment, MessageSender, OutgoingMessage, SendError, ThreadTarget};
use crate::base_system::context::Config;
use crate::media_cache::{Group, HttpClient, MediaCache, PersistenceError, PrefetchReport, PrefetchRunner};
use crate::sources::SourceLists;

pub const USAGE: &str = "Dùng: vd <anime|gái|trai>. Ví dụ: vd gái";

/// 一次命令调用的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdOutcome {
    Usage,
    Preparing(Group),
    Sent(PathBuf),
    SendFailed(String),
}

pub struct VdModule<C> {
    cache: MediaCache<C>,
    prefetch: Option<JoinHandle<PrefetchReport>>,
}

impl<C: HttpClient> VdModule<C> {
    /// 打开缓存、读取来源列表并在后台启动预取。
    /// 来源列表读取失败时不预取，命令仍可使用已有缓存。
    pub fn on_load(cfg: &Config, client: C) -> Result<Self, PersistenceError> {
        let cache = MediaCache::open(cfg.cache_settings(), client)?;
        let prefetch = match SourceLists::load(cfg) {
            Ok(lists) => {
                let runner = PrefetchRunner::new(cache.clone(), cfg.prefetch_workers());
                let queue = lists.into_queue();
                Some(tokio::spawn(async move { runner.run(queue).await }))
            }
            Err(err) => {
                error!("加载来源列表失败，跳过预取: {err}");
                None
            }
        };
        Ok(Self { cache, prefetch })
    }

    #[cfg(test)]
    pub fn from_cache(cache: MediaCache<C>) -> Self {
        Self {
            cache,
            prefetch: None,
        }
    }
}

impl<C> VdModule<C> {
    /// 取走后台预取任务句柄（如需等待其完成）。
    pub fn take_prefetch(&mut self) -> Option<JoinHandle<PrefetchReport>> {
        self.prefetch.take()
    }

    pub async fn run<S: MessageSender>(
        &self,
        args: &[String],
        target: &ThreadTarget,
        sender: &S,
    ) -> VdOutcome {
        let label = args.first().map(|s| s.to_lowercase()).unwrap_or_default();
        let Some(group) = Group::from_alias(&label) else {
            reply_text(sender, target, USAGE).await;
            return VdOutcome::Usage;
        };

        let Some(path) = self.cache.pick_for_group(group) else {
            let text = format!("Đang chuẩn bị nội dung {label}… vui lòng thử lại sau.");
            reply_text(sender, target, &text).await;
            return VdOutcome::Preparing(group);
        };

        match send_file(sender, target, &label, &path).await {
            Ok(()) => {
                info!(%group, path = %path.display(), thread = %target.thread_id, "已发送缓存文件");
                VdOutcome::Sent(path)
            }
            Err(err) => {
                error!(%group, path = %path.display(), "发送失败: {err}");
                let text = format!("Không gửi được video ({err}).");
                reply_text(sender, target, &text).await;
                VdOutcome::SendFailed(err.to_string())
            }
        }
    }
}

async fn send_file<S: MessageSender>(
    sender: &S,
    target: &ThreadTarget,
    label: &str,
    path: &std::path::Path,
) -> Result<(), SendError> {
    let attachment = Attachment::open(path).await?;
    let message = OutgoingMessage::with_attachment(format!("Video {label}"), attachment);
    sender.send(message, target).await
}

async fn reply_text<S: MessageSender>(sender: &S, target: &ThreadTarget, text: &str) {
    if let Err(err) = sender.send(OutgoingMessage::text(text), target).await {
        warn!(thread = %target.thread_id, "回复消息失败: {err}");
    }
}
