//! 启动预取：固定数量的 worker 共享一个轮转队列，逐个调用 fetch，直到队列取尽。
//!
//! 单个 URL 失败只记日志并计数，不会中断整批任务。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use futures_util::future::join_all;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{debug, info, warn};

use super::fetch::MediaCache;
use super::group::Group;
use super::http::HttpClient;
use super::scheduler::RoundRobin;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchReport {
    pub succeeded: usize,
    pub failed: usize,
}

pub struct PrefetchRunner<C> {
    cache: MediaCache<C>,
    workers: usize,
    show_progress: bool,
}

impl<C: HttpClient> PrefetchRunner<C> {
    pub fn new(cache: MediaCache<C>, workers: usize) -> Self {
        Self {
            cache,
            workers: workers.max(1),
            show_progress: false,
        }
    }

    /// 在 stderr 显示进度条（仅 CLI 前台运行时使用）。
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub async fn run(&self, queue: RoundRobin<Group>) -> PrefetchReport {
        let total = queue.remaining();
        if total == 0 {
            info!("预取队列为空，跳过");
            return PrefetchReport::default();
        }
        info!(total, workers = self.workers, "开始预取");

        let bar = self.progress_bar(total as u64);
        let queue = Mutex::new(queue);
        let succeeded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);

        let workers = (0..self.workers).map(|worker| {
            let (queue, bar) = (&queue, bar.as_ref());
            let (succeeded, failed) = (&succeeded, &failed);
            async move {
                // 取下一项时只短暂持锁
                while let Some((group, url)) = next_item(queue) {
                    match self.cache.fetch(&url, group).await {
                        Ok(path) => {
                            debug!(worker, %group, path = %path.display(), "prefetched");
                            succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => {
                            warn!(worker, %group, %url, "预取失败: {err}");
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    if let Some(bar) = bar {
                        bar.inc(1);
                    }
                }
            }
        });
        join_all(workers).await;

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        let report = PrefetchReport {
            succeeded: succeeded.into_inner(),
            failed: failed.into_inner(),
        };
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "预取完成"
        );
        report
    }

    fn progress_bar(&self, total: u64) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::with_template("{prefix} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        bar.set_prefix("预取");
        Some(bar)
    }
}

fn next_item(queue: &Mutex<RoundRobin<Group>>) -> Option<(Group, String)> {
    queue.lock().unwrap_or_else(PoisonError::into_inner).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_cache::index::Status;
    use crate::media_cache::content_id::identify;
    use crate::media_cache::testing::{FakeHttp, FakeResource, open_cache};
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn pool_is_bounded_and_whole_batch_settles() {
        let dir = TempDir::new().unwrap();
        let http = FakeHttp::new();
        let mut anime = Vec::new();
        for i in 0..8 {
            let url = format!("https://a/{i}.mp4");
            http.serve(
                &url,
                FakeResource::bytes(256)
                    .content_type("video/mp4")
                    .delayed(Duration::from_millis(30)),
            );
            anime.push(url);
        }
        // 未注册的 URL 返回 404
        let girl = vec!["https://g/missing-1.mp4".to_string(), "https://g/missing-2.mp4".to_string()];
        let cache = open_cache(dir.path(), &http);

        let queue = RoundRobin::new([(Group::Anime, anime.clone()), (Group::Girl, girl.clone())]);
        let report = PrefetchRunner::new(cache.clone(), 3).run(queue).await;

        assert_eq!(report, PrefetchReport { succeeded: 8, failed: 2 });
        assert_eq!(report.succeeded + report.failed, 10);
        assert_eq!(http.peak_active(), 3);
        assert_eq!(cache.in_flight_len(), 0);
        for url in &anime {
            let rec = cache.record(Group::Anime, &identify(url)).unwrap();
            assert_eq!(rec.status, Status::Done);
        }
        for url in &girl {
            let rec = cache.record(Group::Girl, &identify(url)).unwrap();
            assert_eq!(rec.status, Status::Error);
        }
    }

    #[tokio::test]
    async fn single_worker_runs_one_at_a_time() {
        let dir = TempDir::new().unwrap();
        let http = FakeHttp::new();
        let urls: Vec<String> = (0..4).map(|i| format!("https://t/{i}.webm")).collect();
        for url in &urls {
            http.serve(url, FakeResource::bytes(64).delayed(Duration::from_millis(5)));
        }
        let cache = open_cache(dir.path(), &http);

        let report = PrefetchRunner::new(cache, 0)
            .run(RoundRobin::new([(Group::Trai, urls)]))
            .await;
        assert_eq!(report.succeeded, 4);
        assert_eq!(http.peak_active(), 1);
    }

    #[tokio::test]
    async fn empty_queue_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let http = FakeHttp::new();
        let cache = open_cache(dir.path(), &http);
        let queue = RoundRobin::new(Group::ALL.map(|g| (g, Vec::<String>::new())));
        let report = PrefetchRunner::new(cache, 3).run(queue).await;
        assert_eq!(report, PrefetchReport::default());
        assert_eq!(http.gets(), 0);
    }
}
