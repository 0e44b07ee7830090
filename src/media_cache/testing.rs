//! 测试用的内存 HTTP 实现：按 URL 注册资源，统计调用次数与并发峰值。

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};

use super::error::HttpError;
use super::fetch::{CacheSettings, MediaCache};
use super::http::{BodyResponse, HttpClient, ProbeInfo};
use super::retry::RetryPolicy;

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeResource {
    pub content_type: Option<String>,
    pub head_length: Option<u64>,
    pub head_fails: bool,
    pub body: Vec<u8>,
    pub chunk_size: usize,
    pub failing_gets: usize,
    pub fail_mid_stream: bool,
    pub delay: Duration,
    pub chunk_pause: Duration,
}

impl FakeResource {
    pub fn bytes(len: usize) -> Self {
        Self {
            body: vec![7u8; len],
            chunk_size: 64 * 1024,
            ..Self::default()
        }
    }

    pub fn content_type(mut self, ct: &str) -> Self {
        self.content_type = Some(ct.to_string());
        self
    }

    pub fn reported_len(mut self, len: u64) -> Self {
        self.head_length = Some(len);
        self
    }

    pub fn failing_head(mut self) -> Self {
        self.head_fails = true;
        self
    }

    pub fn failing_gets(mut self, n: usize) -> Self {
        self.failing_gets = n;
        self
    }

    pub fn broken_stream(mut self) -> Self {
        self.fail_mid_stream = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 每个分块之前暂停一段时间，便于在传输途中观察磁盘状态。
    pub fn paced(mut self, chunk_size: usize, pause: Duration) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_pause = pause;
        self
    }
}

#[derive(Default)]
pub(crate) struct FakeHttp {
    resources: Mutex<HashMap<String, FakeResource>>,
    gets_by_url: Mutex<HashMap<String, usize>>,
    pub head_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, resource: FakeResource) {
        self.resources
            .lock()
            .unwrap()
            .insert(url.to_string(), resource);
    }

    pub fn heads(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn lookup(&self, url: &str) -> Option<FakeResource> {
        self.resources.lock().unwrap().get(url).cloned()
    }
}

impl HttpClient for FakeHttp {
    async fn head(&self, url: &str) -> Result<ProbeInfo, HttpError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        let res = self.lookup(url).ok_or(HttpError::Status(404))?;
        if res.head_fails {
            return Err(HttpError::Status(502));
        }
        Ok(ProbeInfo {
            content_type: res.content_type.clone(),
            content_length: res.head_length,
        })
    }

    async fn get(&self, url: &str) -> Result<BodyResponse, HttpError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = ActiveGuard(Arc::clone(&self.active));

        let res = self.lookup(url).ok_or(HttpError::Status(404))?;
        if !res.delay.is_zero() {
            tokio::time::sleep(res.delay).await;
        }

        let seen = {
            let mut by_url = self.gets_by_url.lock().unwrap();
            let n = by_url.entry(url.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        if seen <= res.failing_gets {
            return Err(HttpError::Status(503));
        }

        let mut chunks: Vec<Result<Bytes, HttpError>> = res
            .body
            .chunks(res.chunk_size.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if res.fail_mid_stream {
            chunks.truncate(1);
            chunks.push(Err(HttpError::Status(502)));
        }

        let pause = res.chunk_pause;
        let body = stream::iter(chunks)
            .then(move |c| async move {
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
                c
            })
            .map(move |c| {
                let _held = &guard;
                c
            });
        Ok(BodyResponse {
            content_type: res.content_type.clone(),
            body: Box::pin(body),
        })
    }
}

pub(crate) fn quick_settings(root: &Path) -> CacheSettings {
    CacheSettings {
        root: root.to_path_buf(),
        max_bytes: 25 * 1024 * 1024,
        download_timeout: Duration::from_secs(5),
        probe_timeout: Duration::from_secs(1),
        retry: RetryPolicy {
            retries: 2,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
            jitter: Duration::ZERO,
        },
    }
}

pub(crate) fn open_cache(root: &Path, http: &Arc<FakeHttp>) -> MediaCache<Arc<FakeHttp>> {
    MediaCache::open(quick_settings(root), Arc::clone(http)).expect("open cache")
}
