//! 一次性下载引擎：同一 contentID 全进程最多一个在途请求。
//!
//! 流程：缓存命中直接返回 → 合并在途请求 → 登记 pending → HEAD 探测（失败不致命）
//! → 大小预检 → 推断扩展名 → 已存在则直接完成 → 流式写入 `.part` → 原子改名 → done。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::content_id::{ContentId, identify};
use super::error::{FetchError, PersistenceError};
use super::group::Group;
use super::http::{HttpClient, ProbeInfo};
use super::index::{ContentRecord, GroupCounts, INDEX_FILE_NAME, PersistentIndex};
use super::retry::RetryPolicy;
use super::type_sniff::{FALLBACK_EXT, ext_from_content_type, infer_extension};
use crate::base_system::file_cleaner::sweep_suffix;

/// 传输中的临时文件后缀；其他读取方不得视为有效缓存。
pub const PART_SUFFIX: &str = ".part";

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub root: PathBuf,
    pub max_bytes: u64,
    pub download_timeout: Duration,
    pub probe_timeout: Duration,
    pub retry: RetryPolicy,
}

type FetchResult = Result<PathBuf, FetchError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

pub struct MediaCache<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for MediaCache<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<C> {
    settings: CacheSettings,
    client: C,
    index: Mutex<PersistentIndex>,
    in_flight: Mutex<HashMap<ContentId, SharedFetch>>,
}

// 锁只在无 await 的临界区内持有，中毒后数据仍然一致
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn part_path(final_path: &Path) -> PathBuf {
    let mut s = final_path.as_os_str().to_owned();
    s.push(PART_SUFFIX);
    PathBuf::from(s)
}

async fn remove_quietly(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "删除临时文件失败: {err}");
        }
    }
}

impl<C: HttpClient> MediaCache<C> {
    /// 创建缓存目录、清理残留 `.part`、加载索引。
    pub fn open(settings: CacheSettings, client: C) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(&settings.root).map_err(|source| PersistenceError::Io {
            path: settings.root.clone(),
            source,
        })?;
        match sweep_suffix(&settings.root, PART_SUFFIX) {
            Ok(0) => {}
            Ok(n) => info!(root = %settings.root.display(), "清理了 {n} 个残留临时文件"),
            Err(err) => warn!(root = %settings.root.display(), "扫描缓存目录失败: {err}"),
        }
        let index = PersistentIndex::load(settings.root.join(INDEX_FILE_NAME));
        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                client,
                index: Mutex::new(index),
                in_flight: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub async fn fetch(&self, url: &str, group: Group) -> FetchResult {
        let id = identify(url);
        let (shared, joined) = {
            let mut in_flight = lock(&self.inner.in_flight);
            if let Some(pending) = in_flight.get(&id) {
                debug!(%group, %id, "joining in-flight fetch");
                (pending.clone(), true)
            } else {
                // 在途表与索引在同一临界区内检查，避免刚完成的下载被重复发起
                if let Some(path) = self.inner.cached_path(group, &id) {
                    debug!(%group, %id, "cache hit");
                    return Ok(path);
                }
                let shared = self.inner.spawn_download(url.to_string(), group, id.clone());
                in_flight.insert(id.clone(), shared.clone());
                (shared, false)
            }
        };
        let path = shared.await?;
        if joined {
            // 在途下载可能由其他分组发起，本分组也要登记
            self.inner.adopt(url, group, &id, &path).await;
        }
        Ok(path)
    }
}

impl<C> MediaCache<C> {
    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    #[cfg(test)]
    pub fn record(&self, group: Group, id: &ContentId) -> Option<ContentRecord> {
        lock(&self.inner.index).get(group, id).cloned()
    }

    pub fn counts(&self, group: Group) -> GroupCounts {
        lock(&self.inner.index).counts(group)
    }

    pub fn done_paths(&self, group: Group) -> Vec<PathBuf> {
        lock(&self.inner.index).done_paths(group)
    }

    #[cfg(test)]
    pub fn in_flight_len(&self) -> usize {
        lock(&self.inner.in_flight).len()
    }
}

impl<C> Inner<C> {
    fn cached_path(&self, group: Group, id: &ContentId) -> Option<PathBuf> {
        lock(&self.index)
            .get(group, id)
            .and_then(|r| r.done_path().map(Path::to_path_buf))
    }

    fn store(&self, group: Group, id: &ContentId, record: ContentRecord) {
        lock(&self.index).put(group, id, record);
    }

    fn final_path(&self, id: &ContentId, ext: &str) -> PathBuf {
        self.settings.root.join(format!("{id}{ext}"))
    }

    async fn adopt(&self, url: &str, group: Group, id: &ContentId, path: &Path) {
        if self.cached_path(group, id).is_some() {
            return;
        }
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(err) => {
                warn!(%group, path = %path.display(), "登记共享下载结果失败: {err}");
                return;
            }
        };
        let mut index = lock(&self.index);
        let attempts = index.get(group, id).map(|r| r.attempts).unwrap_or(0);
        let mut record = ContentRecord::pending(url, attempts);
        record.mark_done(path.to_path_buf(), size);
        index.put(group, id, record);
        debug!(%group, %id, "adopted in-flight result");
    }
}

impl<C: HttpClient> Inner<C> {
    /// 下载在独立任务中运行到结束，即使所有调用方都已放弃等待；
    /// 任务结束时由它自己移除在途登记。
    fn spawn_download(self: &Arc<Self>, url: String, group: Group, id: ContentId) -> SharedFetch {
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = inner.download(&url, group, &id).await;
            lock(&inner.in_flight).remove(&id);
            result
        });
        async move {
            task.await
                .unwrap_or_else(|err| Err(FetchError::transport(format!("download task failed: {err}"))))
        }
        .boxed()
        .shared()
    }

    async fn download(&self, url: &str, group: Group, id: &ContentId) -> FetchResult {
        let prior = lock(&self.index).get(group, id).map(|r| r.attempts).unwrap_or(0);
        let mut record = ContentRecord::pending(url, prior.saturating_add(1));
        self.store(group, id, record.clone());
        debug!(%group, %url, attempts = record.attempts, "download registered");

        let probe = self.probe(url).await;
        let limit = self.settings.max_bytes;
        if let Some(size) = probe.content_length.filter(|len| *len > limit) {
            record.mark_error();
            self.store(group, id, record);
            warn!(%group, %url, size, limit, "文件过大，跳过下载");
            return Err(FetchError::TooLarge { size, limit });
        }

        let ext = infer_extension(probe.content_type.as_deref(), Some(url));
        let final_path = self.final_path(id, ext);
        if let Ok(meta) = tokio::fs::metadata(&final_path).await {
            if meta.is_file() {
                record.mark_done(final_path.clone(), meta.len());
                self.store(group, id, record);
                info!(%group, path = %final_path.display(), "已存在本地文件，直接登记");
                return Ok(final_path);
            }
        }

        let policy = self.settings.retry;
        let max_attempts = policy.max_attempts();
        let mut last_err = FetchError::Transport("download failed".to_string());
        for attempt in 1..=max_attempts {
            match self.transfer(url, id, ext).await {
                Ok((path, size)) => {
                    record.mark_done(path.clone(), size);
                    self.store(group, id, record);
                    info!(%group, path = %path.display(), size, "下载完成");
                    return Ok(path);
                }
                Err(err) => {
                    warn!(%group, %url, attempt, max_attempts, "下载失败: {err}");
                    let again = err.is_retryable() && attempt < max_attempts;
                    last_err = err;
                    if !again {
                        break;
                    }
                    tokio::time::sleep(policy.next_delay(attempt)).await;
                }
            }
        }

        record.mark_error();
        self.store(group, id, record);
        Err(last_err)
    }

    async fn probe(&self, url: &str) -> ProbeInfo {
        match timeout(self.settings.probe_timeout, self.client.head(url)).await {
            Ok(Ok(info)) => info,
            Ok(Err(err)) => {
                debug!(%url, "HEAD probe failed, falling back to GET: {err}");
                ProbeInfo::default()
            }
            Err(_) => {
                debug!(%url, "HEAD probe timed out, falling back to GET");
                ProbeInfo::default()
            }
        }
    }

    /// 单次传输；任何失败都会删除残留的临时文件。
    async fn transfer(
        &self,
        url: &str,
        id: &ContentId,
        ext: &'static str,
    ) -> Result<(PathBuf, u64), FetchError> {
        let mut temp: Option<PathBuf> = None;
        let limit = self.settings.download_timeout;
        let result = match timeout(limit, self.stream_to_disk(url, id, ext, &mut temp)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Transport(format!(
                "timed out after {}ms",
                limit.as_millis()
            ))),
        };
        if result.is_err() {
            if let Some(temp) = temp {
                remove_quietly(&temp).await;
            }
        }
        result
    }

    async fn stream_to_disk(
        &self,
        url: &str,
        id: &ContentId,
        mut ext: &'static str,
        temp_slot: &mut Option<PathBuf>,
    ) -> Result<(PathBuf, u64), FetchError> {
        let resp = self.client.get(url).await.map_err(FetchError::transport)?;

        // 探测没拿到类型时，用 GET 响应头补救扩展名
        if ext == FALLBACK_EXT {
            if let Some(by_ct) = resp.content_type.as_deref().and_then(ext_from_content_type) {
                ext = by_ct;
            }
        }
        let final_path = self.final_path(id, ext);
        let temp_path = part_path(&final_path);
        *temp_slot = Some(temp_path.clone());

        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(FetchError::transport)?;
        let mut body = resp.body;
        let limit = self.settings.max_bytes;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(FetchError::transport)?;
            written += chunk.len() as u64;
            if written > limit {
                return Err(FetchError::TooLarge {
                    size: written,
                    limit,
                });
            }
            file.write_all(&chunk).await.map_err(FetchError::transport)?;
        }
        file.flush().await.map_err(FetchError::transport)?;
        file.sync_all().await.map_err(FetchError::transport)?;
        drop(file);

        tokio::fs::rename(&temp_path, &final_path)
            .await
            .map_err(FetchError::transport)?;
        // 以磁盘上的实际大小为准
        let size = tokio::fs::metadata(&final_path)
            .await
            .map_err(FetchError::transport)?
            .len();
        Ok((final_path, size))
    }
}
