//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息，以及 `VD_*` 环境变量覆盖。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::config::{ConfigSpec, FieldMeta};
use crate::media_cache::{CacheSettings, Group, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 路径配置
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_source_anime")]
    pub source_anime: String,
    #[serde(default = "default_source_girl")]
    pub source_girl: String,
    #[serde(default = "default_source_trai")]
    pub source_trai: String,

    // 下载配置
    #[serde(default = "default_max_file_mb")]
    pub max_file_mb: u64,
    #[serde(default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
    #[serde(default = "default_retries_per_url")]
    pub retries_per_url: u32,
    #[serde(default = "default_min_wait_time")]
    pub min_wait_time: u64,
    #[serde(default = "default_max_wait_time")]
    pub max_wait_time: u64,
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    // 网络配置
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            source_anime: default_source_anime(),
            source_girl: default_source_girl(),
            source_trai: default_source_trai(),
            max_file_mb: default_max_file_mb(),
            download_timeout_ms: default_download_timeout_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            retries_per_url: default_retries_per_url(),
            min_wait_time: default_min_wait_time(),
            max_wait_time: default_max_wait_time(),
            retry_jitter_ms: default_retry_jitter_ms(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            base_dir: None,
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAME: &'static str = "config.yml";

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 14] = [
            FieldMeta {
                name: "cache_dir",
                description: "媒体缓存目录（相对数据目录），index.json 与缓存文件均存放于此",
            },
            FieldMeta {
                name: "source_anime",
                description: "anime 分组的 URL 列表文件（JSON 数组）",
            },
            FieldMeta {
                name: "source_girl",
                description: "girl 分组的 URL 列表文件（JSON 数组）",
            },
            FieldMeta {
                name: "source_trai",
                description: "trai 分组的 URL 列表文件（JSON 数组）",
            },
            FieldMeta {
                name: "max_file_mb",
                description: "单个文件大小上限（MB），环境变量 VD_MAX_FILE_MB 可覆盖",
            },
            FieldMeta {
                name: "download_timeout_ms",
                description: "单次下载超时（毫秒），环境变量 VD_DL_TIMEOUT 可覆盖",
            },
            FieldMeta {
                name: "probe_timeout_ms",
                description: "HEAD 探测超时（毫秒）",
            },
            FieldMeta {
                name: "max_concurrent_downloads",
                description: "预下载最大并发数，环境变量 VD_MAX_CONCURRENCY 可覆盖",
            },
            FieldMeta {
                name: "retries_per_url",
                description: "每个 URL 失败后的重试次数，环境变量 VD_DL_RETRIES 可覆盖",
            },
            FieldMeta {
                name: "min_wait_time",
                description: "重试最小冷却时间, 单位ms",
            },
            FieldMeta {
                name: "max_wait_time",
                description: "重试最大冷却时间, 单位ms",
            },
            FieldMeta {
                name: "retry_jitter_ms",
                description: "重试冷却的随机抖动上限, 单位ms",
            },
            FieldMeta {
                name: "user_agent",
                description: "下载请求使用的 User-Agent",
            },
            FieldMeta {
                name: "max_redirects",
                description: "最大重定向次数",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn set_base_dir(&mut self, dir: Option<&Path>) {
        self.base_dir = dir.map(Path::to_path_buf);
    }

    fn resolve(&self, raw: &str) -> PathBuf {
        let p = PathBuf::from(raw.trim());
        if p.is_absolute() {
            return p;
        }
        match &self.base_dir {
            Some(base) => base.join(p),
            None => p,
        }
    }

    pub fn cache_root(&self) -> PathBuf {
        self.resolve(&self.cache_dir)
    }

    pub fn source_path(&self, group: Group) -> PathBuf {
        let raw = match group {
            Group::Anime => &self.source_anime,
            Group::Girl => &self.source_girl,
            Group::Trai => &self.source_trai,
        };
        self.resolve(raw)
    }

    /// 应用 `VD_*` 环境变量覆盖；非法值忽略并告警。
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override::<u64>(&lookup, "VD_MAX_FILE_MB") {
            self.max_file_mb = v;
        }
        if let Some(v) = parse_override::<u64>(&lookup, "VD_DL_TIMEOUT") {
            self.download_timeout_ms = v;
        }
        if let Some(v) = parse_override::<usize>(&lookup, "VD_MAX_CONCURRENCY") {
            self.max_concurrent_downloads = v;
        }
        if let Some(v) = parse_override::<u32>(&lookup, "VD_DL_RETRIES") {
            self.retries_per_url = v;
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries_per_url,
            min_wait: Duration::from_millis(self.min_wait_time),
            max_wait: Duration::from_millis(self.max_wait_time.max(self.min_wait_time)),
            jitter: Duration::from_millis(self.retry_jitter_ms),
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            root: self.cache_root(),
            max_bytes: self.max_file_mb.saturating_mul(1024 * 1024),
            download_timeout: Duration::from_millis(self.download_timeout_ms.max(1)),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms.max(1)),
            retry: self.retry_policy(),
        }
    }

    pub fn prefetch_workers(&self) -> usize {
        self.max_concurrent_downloads.max(1)
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(target: "config", "忽略非法的环境变量 {key}={raw}");
            None
        }
    }
}

fn default_cache_dir() -> String {
    "data/video".to_string()
}

fn default_source_anime() -> String {
    "includes/listapi/video/api.json".to_string()
}

fn default_source_girl() -> String {
    "includes/listapi/video/vdgai.json".to_string()
}

fn default_source_trai() -> String {
    "includes/listapi/video/trai.json".to_string()
}

fn default_max_file_mb() -> u64 {
    25
}

fn default_download_timeout_ms() -> u64 {
    30_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_max_concurrent_downloads() -> usize {
    3
}

fn default_retries_per_url() -> u32 {
    2
}

fn default_min_wait_time() -> u64 {
    300
}

fn default_max_wait_time() -> u64 {
    3_000
}

fn default_retry_jitter_ms() -> u64 {
    700
}

fn default_user_agent() -> String {
    "bot-messenger/1.0".to_string()
}

fn default_max_redirects() -> usize {
    3
}
