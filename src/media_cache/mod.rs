//! 媒体缓存：按 URL 内容寻址的本地下载缓存。
//!
//! - `fetch`：单次下载引擎（在途合并、大小限制、重试、原子落盘）
//! - `index`：持久化索引
//! - `prefetch` / `scheduler`：启动时的多来源轮转预取
//! - `serve`：随机挑选已缓存文件

pub mod content_id;
pub mod error;
pub mod fetch;
pub mod group;
pub mod http;
pub mod index;
pub mod prefetch;
pub mod retry;
pub mod scheduler;
pub mod serve;
pub mod type_sniff;

#[cfg(test)]
pub(crate) mod testing;

pub use error::PersistenceError;
pub use fetch::{CacheSettings, MediaCache};
pub use group::Group;
pub use http::{HttpClient, ReqwestClient};
pub use prefetch::{PrefetchReport, PrefetchRunner};
pub use retry::RetryPolicy;
pub use scheduler::RoundRobin;
