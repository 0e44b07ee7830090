use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, redirect};

use super::error::HttpError;
use crate::base_system::context::Config;

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send + 'static>>;

/// HEAD 探测得到的元数据；探测失败时为空。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeInfo {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

pub struct BodyResponse {
    pub content_type: Option<String>,
    pub body: BodyStream,
}

/// 下载引擎所需的最小 HTTP 能力。超时由调用方包裹，实现方只负责请求本身。
pub trait HttpClient: Send + Sync + 'static {
    fn head(&self, url: &str) -> impl Future<Output = Result<ProbeInfo, HttpError>> + Send;

    fn get(&self, url: &str) -> impl Future<Output = Result<BodyResponse, HttpError>> + Send;
}

impl<T: HttpClient> HttpClient for Arc<T> {
    fn head(&self, url: &str) -> impl Future<Output = Result<ProbeInfo, HttpError>> + Send {
        (**self).head(url)
    }

    fn get(&self, url: &str) -> impl Future<Output = Result<BodyResponse, HttpError>> + Send {
        (**self).get(url)
    }
}

pub struct ReqwestClient {
    client: Client,
    probe_timeout: Duration,
}

impl ReqwestClient {
    pub fn from_config(cfg: &Config) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        // reqwest is built without decompression; ask for raw bytes so sizes match on disk.
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(cfg.user_agent.clone())
            .redirect(redirect::Policy::limited(cfg.max_redirects))
            .timeout(Duration::from_millis(cfg.download_timeout_ms.max(1)))
            .build()?;

        Ok(Self {
            client,
            probe_timeout: Duration::from_millis(cfg.probe_timeout_ms.max(1)),
        })
    }
}

fn check_status(resp: Response) -> Result<Response, HttpError> {
    let status = resp.status().as_u16();
    if (200..400).contains(&status) {
        Ok(resp)
    } else {
        Err(HttpError::Status(status))
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl HttpClient for ReqwestClient {
    async fn head(&self, url: &str) -> Result<ProbeInfo, HttpError> {
        let resp = self
            .client
            .head(url)
            .timeout(self.probe_timeout)
            .send()
            .await?;
        let resp = check_status(resp)?;
        let headers = resp.headers();
        Ok(ProbeInfo {
            content_type: header_string(headers, CONTENT_TYPE),
            content_length: header_string(headers, CONTENT_LENGTH).and_then(|s| s.parse().ok()),
        })
    }

    async fn get(&self, url: &str) -> Result<BodyResponse, HttpError> {
        let resp = check_status(self.client.get(url).send().await?)?;
        let content_type = header_string(resp.headers(), CONTENT_TYPE);
        let body = resp.bytes_stream().map(|chunk| chunk.map_err(HttpError::from));
        Ok(BodyResponse {
            content_type,
            body: Box::pin(body),
        })
    }
}
