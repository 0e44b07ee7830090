//! 由 Content-Type / URL 推断扩展名。

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Url;

pub const FALLBACK_EXT: &str = ".bin";

static RE_EXT: OnceLock<Regex> = OnceLock::new();

fn re_ext() -> &'static Regex {
    RE_EXT.get_or_init(|| {
        Regex::new(r"(?i)\.(mp4|webm|ogv|jpg|jpeg|png|gif|webp|apng)$").expect("compile RE_EXT")
    })
}

pub fn ext_from_content_type(content_type: &str) -> Option<&'static str> {
    let key = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let ext = match key.as_str() {
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "video/ogg" => ".ogv",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/apng" => ".apng",
        _ => return None,
    };
    Some(ext)
}

/// 仅看 URL 的 path 部分，查询串与片段不参与。
pub fn ext_from_url(url: &str) -> Option<&'static str> {
    let parsed = Url::parse(url).ok()?;
    let caps = re_ext().captures(parsed.path())?;
    let ext = match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
        "mp4" => ".mp4",
        "webm" => ".webm",
        "ogv" => ".ogv",
        "jpg" => ".jpg",
        "jpeg" => ".jpeg",
        "png" => ".png",
        "gif" => ".gif",
        "webp" => ".webp",
        "apng" => ".apng",
        _ => return None,
    };
    Some(ext)
}

pub fn infer_extension(content_type: Option<&str>, url: Option<&str>) -> &'static str {
    content_type
        .and_then(ext_from_content_type)
        .or_else(|| url.and_then(ext_from_url))
        .unwrap_or(FALLBACK_EXT)
}
