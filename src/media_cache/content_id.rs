//! URL → 内容标识（磁盘文件名与索引键）。

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256(url) 的小写十六进制。跨进程稳定，索引重启后仍有效。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn identify(url: &str) -> ContentId {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    ContentId(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_and_fixed_length() {
        let a = identify("https://x/vid.mp4");
        let b = identify("https://x/vid.mp4");
        assert_eq!(a, b);
        let hex = a.to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn known_digest() {
        // sha256("abc")
        assert_eq!(
            identify("abc").to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn near_identical_urls_differ() {
        let urls = [
            "https://x/vid.mp4",
            "https://x/vid.mp4?",
            "https://x/Vid.mp4",
            "http://x/vid.mp4",
            "https://x/vid.mp4 ",
        ];
        let ids: std::collections::HashSet<_> = urls.iter().map(|u| identify(u)).collect();
        assert_eq!(ids.len(), urls.len());
    }
}
