//! 缓存与临时文件清理。

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

/// 删除目录下所有以 `suffix` 结尾的残留文件（上次进程中断留下的 `.part`），返回删除数量。
pub fn sweep_suffix(dir: impl AsRef<Path>, suffix: &str) -> io::Result<usize> {
    let dir = dir.as_ref();
    let mut removed = 0usize;
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(suffix))
            .unwrap_or(false);
        if !matches {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale temp file");
                removed += 1;
            }
            Err(err) => warn!(path = %path.display(), "清理临时文件失败: {err}"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn only_matching_suffix_is_removed() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.mp4.part"), b"half").unwrap();
        fs::write(dir.path().join("b.mp4"), b"whole").unwrap();
        fs::write(dir.path().join("index.json"), b"{}").unwrap();
        fs::create_dir(dir.path().join("nested.part")).unwrap();

        let removed = sweep_suffix(dir.path(), ".part").unwrap();
        assert_eq!(removed, 1);
        assert!(!dir.path().join("a.mp4.part").exists());
        assert!(dir.path().join("b.mp4").exists());
        assert!(dir.path().join("nested.part").exists());
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(sweep_suffix(dir.path().join("nope"), ".part").is_err());
    }
}
