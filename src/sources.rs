//! 各分组的 URL 来源列表（每个文件是一个 JSON 字符串数组）。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::base_system::context::Config;
use crate::media_cache::{Group, RoundRobin};

#[derive(Debug, Error)]
pub enum SourceLoadError {
    #[error("read source list for {group} at {path} failed: {source}")]
    Io {
        group: Group,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse source list for {group} at {path} failed: {source}")]
    Parse {
        group: Group,
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLists {
    lists: BTreeMap<Group, Vec<String>>,
}

impl SourceLists {
    /// 读取全部分组；任意一个文件缺失或格式错误都视为整体失败。
    pub fn load(cfg: &Config) -> Result<Self, SourceLoadError> {
        let mut lists = BTreeMap::new();
        for group in Group::ALL {
            let path = cfg.source_path(group);
            let urls = read_list(group, &path)?;
            debug!(%group, path = %path.display(), count = urls.len(), "source list loaded");
            lists.insert(group, urls);
        }
        let loaded = Self { lists };
        info!(total = loaded.total(), "来源列表加载完成");
        Ok(loaded)
    }

    pub fn total(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    /// 按 `Group::ALL` 顺序轮转。
    pub fn into_queue(self) -> RoundRobin<Group> {
        let mut lists = self.lists;
        RoundRobin::new(
            Group::ALL.map(|group| (group, lists.remove(&group).unwrap_or_default())),
        )
    }
}

fn read_list(group: Group, path: &Path) -> Result<Vec<String>, SourceLoadError> {
    let raw = fs::read(path).map_err(|source| SourceLoadError::Io {
        group,
        path: path.to_path_buf(),
        source,
    })?;
    let urls: Vec<String> = serde_json::from_slice(&raw).map_err(|source| SourceLoadError::Parse {
        group,
        path: path.to_path_buf(),
        source,
    })?;
    Ok(urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_with_sources(dir: &Path, files: [(&str, &str); 3]) -> Config {
        let mut cfg = Config::default();
        cfg.set_base_dir(Some(dir));
        for (name, body) in files {
            fs::write(dir.join(name), body).unwrap();
        }
        cfg.source_anime = files[0].0.to_string();
        cfg.source_girl = files[1].0.to_string();
        cfg.source_trai = files[2].0.to_string();
        cfg
    }

    #[test]
    fn loads_every_group_and_rotates() {
        let dir = TempDir::new().unwrap();
        let cfg = config_with_sources(
            dir.path(),
            [
                ("api.json", r#"["https://a/1.mp4", "https://a/2.mp4", "  "]"#),
                ("vdgai.json", r#"["https://g/1.mp4"]"#),
                ("trai.json", "[]"),
            ],
        );

        let lists = SourceLists::load(&cfg).unwrap();
        assert_eq!(lists.total(), 3);

        let order: Vec<_> = lists.into_queue().collect();
        assert_eq!(
            order,
            vec![
                (Group::Anime, "https://a/1.mp4".to_string()),
                (Group::Girl, "https://g/1.mp4".to_string()),
                (Group::Anime, "https://a/2.mp4".to_string()),
            ]
        );
    }

    #[test]
    fn missing_file_fails_with_group() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.set_base_dir(Some(dir.path()));
        let err = SourceLists::load(&cfg).unwrap_err();
        assert!(matches!(err, SourceLoadError::Io { group: Group::Anime, .. }));
    }

    #[test]
    fn malformed_file_fails_with_parse_error() {
        let dir = TempDir::new().unwrap();
        let cfg = config_with_sources(
            dir.path(),
            [("a.json", "[]"), ("g.json", r#"{"not":"a list"}"#), ("t.json", "[]")],
        );
        let err = SourceLists::load(&cfg).unwrap_err();
        assert!(matches!(err, SourceLoadError::Parse { group: Group::Girl, .. }));
    }
}
