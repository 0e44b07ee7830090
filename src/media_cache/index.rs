//! 持久化索引：group → contentID → ContentRecord，每次变更后整体落盘。
//!
//! 文件格式（`index.json`）：
//! ```json
//! { "anime": { "<sha256>": { "url": "...", "path": null, "status": "pending", "attempts": 1, "size": 0 } },
//!   "girl": {}, "trai": {} }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::content_id::ContentId;
use super::error::PersistenceError;
use super::group::Group;

pub const INDEX_FILE_NAME: &str = "index.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub url: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub status: Status,
    // 旧版索引字段名为 tries
    #[serde(default, alias = "tries")]
    pub attempts: u32,
    #[serde(default)]
    pub size: u64,
}

impl ContentRecord {
    pub fn pending(url: &str, attempts: u32) -> Self {
        Self {
            url: url.to_string(),
            path: None,
            status: Status::Pending,
            attempts,
            size: 0,
        }
    }

    pub fn mark_done(&mut self, path: PathBuf, size: u64) {
        self.path = Some(path);
        self.size = size;
        self.status = Status::Done;
    }

    pub fn mark_error(&mut self) {
        self.status = Status::Error;
    }

    /// `Done` 且文件仍在磁盘上。
    pub fn done_path(&self) -> Option<&Path> {
        if self.status != Status::Done {
            return None;
        }
        self.path.as_deref().filter(|p| p.is_file())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GroupCounts {
    pub pending: usize,
    pub done: usize,
    pub error: usize,
    pub done_bytes: u64,
}

type GroupEntries = BTreeMap<ContentId, ContentRecord>;

#[derive(Debug)]
pub struct PersistentIndex {
    path: PathBuf,
    groups: BTreeMap<Group, GroupEntries>,
}

impl PersistentIndex {
    /// 读取索引；文件缺失或损坏时所有分组置空，从不失败。
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut groups = match fs::read(&path) {
            Ok(raw) => parse_groups(&path, &raw),
            Err(err) => {
                debug!(path = %path.display(), "index not loaded: {err}");
                BTreeMap::new()
            }
        };
        for group in Group::ALL {
            groups.entry(group).or_default();
        }
        Self { path, groups }
    }

    pub fn get(&self, group: Group, id: &ContentId) -> Option<&ContentRecord> {
        self.groups.get(&group).and_then(|g| g.get(id))
    }

    /// upsert 后立即整体落盘；落盘失败只告警，内存状态仍然有效。
    pub fn put(&mut self, group: Group, id: &ContentId, record: ContentRecord) {
        self.groups
            .entry(group)
            .or_default()
            .insert(id.clone(), record);
        if let Err(err) = self.save() {
            warn!(path = %self.path.display(), "索引落盘失败: {err}");
        }
    }

    pub fn save(&self) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(&self.groups)?;
        write_atomic(&self.path, &bytes).map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn done_paths(&self, group: Group) -> Vec<PathBuf> {
        self.groups
            .get(&group)
            .map(|g| {
                g.values()
                    .filter_map(|r| r.done_path().map(Path::to_path_buf))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn counts(&self, group: Group) -> GroupCounts {
        let mut counts = GroupCounts::default();
        for record in self.groups.get(&group).into_iter().flat_map(|g| g.values()) {
            match record.status {
                Status::Pending => counts.pending += 1,
                Status::Error => counts.error += 1,
                Status::Done => {
                    counts.done += 1;
                    counts.done_bytes += record.size;
                }
            }
        }
        counts
    }
}

fn parse_groups(path: &Path, raw: &[u8]) -> BTreeMap<Group, GroupEntries> {
    let parsed: BTreeMap<String, GroupEntries> = match serde_json::from_slice(raw) {
        Ok(v) => v,
        Err(err) => {
            warn!(path = %path.display(), "索引文件损坏，已忽略: {err}");
            return BTreeMap::new();
        }
    };
    let mut groups = BTreeMap::new();
    for (name, entries) in parsed {
        match name.parse::<Group>() {
            Ok(group) if group.as_str() == name => {
                groups.insert(group, entries);
            }
            _ => warn!(path = %path.display(), group = %name, "丢弃未知分组"),
        }
    }
    groups
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
