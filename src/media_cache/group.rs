use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 固定的媒体分组；顺序即轮询顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Anime,
    Girl,
    Trai,
}

impl Group {
    pub const ALL: [Group; 3] = [Group::Anime, Group::Girl, Group::Trai];

    pub fn as_str(self) -> &'static str {
        match self {
            Group::Anime => "anime",
            Group::Girl => "girl",
            Group::Trai => "trai",
        }
    }

    /// 聊天命令参数到分组：`anime` / `gái` / `gai` / `trai`（大小写不敏感）。
    pub fn from_alias(raw: &str) -> Option<Group> {
        match raw.trim().to_lowercase().as_str() {
            "anime" => Some(Group::Anime),
            "gái" | "gai" | "girl" => Some(Group::Girl),
            "trai" => Some(Group::Trai),
            _ => None,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Group {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Group::from_alias(s).ok_or_else(|| format!("unknown group: {s}"))
    }
}
