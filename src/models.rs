// src/models.rs

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

/// 资源最终由哪一层提供
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Remote,
    Cache,
    Local,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Remote => "remote",
            SourceTag::Cache => "cache",
            SourceTag::Local => "local",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Ui,
    Video,
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssetCategory::Ui => "ui",
            AssetCategory::Video => "video",
        })
    }
}

/// 一个可解析的资源。
///
/// UI 资源的本地回退在静态目录，缓存在 `remote_cache` 下；
/// 视频的本地文件就是同步目标，两条路径相同。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub category: AssetCategory,
    pub local_path: PathBuf,
    pub cache_path: PathBuf,
}

/// 解析结果：内容与来源标记
#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub name: String,
    pub content: Vec<u8>,
    pub source: SourceTag,
}

/// 一次拉取 (fetch) 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 获取到新内容并已发布
    Downloaded { bytes: u64 },
    /// 远端内容未变化，只刷新了时间戳
    NotModified,
    /// 缓存仍在 TTL 内，未访问网络
    Fresh,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchMode {
    /// 跳过 TTL 与条件请求，强制重新下载
    pub force: bool,
    /// 缓存仍新鲜时直接跳过
    pub respect_ttl: bool,
}

/// 同步任务的类别键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncCategory {
    Ui,
    Videos,
    All,
}

impl SyncCategory {
    pub const ALL: [SyncCategory; 3] = [SyncCategory::Ui, SyncCategory::Videos, SyncCategory::All];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncCategory::Ui => "ui",
            SyncCategory::Videos => "videos",
            SyncCategory::All => "all",
        }
    }

    /// 该任务涉及的资源类别
    pub fn asset_categories(&self) -> &'static [AssetCategory] {
        match self {
            SyncCategory::Ui => &[AssetCategory::Ui],
            SyncCategory::Videos => &[AssetCategory::Video],
            SyncCategory::All => &[AssetCategory::Ui, AssetCategory::Video],
        }
    }
}

impl fmt::Display for SyncCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ui" | "assets" => Ok(SyncCategory::Ui),
            "videos" | "video" => Ok(SyncCategory::Videos),
            "all" | "" => Ok(SyncCategory::All),
            other => Err(format!("未知的同步类别 '{}'，可选: ui, videos, all", other)),
        }
    }
}
