// src/cache.rs

//! 远程缓存元数据存储。
//!
//! 每个缓存文件旁边有一个 `<file>.meta.json` 边车文件，记录来源 URL、校验令牌
//! (ETag / Last-Modified)、抓取时间以及内容的大小和 MD5。
//! 发布新内容时先把内容和边车分别写入同目录临时文件，再在写锁内依次 rename；
//! 读取时持有读锁，并用边车中的大小和 MD5 校验内容，不一致即视为缓存不存在。

use crate::{
    constants,
    error::{AppError, AppResult},
    models::Asset,
    utils,
};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Duration,
};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub last_modified: String,
    pub fetched_at: DateTime<Utc>,
    pub size: u64,
    pub md5: String,
    #[serde(default)]
    pub status: u16,
}

impl CacheEntry {
    pub fn new(url: impl Into<String>, etag: &str, last_modified: &str, status: u16) -> Self {
        Self {
            url: url.into(),
            etag: etag.to_string(),
            last_modified: last_modified.to_string(),
            fetched_at: Utc::now(),
            size: 0,
            md5: String::new(),
            status,
        }
    }

    /// 抓取时间距今是否仍在 TTL 内
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        if ttl.is_zero() {
            return false;
        }
        utils::secs_between(self.fetched_at, now) < ttl.as_secs_f64()
    }
}

pub fn sidecar_path(content_path: &Path) -> PathBuf {
    let mut os: OsString = content_path.as_os_str().to_owned();
    os.push(constants::META_SUFFIX);
    PathBuf::from(os)
}

/// 进程内共享的缓存存储，克隆后共用同一把锁。
#[derive(Clone, Default)]
pub struct CacheStore {
    lock: Arc<RwLock<()>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取边车，并以流式 MD5 完整校验内容文件（适合大文件）。
    pub fn verify(&self, asset: &Asset) -> Option<CacheEntry> {
        let _guard = self.lock.read().unwrap();
        match read_entry(&asset.cache_path) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("忽略缓存 '{}': {}", asset.name, e);
                None
            }
        }
    }

    /// 读取并校验缓存内容，返回边车与完整内容。
    pub fn load(&self, asset: &Asset) -> Option<(CacheEntry, Vec<u8>)> {
        let _guard = self.lock.read().unwrap();
        match load_pair(&asset.cache_path) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("忽略缓存 '{}': {}", asset.name, e);
                None
            }
        }
    }

    /// 把内存中的内容暂存为临时文件，`commit` 之后才对读者可见。
    pub fn stage(&self, asset: &Asset, mut entry: CacheEntry, content: &[u8]) -> AppResult<StagedWrite> {
        let dir = parent_dir(&asset.cache_path)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;

        entry.size = content.len() as u64;
        entry.md5 = utils::md5_hex(content);
        self.stage_file(asset, entry, tmp)
    }

    /// 暂存一个已经写好的临时文件（流式下载的视频）。
    /// 调用方负责在 `entry` 中填好 size 和 md5。
    pub fn stage_file(&self, asset: &Asset, entry: CacheEntry, content: NamedTempFile) -> AppResult<StagedWrite> {
        let dir = parent_dir(&asset.cache_path)?;
        let sidecar = write_sidecar_tmp(&dir, &entry)?;
        Ok(StagedWrite {
            content,
            sidecar,
            content_path: asset.cache_path.clone(),
            sidecar_path: sidecar_path(&asset.cache_path),
            entry,
            lock: self.lock.clone(),
        })
    }

    /// 内容未变化时只刷新抓取时间（以及新的校验令牌）。
    ///
    /// 只有磁盘上的边车仍描述同一份内容 (size 与 md5 相同) 时才写回；
    /// 期间已被别人发布了新内容则放弃刷新并返回 None。
    pub fn touch(&self, asset: &Asset, entry: &CacheEntry) -> AppResult<Option<CacheEntry>> {
        let mut refreshed = entry.clone();
        refreshed.fetched_at = Utc::now();
        let dir = parent_dir(&asset.cache_path)?;
        let tmp = write_sidecar_tmp(&dir, &refreshed)?;

        let _guard = self.lock.write().unwrap();
        let on_disk = parse_sidecar(&asset.cache_path).ok().flatten();
        match on_disk {
            Some(current) if current.size == entry.size && current.md5.eq_ignore_ascii_case(&entry.md5) => {
                tmp.persist(sidecar_path(&asset.cache_path))?;
                debug!("刷新缓存时间戳: {}", asset.name);
                Ok(Some(refreshed))
            }
            _ => {
                debug!("缓存 '{}' 已被替换，跳过时间戳刷新", asset.name);
                Ok(None)
            }
        }
    }
}

/// 一次尚未发布的写入。丢弃时临时文件会被删除，原有缓存保持不变。
pub struct StagedWrite {
    content: NamedTempFile,
    sidecar: NamedTempFile,
    content_path: PathBuf,
    sidecar_path: PathBuf,
    entry: CacheEntry,
    lock: Arc<RwLock<()>>,
}

impl StagedWrite {
    /// 在写锁内先替换内容，再替换边车。
    pub fn commit(self) -> AppResult<CacheEntry> {
        let StagedWrite {
            content,
            sidecar,
            content_path,
            sidecar_path,
            entry,
            lock,
        } = self;
        let _guard = lock.write().unwrap();
        content.persist(&content_path)?;
        sidecar.persist(&sidecar_path)?;
        debug!("已发布缓存: {:?} ({} 字节)", content_path, entry.size);
        Ok(entry)
    }
}

fn parent_dir(path: &Path) -> AppResult<PathBuf> {
    let dir = path
        .parent()
        .ok_or_else(|| AppError::BadRequest(format!("无效的缓存路径: {:?}", path)))?;
    fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}

fn write_sidecar_tmp(dir: &Path, entry: &CacheEntry) -> AppResult<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, entry)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

fn parse_sidecar(content_path: &Path) -> AppResult<Option<CacheEntry>> {
    let meta_path = sidecar_path(content_path);
    let raw = match fs::read(&meta_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let entry = serde_json::from_slice(&raw)
        .map_err(|e| AppError::CacheCorrupt(format!("{:?}: {}", meta_path, e)))?;
    Ok(Some(entry))
}

fn read_entry(content_path: &Path) -> AppResult<Option<CacheEntry>> {
    let Some(entry) = parse_sidecar(content_path)? else {
        return Ok(None);
    };
    let actual_size = match fs::metadata(content_path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::CacheCorrupt(format!("{:?} 缺少内容文件", content_path)));
        }
        Err(e) => return Err(e.into()),
    };
    if actual_size != entry.size {
        return Err(AppError::CacheCorrupt(format!(
            "{:?} 大小不符 (边车: {}, 实际: {})",
            content_path, entry.size, actual_size
        )));
    }
    let actual_md5 = utils::calculate_file_md5(content_path)?;
    if !actual_md5.eq_ignore_ascii_case(&entry.md5) {
        return Err(AppError::CacheCorrupt(format!("{:?} MD5 不符", content_path)));
    }
    Ok(Some(entry))
}

fn load_pair(content_path: &Path) -> AppResult<Option<(CacheEntry, Vec<u8>)>> {
    let Some(entry) = parse_sidecar(content_path)? else {
        return Ok(None);
    };
    let content = match fs::read(content_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::CacheCorrupt(format!("{:?} 缺少内容文件", content_path)));
        }
        Err(e) => return Err(e.into()),
    };
    if content.len() as u64 != entry.size || !utils::md5_hex(&content).eq_ignore_ascii_case(&entry.md5) {
        return Err(AppError::CacheCorrupt(format!(
            "{:?} 内容与边车不一致",
            content_path
        )));
    }
    Ok(Some((entry, content)))
}
