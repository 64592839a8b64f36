// src/assets/fetch.rs

use crate::{
    cache::{CacheEntry, CacheStore},
    client::RobustClient,
    config::{ConfigHandle, RemoteSource},
    constants,
    error::{AppError, AppResult},
    models::{Asset, AssetCategory, FetchMode, FetchOutcome},
    utils,
};
use chrono::Utc;
use futures::StreamExt;
use log::{debug, info, warn};
use md5::{Digest, Md5};
use reqwest::{StatusCode, header};
use std::{
    collections::HashMap,
    io::Write,
    sync::Mutex,
    time::{Duration, Instant},
};
use tempfile::NamedTempFile;

/// 远程拉取路径，页面请求和后台同步共用。
pub struct Fetcher {
    http: RobustClient,
    store: CacheStore,
    config: ConfigHandle,
    last_fail: Mutex<HashMap<AssetCategory, Instant>>,
}

impl Fetcher {
    pub fn new(http: RobustClient, store: CacheStore, config: ConfigHandle) -> Self {
        Self {
            http,
            store,
            config,
            last_fail: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// 该类别是否处于失败冷却期
    pub fn in_cooldown(&self, category: AssetCategory) -> bool {
        let cooldown = self.config.remote_source(category).fail_cooldown;
        if cooldown.is_zero() {
            return false;
        }
        self.last_fail
            .lock()
            .unwrap()
            .get(&category)
            .is_some_and(|at| at.elapsed() < cooldown)
    }

    fn record_failure(&self, category: AssetCategory) {
        self.last_fail.lock().unwrap().insert(category, Instant::now());
    }

    fn record_success(&self, category: AssetCategory) {
        self.last_fail.lock().unwrap().remove(&category);
    }

    /// 拉取一个资源并在必要时发布到缓存。
    ///
    /// `with_retry` 为 true 时使用带重试的客户端（后台同步）。
    pub async fn fetch(&self, asset: &Asset, mode: FetchMode, with_retry: bool) -> AppResult<FetchOutcome> {
        let source = self.config.remote_source(asset.category);
        let url = source.url_for(&asset.name).ok_or_else(|| {
            AppError::ConfigMissing(format!("{} 类资源未配置远程 base_url", asset.category))
        })?;

        let result = self.fetch_from(asset, &source, &url, mode, with_retry).await;
        match &result {
            Ok(outcome) => {
                self.record_success(asset.category);
                debug!("拉取 '{}' -> {:?}", asset.name, outcome);
            }
            Err(e) if e.is_remote_failure() => {
                self.record_failure(asset.category);
                warn!("远程拉取失败 GET {}: {}", url, e);
            }
            Err(e) => warn!("拉取 '{}' 失败: {}", asset.name, e),
        }
        result
    }

    async fn fetch_from(
        &self,
        asset: &Asset,
        source: &RemoteSource,
        url: &str,
        mode: FetchMode,
        with_retry: bool,
    ) -> AppResult<FetchOutcome> {
        let current = self.store.verify(asset);

        if mode.respect_ttl
            && !mode.force
            && let Some(entry) = &current
            && entry.is_fresh(source.cache_ttl, Utc::now())
        {
            return Ok(FetchOutcome::Fresh);
        }

        let mut req = self.http.pick(with_retry).get(url);
        if mode.force {
            let buster = Utc::now().timestamp_millis().to_string();
            req = req.query(&[(constants::remote::CACHE_BUSTER_PARAM, buster.as_str())]);
        } else if let Some(entry) = &current {
            if !entry.etag.is_empty() {
                req = req.header(header::IF_NONE_MATCH, entry.etag.as_str());
            }
            if !entry.last_modified.is_empty() {
                req = req.header(header::IF_MODIFIED_SINCE, entry.last_modified.as_str());
            }
        }

        let res = with_timeout(source.timeout, req.send()).await??;
        let status = res.status();

        if status == StatusCode::NOT_MODIFIED {
            return match &current {
                Some(entry) => {
                    self.store.touch(asset, entry)?;
                    Ok(FetchOutcome::NotModified)
                }
                None => Err(AppError::RemoteUnavailable(format!("{} 返回 304 但本地无缓存", url))),
            };
        }
        if !status.is_success() {
            return Err(AppError::RemoteUnavailable(format!("{} 返回 HTTP {}", url, status)));
        }

        let etag = header_str(&res, header::ETAG);
        let last_modified = header_str(&res, header::LAST_MODIFIED);
        let entry = CacheEntry::new(url, &etag, &last_modified, status.as_u16());

        match asset.category {
            AssetCategory::Ui => {
                let body = with_timeout(source.timeout, res.bytes()).await??;
                if body.is_empty() {
                    return Err(AppError::RemoteUnavailable(format!("{} 返回空内容", url)));
                }
                let md5 = utils::md5_hex(&body);
                if let Some(prev) = &current
                    && prev.md5 == md5
                {
                    self.store.touch(asset, &CacheEntry { size: prev.size, md5, ..entry })?;
                    return Ok(FetchOutcome::NotModified);
                }
                let committed = self.store.stage(asset, entry, &body)?.commit()?;
                info!("已更新缓存 '{}' ({} 字节)", asset.name, committed.size);
                Ok(FetchOutcome::Downloaded { bytes: committed.size })
            }
            AssetCategory::Video => self.stream_to_cache(asset, source, res, entry, current).await,
        }
    }

    /// 边下载边计算 MD5，写入目标目录中的临时文件后再发布。
    async fn stream_to_cache(
        &self,
        asset: &Asset,
        source: &RemoteSource,
        res: reqwest::Response,
        mut entry: CacheEntry,
        current: Option<CacheEntry>,
    ) -> AppResult<FetchOutcome> {
        let dir = asset
            .cache_path
            .parent()
            .ok_or_else(|| AppError::BadRequest(format!("无效的视频路径: {:?}", asset.cache_path)))?;
        std::fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        let mut hasher = Md5::new();
        let mut total: u64 = 0;

        let mut stream = res.bytes_stream();
        while let Some(chunk) = with_timeout(source.timeout, stream.next()).await? {
            let chunk = chunk?;
            tmp.write_all(&chunk)?;
            hasher.update(&chunk);
            total += chunk.len() as u64;
        }
        if total == 0 {
            return Err(AppError::RemoteUnavailable(format!("{} 返回空内容", entry.url)));
        }
        tmp.as_file().sync_all()?;

        entry.size = total;
        entry.md5 = hex::encode(hasher.finalize());

        if let Some(prev) = &current
            && prev.md5 == entry.md5
        {
            // 内容相同，临时文件随 tmp 一起删除
            self.store.touch(asset, &entry)?;
            return Ok(FetchOutcome::NotModified);
        }

        let committed = self.store.stage_file(asset, entry, tmp)?.commit()?;
        info!("已更新视频 '{}' ({} 字节)", asset.name, committed.size);
        Ok(FetchOutcome::Downloaded { bytes: committed.size })
    }
}

async fn with_timeout<F: std::future::Future>(limit: Duration, fut: F) -> AppResult<F::Output> {
    if limit.is_zero() {
        return Ok(fut.await);
    }
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| AppError::RemoteUnavailable(format!("请求超时 ({:.1}s)", limit.as_secs_f64())))
}

fn header_str(res: &reqwest::Response, name: header::HeaderName) -> String {
    res.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
