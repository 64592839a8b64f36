// src/assets/tiers.rs

use super::fetch::Fetcher;
use crate::{
    error::AppResult,
    models::{Asset, FetchMode, FetchOutcome, ResolvedAsset, SourceTag},
};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use std::sync::Arc;

/// 解析链中的一层。返回 `Ok(None)` 表示交给下一层。
#[async_trait]
pub trait Tier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn try_resolve(&self, asset: &Asset) -> AppResult<Option<ResolvedAsset>>;
}

/// 缓存仍在 TTL 内：直接返回，不访问网络。
pub struct FreshCacheTier {
    fetcher: Arc<Fetcher>,
}

impl FreshCacheTier {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Tier for FreshCacheTier {
    fn name(&self) -> &'static str {
        "fresh-cache"
    }

    async fn try_resolve(&self, asset: &Asset) -> AppResult<Option<ResolvedAsset>> {
        let source = self.fetcher.config().remote_source(asset.category);
        if !source.is_enabled() {
            return Ok(None);
        }
        let Some((entry, content)) = self.fetcher.store().load(asset) else {
            return Ok(None);
        };
        if !entry.is_fresh(source.cache_ttl, Utc::now()) {
            return Ok(None);
        }
        Ok(Some(ResolvedAsset {
            name: asset.name.clone(),
            content,
            source: SourceTag::Cache,
        }))
    }
}

/// 条件请求远程源。任何失败都只记录日志并交给本地回退，缓存保持不变。
pub struct RemoteTier {
    fetcher: Arc<Fetcher>,
}

impl RemoteTier {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Tier for RemoteTier {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn try_resolve(&self, asset: &Asset) -> AppResult<Option<ResolvedAsset>> {
        let source = self.fetcher.config().remote_source(asset.category);
        if !source.is_enabled() {
            return Ok(None);
        }
        if self.fetcher.in_cooldown(asset.category) {
            debug!("远程源处于冷却期，跳过 '{}'", asset.name);
            return Ok(None);
        }

        let mode = FetchMode {
            force: false,
            respect_ttl: false,
        };
        let tag = match self.fetcher.fetch(asset, mode, false).await {
            Ok(FetchOutcome::Downloaded { .. }) => SourceTag::Remote,
            Ok(FetchOutcome::NotModified | FetchOutcome::Fresh) => SourceTag::Cache,
            Err(_) => return Ok(None),
        };
        match self.fetcher.store().load(asset) {
            Some((_, content)) => Ok(Some(ResolvedAsset {
                name: asset.name.clone(),
                content,
                source: tag,
            })),
            None => {
                warn!("'{}' 发布后无法读回缓存", asset.name);
                Ok(None)
            }
        }
    }
}

/// 内置静态文件
pub struct LocalTier;

#[async_trait]
impl Tier for LocalTier {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn try_resolve(&self, asset: &Asset) -> AppResult<Option<ResolvedAsset>> {
        match tokio::fs::read(&asset.local_path).await {
            Ok(content) => Ok(Some(ResolvedAsset {
                name: asset.name.clone(),
                content,
                source: SourceTag::Local,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
