// src/assets/resolver.rs

use super::{
    catalog::AssetCatalog,
    fetch::Fetcher,
    tiers::{FreshCacheTier, LocalTier, RemoteTier, Tier},
};
use crate::{
    error::{AppError, AppResult},
    models::{Asset, FetchMode, FetchOutcome, ResolvedAsset},
};
use log::{debug, warn};
use std::sync::Arc;

/// 资源解析器：新鲜缓存 -> 远程 -> 本地，顺序固定。
#[derive(Clone)]
pub struct AssetResolver {
    catalog: AssetCatalog,
    fetcher: Arc<Fetcher>,
    tiers: Arc<Vec<Box<dyn Tier>>>,
}

impl AssetResolver {
    pub fn new(catalog: AssetCatalog, fetcher: Arc<Fetcher>) -> Self {
        let tiers: Vec<Box<dyn Tier>> = vec![
            Box::new(FreshCacheTier::new(fetcher.clone())),
            Box::new(RemoteTier::new(fetcher.clone())),
            Box::new(LocalTier),
        ];
        Self {
            catalog,
            fetcher,
            tiers: Arc::new(tiers),
        }
    }

    pub fn catalog(&self) -> &AssetCatalog {
        &self.catalog
    }

    /// 按名称解析 UI 资源（请求路径）
    pub async fn resolve(&self, name: &str) -> AppResult<ResolvedAsset> {
        let asset = self.catalog.lookup_page(name)?;
        self.resolve_asset(&asset).await
    }

    pub async fn resolve_asset(&self, asset: &Asset) -> AppResult<ResolvedAsset> {
        for tier in self.tiers.iter() {
            match tier.try_resolve(asset).await {
                Ok(Some(resolved)) => {
                    debug!("'{}' 由 {} 层提供", asset.name, tier.name());
                    return Ok(resolved);
                }
                Ok(None) => continue,
                Err(e @ AppError::CacheCorrupt(_)) => {
                    warn!("{} 层读取 '{}' 失败: {}", tier.name(), asset.name, e);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(AppError::NotFound(format!("'{}'", asset.name)))
    }

    /// 后台同步使用的拉取路径（忽略冷却期，带重试）
    pub async fn fetch(&self, asset: &Asset, mode: FetchMode) -> AppResult<FetchOutcome> {
        self.fetcher.fetch(asset, mode, true).await
    }
}
