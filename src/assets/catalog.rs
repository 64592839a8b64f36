// src/assets/catalog.rs

use crate::{
    config::ConfigHandle,
    constants,
    error::{AppError, AppResult},
    models::{Asset, AssetCategory},
    utils,
};
use log::{debug, info};
use std::path::PathBuf;

/// 已知资源目录：UI 文件来自配置的文件列表，视频来自 `remote_videos.files`。
#[derive(Clone)]
pub struct AssetCatalog {
    static_dir: PathBuf,
    cache_dir: PathBuf,
    config: ConfigHandle,
}

impl AssetCatalog {
    pub fn new(static_dir: PathBuf, cache_dir: PathBuf, config: ConfigHandle) -> Self {
        Self {
            static_dir,
            cache_dir,
            config,
        }
    }

    /// 按相对路径构造一个 UI 资源（不要求在目录中）
    pub fn ui_asset(&self, name: &str) -> AppResult<Asset> {
        let rel = utils::safe_relpath(name)
            .ok_or_else(|| AppError::NotFound(format!("非法的资源路径 '{}'", name)))?;
        Ok(Asset {
            local_path: utils::secure_join_path(&self.static_dir, &rel)?,
            cache_path: utils::secure_join_path(&self.cache_dir, &rel)?,
            name: rel,
            category: AssetCategory::Ui,
        })
    }

    pub fn ui_assets(&self) -> AppResult<Vec<Asset>> {
        let files = self.config.snapshot().remote_assets.files;
        files.iter().map(|f| self.ui_asset(f)).collect()
    }

    /// (视频键, 资源)；视频的本地文件即同步目标
    pub fn video_assets(&self) -> AppResult<Vec<(String, Asset)>> {
        let cfg = self.config.snapshot();
        let video_dir = cfg.video_dir();
        cfg.remote_videos
            .files
            .iter()
            .map(|(key, file)| {
                let rel = utils::safe_relpath(file).ok_or_else(|| {
                    AppError::ConfigMissing(format!("视频 '{}' 的文件名无效: '{}'", key, file))
                })?;
                let path = utils::secure_join_path(&video_dir, &rel)?;
                Ok((
                    key.clone(),
                    Asset {
                        name: rel,
                        category: AssetCategory::Video,
                        local_path: path.clone(),
                        cache_path: path,
                    },
                ))
            })
            .collect()
    }

    pub fn assets_for(&self, category: AssetCategory) -> AppResult<Vec<(String, Asset)>> {
        match category {
            AssetCategory::Ui => Ok(self
                .ui_assets()?
                .into_iter()
                .map(|a| (a.name.clone(), a))
                .collect()),
            AssetCategory::Video => self.video_assets(),
        }
    }

    /// HTTP 请求路径 -> 资源。`api/` 前缀、缓存边车文件与非法路径一律 404。
    ///
    /// 不在目录中的路径作为临时 UI 资源处理：只要本地存在或配置了远程源即可。
    pub fn lookup_page(&self, raw_path: &str) -> AppResult<Asset> {
        let rel = utils::safe_relpath(raw_path)
            .ok_or_else(|| AppError::NotFound(format!("'{}'", raw_path)))?;
        if rel == "api" || rel.starts_with("api/") || rel.ends_with(constants::META_SUFFIX) {
            return Err(AppError::NotFound(format!("'{}'", rel)));
        }
        let asset = self.ui_asset(&rel)?;
        let catalogued = self
            .config
            .snapshot()
            .remote_assets
            .files
            .iter()
            .any(|f| utils::safe_relpath(f).as_deref() == Some(rel.as_str()));
        if !catalogued {
            let remote_enabled = self.config.remote_source(AssetCategory::Ui).is_enabled();
            if !remote_enabled && !asset.local_path.is_file() {
                return Err(AppError::NotFound(format!("'{}'", rel)));
            }
            debug!("临时资源: {}", rel);
        }
        Ok(asset)
    }

    /// 启动检查：每个已登记的 UI 资源都必须有本地回退文件。
    pub fn check_local_fallbacks(&self) -> AppResult<()> {
        let missing: Vec<String> = self
            .ui_assets()?
            .into_iter()
            .filter(|a| !a.local_path.is_file())
            .map(|a| a.local_path.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::ConfigMissing(format!(
                "以下 UI 资源缺少本地回退文件: {}",
                missing.join(", ")
            )));
        }
        info!("本地回退检查通过 ({})", self.static_dir.display());
        Ok(())
    }
}
