// src/lib.rs

pub mod assets;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod logging;
pub mod models;
pub mod server;
pub mod sync;
pub mod utils;

use crate::{
    assets::{AssetCatalog, AssetResolver, Fetcher},
    cache::CacheStore,
    cli::Cli,
    client::RobustClient,
    config::ConfigHandle,
    device::DeviceProxy,
    error::{AppError, AppResult},
    sync::{AutoUpdater, SyncManager},
};
use log::{debug, info};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;

/// 服务的共享上下文，所有 handler 通过 axum 的 State 获取
#[derive(Clone)]
pub struct AppContext {
    pub config: ConfigHandle,
    pub resolver: AssetResolver,
    pub sync: SyncManager,
    pub auto_update: AutoUpdater,
    pub device: DeviceProxy,
}

impl AppContext {
    /// 组装各组件。`cache_dir` 是 UI 远程缓存目录。
    pub fn new(config: ConfigHandle, static_dir: PathBuf, cache_dir: PathBuf) -> AppResult<Self> {
        let http = RobustClient::new(&config.snapshot().network)?;
        let catalog = AssetCatalog::new(static_dir, cache_dir, config.clone());
        let fetcher = Arc::new(Fetcher::new(http.clone(), CacheStore::default(), config.clone()));
        let resolver = AssetResolver::new(catalog, fetcher);
        let sync = SyncManager::new(resolver.clone(), config.clone());
        let auto_update = AutoUpdater::new(sync.clone());
        let device = DeviceProxy::new(http, config.clone());
        Ok(Self {
            config,
            resolver,
            sync,
            auto_update,
            device,
        })
    }
}

#[cfg(feature = "testing")]
impl AppContext {
    /// 集成测试用：配置只存在于内存，`root` 下生成 `static/`（每个 UI 文件的内容为 `local <name>`）和 `cache/`。
    pub fn for_tests(config: config::ExternalConfig, root: &std::path::Path) -> AppResult<Self> {
        let static_dir = root.join("static");
        for name in &config.remote_assets.files {
            let path = utils::secure_join_path(&static_dir, name)?;
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(&path, format!("local {}", name))?;
        }
        let cache_dir = root.join("cache");
        std::fs::create_dir_all(&cache_dir)?;
        Self::new(ConfigHandle::in_memory(config), static_dir, cache_dir)
    }
}

/// 库的公共入口点，由 `main.rs` 调用
pub async fn run_from_cli(args: Arc<Cli>, shutdown: CancellationToken) -> AppResult<()> {
    debug!("CLI 参数: {:?}", args);

    let config_path = args.config_path();
    let config = ConfigHandle::load(&config_path)?;
    info!("已加载配置: {:?}", config_path);

    let data_dir = utils::canonical_dir(&args.data_dir)?;
    let static_dir = utils::canonical_dir(&args.static_dir)?;
    let cache_dir = utils::canonical_dir(&data_dir.join(constants::REMOTE_CACHE_DIR))?;
    debug!("静态目录: {:?}, 缓存目录: {:?}", static_dir, cache_dir);

    let ctx = AppContext::new(config.clone(), static_dir, cache_dir)?;
    ctx.resolver.catalog().check_local_fallbacks()?;

    let remote = config.remote_source(models::AssetCategory::Ui);
    if remote.is_enabled() {
        info!("远程 UI 源: {}", remote.base_url);
    } else {
        info!("未配置远程 UI 源，仅使用本地文件");
    }

    let auto_update = ctx.auto_update.spawn(shutdown.clone());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| AppError::BadRequest(format!("无效的监听地址 '{}:{}': {}", args.host, args.port, e)))?;
    let result = server::serve(ctx, addr, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = auto_update.await {
        debug!("自动更新任务退出异常: {}", e);
    }
    result
}
