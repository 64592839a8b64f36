// src/sync/auto_update.rs

use super::{SyncJob, SyncManager};
use crate::{
    constants,
    error::AppResult,
    models::{AssetCategory, FetchMode, SyncCategory},
    utils,
};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize)]
pub struct AutoUpdateStatus {
    pub enabled: bool,
    pub running: bool,
    pub ttl_s: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub next_check_in_s: Option<u64>,
    pub base_url: String,
    pub last_job: Option<SyncJob>,
}

/// UI 自动更新：开启后每隔 `cache_ttl_s` 启动一次非强制的 `ui` 同步。
#[derive(Clone)]
pub struct AutoUpdater {
    manager: SyncManager,
    last_check: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl AutoUpdater {
    pub fn new(manager: SyncManager) -> Self {
        Self {
            manager,
            last_check: Arc::new(Mutex::new(None)),
        }
    }

    /// 启动后台定时器，`shutdown` 取消时退出。
    pub fn spawn(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(constants::server::AUTO_UPDATE_TICK_S));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("自动更新定时器已停止");
                        break;
                    }
                    _ = ticker.tick() => {
                        this.tick(Utc::now());
                    }
                }
            }
        })
    }

    /// 到期则启动一次同步，返回新任务 ID。
    pub fn tick(&self, now: DateTime<Utc>) -> Option<String> {
        let config = self.manager.config();
        if !config.auto_update_ui() {
            return None;
        }
        let source = config.remote_source(AssetCategory::Ui);
        if !source.is_enabled() || self.manager.active_job(SyncCategory::Ui).is_some() {
            return None;
        }
        let ttl = effective_ttl(source.cache_ttl);
        {
            let mut last = self.last_check.lock().unwrap();
            let due = last.is_none_or(|at| utils::secs_between(at, now) >= ttl.as_secs_f64());
            if !due {
                return None;
            }
            *last = Some(now);
        }
        info!("自动更新: 开始检查 UI 资源 (ttl={}s)", ttl.as_secs());
        Some(self.manager.start_sync(
            SyncCategory::Ui,
            FetchMode {
                force: false,
                respect_ttl: false,
            },
        ))
    }

    pub fn set_enabled(&self, enabled: bool) -> AppResult<()> {
        self.manager.config().set_auto_update_ui(enabled)?;
        if enabled {
            // 打开后在下一个 tick 立即检查一次
            *self.last_check.lock().unwrap() = None;
        }
        info!("UI 自动更新已{}", if enabled { "开启" } else { "关闭" });
        Ok(())
    }

    pub fn status(&self) -> AutoUpdateStatus {
        let config = self.manager.config();
        let enabled = config.auto_update_ui();
        let source = config.remote_source(AssetCategory::Ui);
        let ttl = effective_ttl(source.cache_ttl);
        let last_check = *self.last_check.lock().unwrap();
        let next_check_in_s = enabled.then(|| match last_check {
            Some(at) => {
                let elapsed = utils::secs_between(at, Utc::now());
                (ttl.as_secs_f64() - elapsed).max(0.0) as u64
            }
            None => 0,
        });
        AutoUpdateStatus {
            enabled,
            running: self.manager.active_job(SyncCategory::Ui).is_some(),
            ttl_s: ttl.as_secs(),
            last_check,
            next_check_in_s,
            base_url: source.base_url,
            last_job: self.manager.last(SyncCategory::Ui),
        }
    }
}

fn effective_ttl(ttl: Duration) -> Duration {
    if ttl.is_zero() {
        Duration::from_secs(constants::remote::UI_CACHE_TTL_S)
    } else {
        ttl
    }
}
