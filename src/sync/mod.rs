// src/sync/mod.rs

mod auto_update;
mod job;
mod runner;

pub use auto_update::{AutoUpdateStatus, AutoUpdater};
pub use job::{ItemStatus, JobState, SyncItem, SyncJob, SyncProgress};

use crate::{
    assets::AssetResolver,
    config::ConfigHandle,
    error::{AppError, AppResult},
    models::{FetchMode, SyncCategory},
};
use chrono::Utc;
use dashmap::DashMap;
use log::{debug, info, warn};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::Notify;

/// 后台同步任务管理器。
///
/// 每个类别同一时间最多一个活动任务；`ui`/`videos` 请求会并入正在运行的 `all`。
/// 任务状态保存在 `DashMap` 中，轮询接口只做同步读取。
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    resolver: AssetResolver,
    config: ConfigHandle,
    jobs: DashMap<String, SyncJob>,
    active: Mutex<HashMap<SyncCategory, String>>,
    last: Mutex<HashMap<SyncCategory, String>>,
    finished: Notify,
}

impl SyncManager {
    pub fn new(resolver: AssetResolver, config: ConfigHandle) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                resolver,
                config,
                jobs: DashMap::new(),
                active: Mutex::new(HashMap::new()),
                last: Mutex::new(HashMap::new()),
                finished: Notify::new(),
            }),
        }
    }

    pub(crate) fn resolver(&self) -> &AssetResolver {
        &self.inner.resolver
    }

    pub(crate) fn config(&self) -> &ConfigHandle {
        &self.inner.config
    }

    /// 启动（或加入）一个同步任务，返回任务 ID。必须在 tokio 运行时内调用。
    pub fn start_sync(&self, category: SyncCategory, mode: FetchMode) -> String {
        let mut active = self.inner.active.lock().unwrap();
        if let Some(id) = active.get(&category) {
            debug!("类别 {} 已有活动任务 {}，直接复用", category, id);
            return id.clone();
        }
        if category != SyncCategory::All
            && let Some(id) = active.get(&SyncCategory::All)
        {
            debug!("类别 {} 并入活动的 all 任务 {}", category, id);
            return id.clone();
        }

        let job = SyncJob::new(category, mode);
        let job_id = job.id.clone();
        self.inner.jobs.insert(job_id.clone(), job);
        active.insert(category, job_id.clone());
        drop(active);

        info!(
            "启动同步任务 id={} category={} force={} respect_ttl={}",
            job_id, category, mode.force, mode.respect_ttl
        );
        tokio::spawn(runner::run_job(self.clone(), job_id.clone()));
        job_id
    }

    pub fn progress(&self, job_id: &str) -> AppResult<SyncJob> {
        self.inner
            .jobs
            .get(job_id)
            .map(|job| job.clone())
            .ok_or_else(|| AppError::NotFound(format!("同步任务 '{}'", job_id)))
    }

    /// 该类别最近一次结束的任务
    pub fn last(&self, category: SyncCategory) -> Option<SyncJob> {
        let id = self.inner.last.lock().unwrap().get(&category).cloned()?;
        self.inner.jobs.get(&id).map(|job| job.clone())
    }

    pub fn active_job(&self, category: SyncCategory) -> Option<String> {
        self.inner.active.lock().unwrap().get(&category).cloned()
    }

    /// 等待任务结束并返回最终状态
    pub async fn wait(&self, job_id: &str) -> AppResult<SyncJob> {
        loop {
            let notified = self.inner.finished.notified();
            let job = self.progress(job_id)?;
            if job.state.is_finished() {
                return Ok(job);
            }
            notified.await;
        }
    }

    pub(crate) fn update<F>(&self, job_id: &str, f: F)
    where
        F: FnOnce(&mut SyncJob),
    {
        if let Some(mut job) = self.inner.jobs.get_mut(job_id) {
            f(&mut job);
        }
    }

    pub(crate) fn mark_running(&self, job_id: &str) {
        self.update(job_id, |job| {
            job.state = JobState::Running;
            job.started_at = Some(Utc::now());
        });
    }

    /// 结束任务：释放单飞占位，登记为该类别的最近任务，并淘汰被取代的旧任务。
    pub(crate) fn finish(&self, job_id: &str, state: JobState, error: Option<String>) {
        let mut category = None;
        self.update(job_id, |job| {
            job.state = state;
            job.finished_at = Some(Utc::now());
            if error.is_some() {
                job.last_error = error.clone();
            }
            category = Some(job.category);
            let p = &job.progress;
            match state {
                JobState::Failed => warn!(
                    "同步任务 {} 失败: {}",
                    job.id,
                    job.last_error.as_deref().unwrap_or("未知错误")
                ),
                _ => info!(
                    "同步任务 {} 完成: 共 {} 项，下载 {}，跳过 {}，失败 {}",
                    job.id, p.total, p.downloaded, p.skipped, p.failed
                ),
            }
        });
        let Some(category) = category else {
            return;
        };

        {
            let mut active = self.inner.active.lock().unwrap();
            if active.get(&category).map(String::as_str) == Some(job_id) {
                active.remove(&category);
            }
        }
        let superseded = self
            .inner
            .last
            .lock()
            .unwrap()
            .insert(category, job_id.to_string());
        if let Some(old) = superseded
            && old != job_id
        {
            self.inner.jobs.remove(&old);
        }
        self.inner.finished.notify_waiters();
    }
}
