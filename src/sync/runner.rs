// src/sync/runner.rs

use super::{JobState, SyncItem, SyncManager};
use crate::{
    assets::AssetCatalog,
    error::AppResult,
    models::{Asset, AssetCategory},
};
use futures::{StreamExt, stream};
use log::{debug, error, warn};
use std::{cmp::min, path::Path};

struct WorkItem {
    kind: &'static str,
    asset: Asset,
}

fn kind_of(category: AssetCategory) -> &'static str {
    match category {
        AssetCategory::Ui => "ui",
        AssetCategory::Video => "videos",
    }
}

/// 在后台执行一个同步任务。单项失败只记入进度，不会中止任务。
pub(super) async fn run_job(manager: SyncManager, job_id: String) {
    let Ok(job) = manager.progress(&job_id) else {
        return;
    };
    manager.mark_running(&job_id);
    let mode = job.mode();

    let (work, config_failures) = collect_work(&manager, job.category.asset_categories());
    let runnable = work.len();
    let nothing_runnable = work.is_empty()
        && job
            .category
            .asset_categories()
            .iter()
            .all(|c| config_failures.iter().any(|f| f.kind == kind_of(*c)));

    manager.update(&job_id, |job| {
        job.set_total(runnable + config_failures.len());
        for item in config_failures.iter().cloned() {
            job.record(item);
        }
    });

    if nothing_runnable {
        let reason = config_failures
            .iter()
            .filter_map(|f| f.error.clone())
            .collect::<Vec<_>>()
            .join("; ");
        manager.finish(&job_id, JobState::Failed, Some(reason));
        return;
    }

    let workers = min(
        manager.config().snapshot().network.sync_workers.max(1),
        runnable.max(1),
    );
    debug!("同步任务 {} 共 {} 项 (并发数: {})", job_id, runnable, workers);

    stream::iter(work)
        .for_each_concurrent(workers, |item| {
            let manager = manager.clone();
            let job_id = job_id.clone();
            async move {
                let record = match manager.resolver().fetch(&item.asset, mode).await {
                    Ok(outcome) => SyncItem::from_outcome(item.kind, &item.asset.name, outcome),
                    Err(e) => {
                        error!("同步 '{}' 失败: {}", item.asset.name, e);
                        SyncItem::failed(item.kind, &item.asset.name, "remote", e.to_string())
                    }
                };
                manager.update(&job_id, |job| job.record(record));
            }
        })
        .await;

    manager.finish(&job_id, JobState::Succeeded, None);
}

/// 收集要同步的条目；已禁用或目录不可写的类别记为 "config" 失败项。
fn collect_work(manager: &SyncManager, categories: &[AssetCategory]) -> (Vec<WorkItem>, Vec<SyncItem>) {
    let catalog = manager.resolver().catalog();
    let mut work = Vec::new();
    let mut failures = Vec::new();

    for &category in categories {
        let kind = kind_of(category);
        let source = manager.config().remote_source(category);
        if !source.is_enabled() {
            let msg = match category {
                AssetCategory::Ui => "remote_assets.base_url 为空（已禁用）",
                AssetCategory::Video => "remote_videos.base_url 为空（已禁用）",
            };
            warn!("[sync][{}] {}", kind, msg);
            failures.push(SyncItem::failed(kind, "config", "config", msg));
            continue;
        }
        match assets_with_writable_dir(catalog, category) {
            Ok(list) => work.extend(list.into_iter().map(|(_, asset)| WorkItem { kind, asset })),
            Err(e) => {
                warn!("[sync][{}] 无法准备写入目录: {}", kind, e);
                failures.push(SyncItem::failed(kind, "config", "config", e.to_string()));
            }
        }
    }
    (work, failures)
}

fn assets_with_writable_dir(catalog: &AssetCatalog, category: AssetCategory) -> AppResult<Vec<(String, Asset)>> {
    let list = catalog.assets_for(category)?;
    let mut checked: Vec<&Path> = Vec::new();
    for (_, asset) in &list {
        if let Some(dir) = asset.cache_path.parent()
            && !checked.contains(&dir)
        {
            std::fs::create_dir_all(dir)?;
            // 能在目录中创建临时文件才算可写
            tempfile::NamedTempFile::new_in(dir)?;
            checked.push(dir);
        }
    }
    Ok(list)
}
