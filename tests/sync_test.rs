// tests/sync_test.rs

use mockito::{Matcher, Mock, ServerGuard};
use panel_hub::AppContext;
use panel_hub::config::ExternalConfig;
use panel_hub::models::{FetchMode, SyncCategory};
use panel_hub::sync::{ItemStatus, JobState};
use tempfile::tempdir;

async fn mock_file(server: &mut ServerGuard, path: &str, body: &str) -> Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_body(body)
        .create_async()
        .await
}

/// 强制模式会附带缓存破坏参数，这里忽略查询串
async fn mock_file_any_query(server: &mut ServerGuard, path: &str, body: &str) -> Mock {
    server
        .mock("GET", path)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(body)
        .create_async()
        .await
}

fn ui_config(base_url: &str) -> ExternalConfig {
    let mut cfg = ExternalConfig::default();
    cfg.remote_assets.base_url = base_url.to_string();
    cfg
}

#[tokio::test]
async fn test_resync_reports_downloaded_and_skipped() {
    let mut server = mockito::Server::new_async().await;
    let _index = mock_file(&mut server, "/index.html", "<h1>remote</h1>").await;
    let _esp = mock_file(&mut server, "/esp.html", "<h1>esp</h1>").await;
    let style_v1 = mock_file(&mut server, "/style.css", "body{}").await;

    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(ui_config(&server.url()), dir.path()).unwrap();

    let first_id = ctx.sync.start_sync(SyncCategory::Ui, FetchMode::default());
    let first = ctx.sync.wait(&first_id).await.unwrap();
    assert_eq!(first.state, JobState::Succeeded);
    assert_eq!(first.progress.total, 3);
    assert_eq!(first.progress.downloaded, 3);
    assert_eq!(first.progress.percent, 100);

    // 只有 style.css 在远端发生了变化
    style_v1.remove_async().await;
    let _style_v2 = mock_file(&mut server, "/style.css", "body{color:red}").await;

    let second_id = ctx.sync.start_sync(SyncCategory::Ui, FetchMode::default());
    assert_ne!(first_id, second_id);
    let second = ctx.sync.wait(&second_id).await.unwrap();
    assert_eq!(second.state, JobState::Succeeded);
    assert_eq!(second.progress.downloaded, 1);
    assert_eq!(second.progress.skipped, 2);
    assert_eq!(second.progress.failed, 0);

    let style = second.items.iter().find(|i| i.name == "style.css").unwrap();
    assert_eq!(style.status, ItemStatus::Ok);
    assert_eq!(style.source, "remote");

    let cached = std::fs::read_to_string(dir.path().join("cache").join("style.css")).unwrap();
    assert_eq!(cached, "body{color:red}");

    // 最近任务只保留新的那一个
    assert_eq!(ctx.sync.last(SyncCategory::Ui).unwrap().id, second_id);
    assert!(ctx.sync.progress(&first_id).is_err());
}

#[tokio::test]
async fn test_forced_resync_reports_downloaded_and_skipped() {
    let mut server = mockito::Server::new_async().await;
    let _index = mock_file_any_query(&mut server, "/index.html", "<h1>remote</h1>").await;
    let _esp = mock_file_any_query(&mut server, "/esp.html", "<h1>esp</h1>").await;
    let style_v1 = mock_file_any_query(&mut server, "/style.css", "body{}").await;

    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(ui_config(&server.url()), dir.path()).unwrap();
    let forced = FetchMode {
        force: true,
        respect_ttl: false,
    };

    let id = ctx.sync.start_sync(SyncCategory::Ui, forced);
    let first = ctx.sync.wait(&id).await.unwrap();
    assert_eq!(first.progress.downloaded, 3);
    assert!(first.force);

    style_v1.remove_async().await;
    let _style_v2 = mock_file_any_query(&mut server, "/style.css", "body{color:blue}").await;

    let id = ctx.sync.start_sync(SyncCategory::Ui, forced);
    let second = ctx.sync.wait(&id).await.unwrap();
    assert_eq!(second.state, JobState::Succeeded);
    assert_eq!(second.progress.downloaded, 1);
    assert_eq!(second.progress.skipped, 2);
    assert_eq!(second.progress.failed, 0);

    let cached = std::fs::read_to_string(dir.path().join("cache").join("style.css")).unwrap();
    assert_eq!(cached, "body{color:blue}");
}

#[tokio::test]
async fn test_respect_ttl_skips_without_network() {
    let mut server = mockito::Server::new_async().await;
    let mut mocks = Vec::new();
    for (path, body) in [("/index.html", "a"), ("/esp.html", "b"), ("/style.css", "c")] {
        mocks.push(
            server
                .mock("GET", path)
                .with_status(200)
                .with_body(body)
                .expect(1)
                .create_async()
                .await,
        );
    }

    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(ui_config(&server.url()), dir.path()).unwrap();

    let id = ctx.sync.start_sync(SyncCategory::Ui, FetchMode::default());
    ctx.sync.wait(&id).await.unwrap();

    let mode = FetchMode {
        force: false,
        respect_ttl: true,
    };
    let id = ctx.sync.start_sync(SyncCategory::Ui, mode);
    let job = ctx.sync.wait(&id).await.unwrap();
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.progress.skipped, 3);
    assert!(job.respect_ttl);

    for mock in mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_concurrent_requests_share_one_job() {
    let mut server = mockito::Server::new_async().await;
    let mut _mocks = Vec::new();
    for path in ["/index.html", "/esp.html", "/style.css"] {
        _mocks.push(mock_file(&mut server, path, "x").await);
    }
    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(ui_config(&server.url()), dir.path()).unwrap();

    // 单线程运行时：在第一次 await 之前任务不会开始执行
    let all = ctx.sync.start_sync(SyncCategory::All, FetchMode::default());
    let again = ctx.sync.start_sync(SyncCategory::All, FetchMode::default());
    let ui = ctx.sync.start_sync(SyncCategory::Ui, FetchMode::default());
    assert_eq!(all, again);
    assert_eq!(all, ui);
    assert_eq!(ctx.sync.active_job(SyncCategory::All).as_deref(), Some(all.as_str()));

    let job = ctx.sync.wait(&all).await.unwrap();
    assert!(job.state.is_finished());
    assert!(ctx.sync.active_job(SyncCategory::All).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_callers_get_a_single_job() {
    let mut server = mockito::Server::new_async().await;
    let mut _mocks = Vec::new();
    for path in ["/index.html", "/esp.html", "/style.css"] {
        _mocks.push(
            server
                .mock("GET", path)
                .with_status(200)
                .with_body("x")
                .expect(1)
                .create_async()
                .await,
        );
    }
    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(ui_config(&server.url()), dir.path()).unwrap();

    let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                ctx.sync.start_sync(SyncCategory::Ui, FetchMode::default())
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        ids.insert(handle.await.unwrap());
    }
    assert_eq!(ids.len(), 1);

    let id = ids.into_iter().next().unwrap();
    let job = ctx.sync.wait(&id).await.unwrap();
    assert_eq!(job.progress.downloaded, 3);
    for mock in _mocks {
        mock.assert_async().await;
    }
}

#[tokio::test]
async fn test_all_disabled_fails_job() {
    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(ExternalConfig::default(), dir.path()).unwrap();

    let id = ctx.sync.start_sync(SyncCategory::All, FetchMode::default());
    let job = ctx.sync.wait(&id).await.unwrap();

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.progress.failed, 2);
    assert!(job.items.iter().all(|i| i.source == "config"));
    assert!(job.last_error.unwrap().contains("base_url"));
    assert_eq!(ctx.sync.last(SyncCategory::All).unwrap().id, id);
}

#[tokio::test]
async fn test_disabled_videos_do_not_block_ui() {
    let mut server = mockito::Server::new_async().await;
    let mut _mocks = Vec::new();
    for path in ["/index.html", "/esp.html", "/style.css"] {
        _mocks.push(mock_file(&mut server, path, "x").await);
    }
    let dir = tempdir().unwrap();
    let mut cfg = ui_config(&server.url());
    cfg.video_dir = dir.path().join("videos").display().to_string();
    let ctx = AppContext::for_tests(cfg, dir.path()).unwrap();

    let id = ctx.sync.start_sync(SyncCategory::All, FetchMode::default());
    let job = ctx.sync.wait(&id).await.unwrap();

    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.progress.total, 4);
    assert_eq!(job.progress.downloaded, 3);
    assert_eq!(job.progress.failed, 1);
    let videos = job.items.iter().find(|i| i.kind == "videos").unwrap();
    assert_eq!(videos.status, ItemStatus::Failed);
}

#[tokio::test]
async fn test_video_sync_streams_into_video_dir() {
    let mut server = mockito::Server::new_async().await;
    let body = vec![7u8; 64 * 1024];
    let mut _mocks = Vec::new();
    for file in ["bemvindo.mp4", "video1.mp4", "saudacao.mp4"] {
        _mocks.push(
            server
                .mock("GET", format!("/{}", file).as_str())
                .with_status(200)
                .with_body(&body)
                .create_async()
                .await,
        );
    }
    let dir = tempdir().unwrap();
    let mut cfg = ExternalConfig::default();
    cfg.remote_videos.base_url = server.url();
    cfg.video_dir = dir.path().join("videos").display().to_string();
    let ctx = AppContext::for_tests(cfg, dir.path()).unwrap();

    let id = ctx.sync.start_sync(SyncCategory::Videos, FetchMode::default());
    let job = ctx.sync.wait(&id).await.unwrap();

    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.progress.downloaded, 3);
    let saved = std::fs::read(dir.path().join("videos").join("video1.mp4")).unwrap();
    assert_eq!(saved.len(), body.len());
    assert!(dir.path().join("videos").join("video1.mp4.meta.json").is_file());
}

#[tokio::test]
async fn test_auto_update_tick_starts_ui_job_when_due() {
    let mut server = mockito::Server::new_async().await;
    let mut _mocks = Vec::new();
    for path in ["/index.html", "/esp.html", "/style.css"] {
        _mocks.push(mock_file(&mut server, path, "x").await);
    }
    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(ui_config(&server.url()), dir.path()).unwrap();
    let now = chrono::Utc::now();

    // 未开启时不做任何事
    assert!(ctx.auto_update.tick(now).is_none());

    ctx.auto_update.set_enabled(true).unwrap();
    let job_id = ctx.auto_update.tick(now).expect("enabled updater should start a job");
    ctx.sync.wait(&job_id).await.unwrap();

    // TTL 未到，不会再次启动
    assert!(ctx.auto_update.tick(now + chrono::Duration::seconds(5)).is_none());
    assert!(ctx.auto_update.tick(now + chrono::Duration::hours(2)).is_some());

    let status = ctx.auto_update.status();
    assert!(status.enabled);
    assert_eq!(status.ttl_s, 3600);
    assert!(status.last_check.is_some());
}
