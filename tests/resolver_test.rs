// tests/resolver_test.rs

use mockito::Matcher;
use panel_hub::AppContext;
use panel_hub::config::ExternalConfig;
use panel_hub::error::AppError;
use panel_hub::models::{FetchMode, FetchOutcome, SourceTag};
use tempfile::tempdir;

fn config_with_remote(base_url: &str) -> ExternalConfig {
    let mut cfg = ExternalConfig::default();
    cfg.remote_assets.base_url = base_url.to_string();
    cfg
}

#[tokio::test]
async fn test_remote_then_fresh_cache_without_network() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/index.html")
        .with_status(200)
        .with_header("etag", "\"v1\"")
        .with_body("remote index")
        .expect(1)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(config_with_remote(&server.url()), dir.path()).unwrap();

    let first = ctx.resolver.resolve("index.html").await.unwrap();
    assert_eq!(first.source, SourceTag::Remote);
    assert_eq!(first.content, b"remote index");

    // TTL 内第二次请求直接命中缓存
    let second = ctx.resolver.resolve("index.html").await.unwrap();
    assert_eq!(second.source, SourceTag::Cache);
    assert_eq!(second.content, b"remote index");

    mock.assert_async().await;
    assert!(dir.path().join("cache").join("index.html").is_file());
    assert!(dir.path().join("cache").join("index.html.meta.json").is_file());
}

#[tokio::test]
async fn test_remote_failure_falls_back_to_local_and_cools_down() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/style.css")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(config_with_remote(&server.url()), dir.path()).unwrap();

    let first = ctx.resolver.resolve("style.css").await.unwrap();
    assert_eq!(first.source, SourceTag::Local);
    assert_eq!(first.content, b"local style.css");

    // 冷却期内不再访问远程
    let second = ctx.resolver.resolve("style.css").await.unwrap();
    assert_eq!(second.source, SourceTag::Local);

    mock.assert_async().await;
    assert!(!dir.path().join("cache").join("style.css").exists());
}

#[tokio::test]
async fn test_conditional_request_reuses_cache_on_304() {
    let mut server = mockito::Server::new_async().await;
    let mut cfg = config_with_remote(&server.url());
    cfg.remote_assets.cache_ttl_s = 0;

    let full = server
        .mock("GET", "/esp.html")
        .with_status(200)
        .with_header("etag", "\"abc\"")
        .with_body("remote esp")
        .expect(1)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(cfg, dir.path()).unwrap();

    let first = ctx.resolver.resolve("esp.html").await.unwrap();
    assert_eq!(first.source, SourceTag::Remote);
    full.assert_async().await;
    full.remove_async().await;

    let not_modified = server
        .mock("GET", "/esp.html")
        .match_header("if-none-match", "\"abc\"")
        .with_status(304)
        .expect(1)
        .create_async()
        .await;

    let second = ctx.resolver.resolve("esp.html").await.unwrap();
    assert_eq!(second.source, SourceTag::Cache);
    assert_eq!(second.content, b"remote esp");
    not_modified.assert_async().await;
}

#[tokio::test]
async fn test_forced_fetch_with_same_content_is_not_modified() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Regex(r"^/index\.html".to_string()))
        .with_status(200)
        .with_body("same bytes")
        .expect(2)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(config_with_remote(&server.url()), dir.path()).unwrap();
    let asset = ctx.resolver.catalog().ui_asset("index.html").unwrap();

    let force = FetchMode {
        force: true,
        respect_ttl: false,
    };
    let first = ctx.resolver.fetch(&asset, force).await.unwrap();
    assert_eq!(first, FetchOutcome::Downloaded { bytes: 10 });
    let second = ctx.resolver.fetch(&asset, force).await.unwrap();
    assert_eq!(second, FetchOutcome::NotModified);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_disabled_remote_serves_local() {
    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(ExternalConfig::default(), dir.path()).unwrap();

    let resolved = ctx.resolver.resolve("index.html").await.unwrap();
    assert_eq!(resolved.source, SourceTag::Local);
    assert_eq!(resolved.content, b"local index.html");
}

#[tokio::test]
async fn test_api_and_traversal_paths_are_not_assets() {
    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(ExternalConfig::default(), dir.path()).unwrap();

    assert!(matches!(
        ctx.resolver.resolve("api/status").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        ctx.resolver.resolve("../secret.txt").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        ctx.resolver.resolve("missing.js").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_corrupt_cache_is_skipped() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/index.html")
        .with_status(200)
        .with_body("fresh remote")
        .expect(2)
        .create_async()
        .await;

    let dir = tempdir().unwrap();
    let ctx = AppContext::for_tests(config_with_remote(&server.url()), dir.path()).unwrap();
    ctx.resolver.resolve("index.html").await.unwrap();

    // 内容被外部改写后大小与元数据不符，不能再当作新鲜缓存
    std::fs::write(dir.path().join("cache").join("index.html"), "tampered content!").unwrap();

    let resolved = ctx.resolver.resolve("index.html").await.unwrap();
    assert_eq!(resolved.source, SourceTag::Remote);
    assert_eq!(resolved.content, b"fresh remote");
    mock.assert_async().await;
}
