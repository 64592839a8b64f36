// src/server/mod.rs

mod api;
mod error;
mod pages;
mod trace;

use crate::{AppContext, error::AppResult};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use log::info;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

pub fn build_router(ctx: AppContext) -> Router {
    let api = Router::new()
        .route("/api/health", get(api::health))
        .route("/api/logs", get(api::logs))
        .route("/api/time", get(api::time))
        .route("/api/sync-remote", post(api::sync_remote))
        .route("/api/sync-progress", get(api::sync_progress))
        .route("/api/sync-last", get(api::sync_last))
        .route("/api/status", get(api::status))
        .route("/api/state", get(api::state))
        .route("/api/ir", post(api::ir))
        .route("/api/gpio", post(api::gpio))
        .route("/api/wifi-config", post(api::wifi_config))
        .route("/api/wifi_config", post(api::wifi_config))
        .route("/api/esp-ip", get(api::get_esp_ip).post(api::set_esp_ip))
        .route(
            "/api/remote-config",
            get(api::get_remote_config).post(api::set_remote_config),
        )
        .route("/api/esp-state-sink", post(api::esp_state_sink))
        .route(
            "/api/auto-update",
            get(api::get_auto_update).post(api::set_auto_update),
        );

    Router::new()
        .route("/", get(pages::index))
        .route("/esp", get(pages::esp))
        // `api/` 前缀在资源查找时即返回 404，其他方法同样按 404 处理
        .route("/*path", get(pages::asset).fallback(api::not_found))
        .merge(api)
        .fallback(api::not_found)
        .layer(middleware::from_fn(trace::trace_requests))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// 启动 HTTP 服务，`shutdown` 取消后优雅退出。
pub async fn serve(ctx: AppContext, addr: SocketAddr, shutdown: CancellationToken) -> AppResult<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("面板服务已启动: http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("面板服务已停止");
    Ok(())
}
