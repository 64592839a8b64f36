// src/server/trace.rs

use crate::{constants, utils};
use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use log::{debug, info, warn};
use std::time::Instant;

/// 为每个请求分配 8 位请求 ID；只记录 5xx 和慢请求，其余走 debug。
pub async fn trace_requests(req: Request, next: Next) -> Response {
    let rid = utils::short_id(8);
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let mut res = next.run(req).await;

    let ms = start.elapsed().as_millis();
    let status = res.status();
    if status.is_server_error() {
        warn!("[{}] {} {} -> {} ({} ms)", rid, method, path, status.as_u16(), ms);
    } else if ms >= constants::server::SLOW_REQUEST_MS {
        info!("[{}] 慢请求 {} {} -> {} ({} ms)", rid, method, path, status.as_u16(), ms);
    } else {
        debug!("[{}] {} {} -> {} ({} ms)", rid, method, path, status.as_u16(), ms);
    }

    if let Ok(value) = HeaderValue::from_str(&rid) {
        res.headers_mut().insert("x-request-id", value);
    }
    res
}
