// src/server/pages.rs

use crate::{AppContext, constants, error::AppError, utils};
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

pub async fn index(State(ctx): State<AppContext>) -> Response {
    serve_asset(&ctx, "index.html").await
}

pub async fn esp(State(ctx): State<AppContext>) -> Response {
    serve_asset(&ctx, "esp.html").await
}

pub async fn asset(State(ctx): State<AppContext>, Path(path): Path<String>) -> Response {
    serve_asset(&ctx, &path).await
}

async fn serve_asset(ctx: &AppContext, name: &str) -> Response {
    let resolved = match ctx.resolver.resolve(name).await {
        Ok(resolved) => resolved,
        // favicon 可选，缺失时不报错
        Err(AppError::NotFound(_)) if utils::safe_relpath(name).as_deref() == Some("favicon.ico") => {
            return StatusCode::NO_CONTENT.into_response();
        }
        Err(e) => return e.into_response(),
    };

    let cache_control = if resolved.name.ends_with(".html") || resolved.name.ends_with(".htm") {
        "no-cache"
    } else {
        "public, max-age=0, must-revalidate"
    };
    let mut res = resolved.content.into_response();
    let headers = res.headers_mut();
    if let Ok(ct) = HeaderValue::from_str(&utils::content_type_for(&resolved.name)) {
        headers.insert(header::CONTENT_TYPE, ct);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    headers.insert(
        constants::ASSET_SOURCE_HEADER,
        HeaderValue::from_static(resolved.source.as_str()),
    );
    res
}
