// src/server/api.rs

use crate::{
    AppContext, constants,
    device::DeviceCommand,
    error::{AppError, AppResult},
    models::{AssetCategory, FetchMode, SyncCategory},
};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

type ApiResult = AppResult<Json<Value>>;
type Params = Query<HashMap<String, String>>;

/// 宽松解析 JSON 请求体：空体或非法 JSON 视为空对象。
fn parse_body(body: &Bytes) -> Value {
    if body.is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_slice(body).unwrap_or_else(|_| Value::Object(Map::new()))
}

fn truthy(v: Option<&Value>) -> Option<bool> {
    match v? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_i64().unwrap_or(0) != 0),
        Value::String(s) => Some(matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")),
        _ => None,
    }
}

fn str_field<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| body.get(*k).and_then(Value::as_str))
}

fn with_ok(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            map.insert("ok".into(), json!(true));
            Value::Object(map)
        }
        other => json!({ "ok": true, "data": other }),
    }
}

// --- 同步 ---

pub async fn sync_remote(State(ctx): State<AppContext>, Query(q): Params, body: Bytes) -> ApiResult {
    let body = parse_body(&body);
    let raw_category = str_field(&body, &["category", "what"])
        .or_else(|| q.get("category").or_else(|| q.get("what")).map(String::as_str))
        .unwrap_or("all");
    let category: SyncCategory = raw_category.parse().map_err(AppError::BadRequest)?;

    let force = truthy(body.get("force_download"))
        .or_else(|| truthy(body.get("force")))
        .unwrap_or(false);
    let respect_ttl = truthy(body.get("respect_ttl")).unwrap_or(false);
    let wait = truthy(body.get("wait"))
        .or_else(|| q.get("wait").map(|w| matches!(w.as_str(), "1" | "true" | "yes")))
        .unwrap_or(false);

    let job_id = ctx.sync.start_sync(category, FetchMode { force, respect_ttl });
    if wait {
        let job = ctx.sync.wait(&job_id).await?;
        return Ok(Json(json!({
            "ok": true,
            "jobId": job_id,
            "job_id": job_id,
            "category": category,
            "job": job,
        })));
    }
    Ok(Json(json!({
        "ok": true,
        "jobId": job_id,
        "job_id": job_id,
        "category": category,
        "force": force,
        "respect_ttl": respect_ttl,
    })))
}

pub async fn sync_progress(State(ctx): State<AppContext>, Query(q): Params) -> ApiResult {
    let job_id = ["jobId", "job_id", "sync_id"]
        .iter()
        .find_map(|k| q.get(*k))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest("缺少 jobId".to_string()))?;
    let job = ctx.sync.progress(job_id)?;
    Ok(Json(with_ok(serde_json::to_value(job)?)))
}

pub async fn sync_last(State(ctx): State<AppContext>, Query(q): Params) -> ApiResult {
    if let Some(raw) = q.get("category").or_else(|| q.get("what")) {
        let category: SyncCategory = raw.parse().map_err(AppError::BadRequest)?;
        return Ok(Json(json!({
            "ok": true,
            "category": category,
            "job": ctx.sync.last(category),
        })));
    }
    let mut out = Map::new();
    out.insert("ok".into(), json!(true));
    for category in SyncCategory::ALL {
        out.insert(category.as_str().into(), json!(ctx.sync.last(category)));
    }
    Ok(Json(Value::Object(out)))
}

// --- 设备 ---

pub async fn status(State(ctx): State<AppContext>) -> ApiResult {
    let snapshot = ctx.device.get_status().await?;
    Ok(Json(json!({
        "ok": true,
        "state": snapshot.to_status_json(),
    })))
}

pub async fn state(State(ctx): State<AppContext>) -> ApiResult {
    Ok(Json(ctx.device.get_state_raw().await?))
}

async fn forward(ctx: &AppContext, command: DeviceCommand) -> ApiResult {
    let response = ctx.device.send_command(&command).await?;
    Ok(Json(json!({ "ok": true, "response": response })))
}

pub async fn ir(State(ctx): State<AppContext>, body: Bytes) -> ApiResult {
    let command = DeviceCommand::ir_from_json(&parse_body(&body))?;
    forward(&ctx, command).await
}

pub async fn gpio(State(ctx): State<AppContext>, body: Bytes) -> ApiResult {
    let command = DeviceCommand::gpio_from_json(&parse_body(&body))?;
    forward(&ctx, command).await
}

pub async fn wifi_config(State(ctx): State<AppContext>, body: Bytes) -> ApiResult {
    let command = DeviceCommand::wifi_from_json(&parse_body(&body))?;
    forward(&ctx, command).await
}

pub async fn esp_state_sink(State(ctx): State<AppContext>, body: Bytes) -> ApiResult {
    let ack = ctx.device.push_state(&parse_body(&body))?;
    Ok(Json(json!({ "ok": true, "seq": ack.seq, "server_ts": ack.server_ts })))
}

// --- 配置 ---

pub async fn get_esp_ip(State(ctx): State<AppContext>) -> ApiResult {
    Ok(Json(json!({ "ok": true, "esp_ip": ctx.config.esp_ip() })))
}

pub async fn set_esp_ip(State(ctx): State<AppContext>, body: Bytes) -> ApiResult {
    let body = parse_body(&body);
    let ip = str_field(&body, &["ip", "esp_ip"]).unwrap_or_default();
    let saved = ctx.config.set_esp_ip(ip)?;
    Ok(Json(json!({ "ok": true, "esp_ip": saved })))
}

fn remote_config_json(ctx: &AppContext) -> Value {
    let cfg = ctx.config.snapshot();
    json!({
        "ok": true,
        "remote_assets": {
            "base_url": cfg.remote_assets.base_url,
            "cache_ttl_s": cfg.remote_assets.cache_ttl_s,
            "timeout_s": cfg.remote_assets.timeout_s,
            "files": cfg.remote_assets.files,
        },
        "remote_videos": {
            "base_url": cfg.remote_videos.base_url,
            "cache_ttl_s": cfg.remote_videos.cache_ttl_s,
            "timeout_s": cfg.remote_videos.timeout_s,
            "files": cfg.remote_videos.files,
        },
    })
}

pub async fn get_remote_config(State(ctx): State<AppContext>) -> ApiResult {
    Ok(Json(remote_config_json(&ctx)))
}

/// `{ "remote_assets": { "base_url": ... }, "remote_videos": { "base_url": ... } }`，缺省的一侧保持不变。
pub async fn set_remote_config(State(ctx): State<AppContext>, body: Bytes) -> ApiResult {
    let body = parse_body(&body);
    let updates = [
        (AssetCategory::Ui, "remote_assets"),
        (AssetCategory::Video, "remote_videos"),
    ];
    let mut changed = 0;
    for (category, key) in updates {
        if let Some(url) = body.get(key).and_then(|v| v.get("base_url")).and_then(Value::as_str) {
            ctx.config.set_remote_base_url(category, url)?;
            changed += 1;
        }
    }
    if changed == 0 {
        return Err(AppError::BadRequest(
            "需要 remote_assets.base_url 或 remote_videos.base_url".to_string(),
        ));
    }
    Ok(Json(remote_config_json(&ctx)))
}

pub async fn get_auto_update(State(ctx): State<AppContext>) -> ApiResult {
    Ok(Json(with_ok(serde_json::to_value(ctx.auto_update.status())?)))
}

pub async fn set_auto_update(State(ctx): State<AppContext>, body: Bytes) -> ApiResult {
    let body = parse_body(&body);
    let enabled = truthy(body.get("enabled"))
        .ok_or_else(|| AppError::BadRequest("缺少 enabled".to_string()))?;
    ctx.auto_update.set_enabled(enabled)?;
    Ok(Json(with_ok(serde_json::to_value(ctx.auto_update.status())?)))
}

pub async fn logs(Query(q): Params) -> Json<Value> {
    let n = q
        .get("n")
        .and_then(|n| n.trim().parse::<usize>().ok())
        .unwrap_or(constants::DEFAULT_LOG_TAIL);
    Json(json!({ "ok": true, "lines": crate::logging::RECENT_LOGS.tail(n) }))
}

/// 服务器时钟，设备用它校时
pub async fn time() -> Json<Value> {
    let now = chrono::Local::now();
    Json(json!({
        "ok": true,
        "epoch": now.timestamp(),
        "iso": now.format("%Y-%m-%d %H:%M:%S").to_string(),
        "tz_offset_s": now.offset().local_minus_utc(),
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

pub async fn not_found() -> AppError {
    AppError::NotFound("路由不存在".to_string())
}
