// src/device/mod.rs

mod command;
mod normalize;

pub use command::DeviceCommand;
pub use normalize::normalize_state;

use crate::{
    client::RobustClient,
    config::{ConfigHandle, DeviceConfig, secs_f64},
    error::{AppError, AppResult},
    utils,
};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tokio::sync::Mutex as TokioMutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Poll,
    Push,
}

/// 对外返回的设备状态快照
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStateSnapshot {
    pub raw: Value,
    pub state: Value,
    pub captured_at: DateTime<Utc>,
    /// 最近一次轮询是否成功
    pub ok: bool,
    pub stale: bool,
    pub via: SnapshotSource,
    pub fail_streak: u32,
    pub last_ok_at: Option<DateTime<Utc>>,
    pub last_fail_at: Option<DateTime<Utc>>,
    pub online: bool,
    pub next_poll_in_s: f64,
}

impl DeviceStateSnapshot {
    /// 面板使用的扁平格式：规范化状态 + 在线信息
    pub fn to_status_json(&self) -> Value {
        let mut out = match &self.state {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        out.insert("ts".into(), json!(Utc::now().timestamp()));
        out.insert("online".into(), json!(self.online));
        out.insert("stale".into(), json!(self.stale));
        out.insert("via".into(), json!(self.via));
        out.insert("fail_streak".into(), json!(self.fail_streak));
        out.insert("last_ok_ts".into(), json!(self.last_ok_at.map_or(0, |t| t.timestamp())));
        out.insert("last_fail_ts".into(), json!(self.last_fail_at.map_or(0, |t| t.timestamp())));
        out.insert("captured_at".into(), json!(self.captured_at));
        out.insert("next_poll_in_s".into(), json!((self.next_poll_in_s * 100.0).round() / 100.0));
        Value::Object(out)
    }
}

/// 设备推送的确认
#[derive(Debug, Clone, Serialize)]
pub struct PushAck {
    pub seq: u64,
    pub server_ts: i64,
}

struct Captured {
    raw: Value,
    state: Value,
    captured_at: DateTime<Utc>,
    via: SnapshotSource,
}

#[derive(Default)]
struct ProxyState {
    snapshot: Option<Captured>,
    last_poll: Option<Instant>,
    last_poll_ok: bool,
    fail_streak: u32,
    last_ok_at: Option<DateTime<Utc>>,
    last_fail_at: Option<DateTime<Utc>>,
    last_push: Option<Instant>,
    /// 上一次轮询结果，用于只在状态切换时打日志
    was_ok: Option<bool>,
}

impl ProxyState {
    /// 下一次真实轮询前的最短间隔：成功后 `min_ok_gap_s`，失败后按连续失败次数退避。
    fn min_gap(&self, cfg: &DeviceConfig) -> Duration {
        if self.last_poll_ok {
            return secs_f64(cfg.min_ok_gap_s);
        }
        let base = cfg.min_fail_gap_s;
        let gap = match self.fail_streak {
            0 | 1 => base,
            2..=3 => base.max(4.0),
            4..=6 => base.max(6.0),
            _ => base.max(10.0),
        };
        secs_f64(gap)
    }

    fn push_is_recent(&self, cfg: &DeviceConfig) -> bool {
        self.last_push
            .is_some_and(|at| at.elapsed() <= secs_f64(cfg.online_grace_s))
    }

    fn next_poll_in(&self, cfg: &DeviceConfig) -> Duration {
        match self.last_poll {
            Some(at) => self.min_gap(cfg).saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    fn in_window(&self, cfg: &DeviceConfig) -> bool {
        self.last_poll.is_some() && self.next_poll_in(cfg) > Duration::ZERO
    }

    fn online(&self, cfg: &DeviceConfig, now: DateTime<Utc>) -> bool {
        let grace = secs_f64(cfg.online_grace_s).as_secs_f64();
        let seen_ok = self.last_ok_at.is_some_and(|t| utils::secs_between(t, now) <= grace);
        let failed_after = match (self.last_fail_at, self.last_ok_at) {
            (Some(fail), Some(ok)) => fail > ok,
            (Some(_), None) => true,
            _ => false,
        };
        seen_ok && !failed_after
    }

    fn view(&self, cfg: &DeviceConfig) -> Option<DeviceStateSnapshot> {
        let captured = self.snapshot.as_ref()?;
        let now = Utc::now();
        Some(DeviceStateSnapshot {
            raw: captured.raw.clone(),
            state: captured.state.clone(),
            captured_at: captured.captured_at,
            ok: self.last_poll_ok || self.push_is_recent(cfg),
            stale: self.fail_streak > 0,
            via: captured.via,
            fail_streak: self.fail_streak,
            last_ok_at: self.last_ok_at,
            last_fail_at: self.last_fail_at,
            online: self.online(cfg, now),
            next_poll_in_s: self.next_poll_in(cfg).as_secs_f64(),
        })
    }
}

/// 控制器状态代理：短时缓存 + 失败退避 + 并发合并，命令单次转发。
#[derive(Clone)]
pub struct DeviceProxy {
    http: RobustClient,
    config: ConfigHandle,
    state: Arc<Mutex<ProxyState>>,
    poll_gate: Arc<TokioMutex<()>>,
}

impl DeviceProxy {
    pub fn new(http: RobustClient, config: ConfigHandle) -> Self {
        Self {
            http,
            config,
            state: Arc::new(Mutex::new(ProxyState::default())),
            poll_gate: Arc::new(TokioMutex::new(())),
        }
    }

    /// 获取状态快照。窗口期内或最近有推送时不访问设备；
    /// 并发调用只会触发一次真实轮询。
    pub async fn get_status(&self) -> AppResult<DeviceStateSnapshot> {
        let cfg = self.config.device();
        if let Some(cached) = self.cached(&cfg)? {
            return Ok(cached);
        }

        let _gate = self.poll_gate.lock().await;
        // 等待期间别人可能刚完成一次轮询
        if let Some(cached) = self.cached(&cfg)? {
            return Ok(cached);
        }

        let result = self.poll_state(&cfg).await;
        self.apply_poll(&cfg, result)
    }

    /// 直接读取设备 `/state`，不经过缓存。
    pub async fn get_state_raw(&self) -> AppResult<Value> {
        let base = self.base_url()?;
        let cfg = self.config.device();
        self.http
            .get_json(format!("{}/state", base), &[], secs_f64(cfg.timeout_s))
            .await
            .map_err(|e| AppError::DeviceOffline(e.to_string()))
    }

    /// 单次转发命令，不重试。
    pub async fn send_command(&self, command: &DeviceCommand) -> AppResult<Value> {
        let base = self.base_url()?;
        let timeout = secs_f64(self.config.device().command_timeout_s);
        let url = format!("{}/{}", base, command.endpoint());
        info!("发送设备命令: {}", command);

        let result = match command.body() {
            Some(body) => self.http.post_json(&url, &body, timeout).await.map(|(_, v)| v),
            None => {
                let query = command.query();
                let pairs: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_str())).collect();
                self.http.get_value(&url, &pairs, timeout).await
            }
        };
        result.map_err(|e| {
            warn!("设备命令失败 ({}): {}", command, e);
            AppError::DeviceOffline(e.to_string())
        })
    }

    /// 设备主动推送状态。接受 `{ "state": {...} }` 或直接的状态对象。
    pub fn push_state(&self, payload: &Value) -> AppResult<PushAck> {
        let inner = match payload.get("state") {
            Some(Value::Object(_)) => &payload["state"],
            _ => payload,
        };
        let Some(obj) = inner.as_object() else {
            return Err(AppError::BadRequest("无效的状态载荷".to_string()));
        };
        if obj.is_empty() {
            return Err(AppError::BadRequest("状态载荷为空".to_string()));
        }
        let seq = obj.get("seq").and_then(Value::as_u64).unwrap_or(0);

        let mut state = normalize_state(inner);
        if let Some(map) = state.as_object_mut()
            && (map.contains_key("ssid") || map.contains_key("mac") || map.contains_key("rssi_dbm"))
        {
            map.insert("wifi".into(), json!(true));
        }

        let now = Utc::now();
        let mut st = self.state.lock().unwrap();
        st.snapshot = Some(Captured {
            raw: inner.clone(),
            state,
            captured_at: now,
            via: SnapshotSource::Push,
        });
        st.last_push = Some(Instant::now());
        st.last_ok_at = Some(now);
        st.fail_streak = 0;
        debug!("收到设备推送 seq={}", seq);
        Ok(PushAck {
            seq,
            server_ts: now.timestamp(),
        })
    }

    fn base_url(&self) -> AppResult<String> {
        self.config.device_base_url().ok_or(AppError::DeviceNotConfigured)
    }

    /// 窗口期内返回缓存；从未成功过且仍在失败窗口内时返回 ServiceUnavailable。
    fn cached(&self, cfg: &DeviceConfig) -> AppResult<Option<DeviceStateSnapshot>> {
        let st = self.state.lock().unwrap();
        if !(st.in_window(cfg) || st.push_is_recent(cfg)) {
            return Ok(None);
        }
        match st.view(cfg) {
            Some(view) => Ok(Some(view)),
            None if st.push_is_recent(cfg) => Ok(None),
            None => Err(AppError::ServiceUnavailable("尚未获取到设备状态".to_string())),
        }
    }

    async fn poll_state(&self, cfg: &DeviceConfig) -> AppResult<Value> {
        let base = self.base_url()?;
        let raw = self
            .http
            .get_value(format!("{}/state", base), &[], secs_f64(cfg.timeout_s))
            .await?;
        if !raw.is_object() {
            return Err(AppError::DeviceOffline("设备返回的状态不是 JSON 对象".to_string()));
        }
        Ok(raw)
    }

    fn apply_poll(&self, cfg: &DeviceConfig, result: AppResult<Value>) -> AppResult<DeviceStateSnapshot> {
        let now = Utc::now();
        let mut st = self.state.lock().unwrap();
        st.last_poll = Some(Instant::now());

        match result {
            Ok(raw) => {
                if st.was_ok != Some(true) {
                    info!("设备状态已更新 (连接正常)");
                }
                st.was_ok = Some(true);
                st.last_poll_ok = true;
                st.fail_streak = 0;
                st.last_ok_at = Some(now);
                st.snapshot = Some(Captured {
                    state: normalize_state(&raw),
                    raw,
                    captured_at: now,
                    via: SnapshotSource::Poll,
                });
            }
            Err(e) => {
                if st.was_ok != Some(false) {
                    warn!("获取设备状态失败，保留上一次状态: {}", e);
                } else {
                    debug!("设备仍然离线: {}", e);
                }
                st.was_ok = Some(false);
                st.last_poll_ok = false;
                st.fail_streak += 1;
                st.last_fail_at = Some(now);
                if st.snapshot.is_none() {
                    return Err(AppError::ServiceUnavailable(format!("设备状态不可用: {}", e)));
                }
            }
        }
        st.view(cfg)
            .ok_or_else(|| AppError::ServiceUnavailable("尚未获取到设备状态".to_string()))
    }
}
