// src/config.rs

pub mod store;

use crate::{
    constants,
    error::{AppError, AppResult},
    models::AssetCategory,
};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteAssetsConfig {
    pub base_url: String,
    pub cache_ttl_s: u64,
    pub timeout_s: f64,
    pub fail_cooldown_s: u64,
    /// 需要同步的 UI 文件 (相对路径)
    pub files: Vec<String>,
}

impl Default for RemoteAssetsConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            cache_ttl_s: constants::remote::UI_CACHE_TTL_S,
            timeout_s: constants::remote::UI_TIMEOUT_S,
            fail_cooldown_s: constants::remote::FAIL_COOLDOWN_S,
            files: constants::remote::UI_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteVideosConfig {
    pub base_url: String,
    pub cache_ttl_s: u64,
    pub timeout_s: f64,
    pub fail_cooldown_s: u64,
    /// 视频键 -> 文件名
    pub files: BTreeMap<String, String>,
}

impl Default for RemoteVideosConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            cache_ttl_s: constants::remote::VIDEO_CACHE_TTL_S,
            timeout_s: constants::remote::VIDEO_TIMEOUT_S,
            fail_cooldown_s: constants::remote::FAIL_COOLDOWN_S,
            files: constants::remote::VIDEO_FILES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub timeout_s: f64,
    pub command_timeout_s: f64,
    pub min_ok_gap_s: f64,
    pub min_fail_gap_s: f64,
    pub online_grace_s: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            timeout_s: constants::device::TIMEOUT_S,
            command_timeout_s: constants::device::COMMAND_TIMEOUT_S,
            min_ok_gap_s: constants::device::MIN_OK_GAP_S,
            min_fail_gap_s: constants::device::MIN_FAIL_GAP_S,
            online_grace_s: constants::device::ONLINE_GRACE_S,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub sync_workers: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: constants::network::CONNECT_TIMEOUT_SECS,
            max_retries: constants::network::MAX_RETRIES,
            sync_workers: constants::network::SYNC_WORKERS,
        }
    }
}

/// 磁盘上的 `config.json`。未识别的键原样保留，保存时不会丢失。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    pub esp_ip: String,
    pub remote_assets: RemoteAssetsConfig,
    pub remote_videos: RemoteVideosConfig,
    pub video_dir: String,
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub auto_update_ui: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            esp_ip: String::new(),
            remote_assets: RemoteAssetsConfig::default(),
            remote_videos: RemoteVideosConfig::default(),
            video_dir: constants::DEFAULT_VIDEO_DIR.to_string(),
            device: DeviceConfig::default(),
            network: NetworkConfig::default(),
            auto_update_ui: false,
            extra: Map::new(),
        }
    }
}

/// 某一类资源的远程源设置（已换算为 `Duration`）。
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSource {
    pub base_url: String,
    pub cache_ttl: Duration,
    pub timeout: Duration,
    pub fail_cooldown: Duration,
}

impl RemoteSource {
    pub fn is_enabled(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    /// 拼接远程 URL: `<base_url>/<rel_path>`
    pub fn url_for(&self, rel_path: &str) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        Some(format!(
            "{}/{}",
            self.base_url.trim().trim_end_matches('/'),
            rel_path.trim_start_matches('/')
        ))
    }
}

impl ExternalConfig {
    pub fn remote_source(&self, category: AssetCategory) -> RemoteSource {
        let (base_url, ttl, timeout, cooldown) = match category {
            AssetCategory::Ui => (
                &self.remote_assets.base_url,
                self.remote_assets.cache_ttl_s,
                self.remote_assets.timeout_s,
                self.remote_assets.fail_cooldown_s,
            ),
            AssetCategory::Video => (
                &self.remote_videos.base_url,
                self.remote_videos.cache_ttl_s,
                self.remote_videos.timeout_s,
                self.remote_videos.fail_cooldown_s,
            ),
        };
        RemoteSource {
            base_url: base_url.trim().to_string(),
            cache_ttl: Duration::from_secs(ttl),
            timeout: secs_f64(timeout),
            fail_cooldown: Duration::from_secs(cooldown),
        }
    }

    /// 设备基础 URL，例如 `http://192.168.0.150`；未配置时返回 None。
    pub fn device_base_url(&self) -> Option<String> {
        let ip = self.esp_ip.trim();
        if ip.is_empty() {
            return None;
        }
        let base = if ip.starts_with("http://") || ip.starts_with("https://") {
            ip.to_string()
        } else {
            format!("http://{}", ip)
        };
        Some(base.trim_end_matches('/').to_string())
    }

    pub fn video_dir(&self) -> PathBuf {
        let raw = self.video_dir.trim();
        if raw.is_empty() {
            PathBuf::from(constants::DEFAULT_VIDEO_DIR)
        } else {
            PathBuf::from(raw)
        }
    }
}

/// 把配置里的秒数 (可能为负或 NaN) 安全地换算成 Duration。
pub fn secs_f64(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// 线程安全的配置句柄，显式注入到各组件中。
///
/// 运行期可修改的字段只有设备 IP、两个远程 base_url 和自动更新开关；
/// 每次修改先写回磁盘，写入成功后才对其他读者可见。
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<ExternalConfig>>,
    path: Option<Arc<PathBuf>>,
    save_lock: Arc<Mutex<()>>,
}

impl ConfigHandle {
    /// 从磁盘加载配置；文件不存在时写入默认配置。
    pub fn load(path: &Path) -> AppResult<Self> {
        let config = store::load_or_create_external_config(path)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(config)),
            path: Some(Arc::new(path.to_path_buf())),
            save_lock: Arc::new(Mutex::new(())),
        })
    }

    /// 不落盘的句柄，修改只存在于内存中。
    pub fn in_memory(config: ExternalConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path: None,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn snapshot(&self) -> ExternalConfig {
        self.inner.read().unwrap().clone()
    }

    pub fn esp_ip(&self) -> String {
        self.inner.read().unwrap().esp_ip.clone()
    }

    pub fn device_base_url(&self) -> Option<String> {
        self.inner.read().unwrap().device_base_url()
    }

    pub fn device(&self) -> DeviceConfig {
        self.inner.read().unwrap().device.clone()
    }

    pub fn remote_source(&self, category: AssetCategory) -> RemoteSource {
        self.inner.read().unwrap().remote_source(category)
    }

    pub fn auto_update_ui(&self) -> bool {
        self.inner.read().unwrap().auto_update_ui
    }

    pub fn set_esp_ip(&self, ip: &str) -> AppResult<String> {
        let ip = ip.trim();
        if ip.is_empty() {
            return Err(AppError::BadRequest("ip 为空".to_string()));
        }
        if ip.chars().any(char::is_whitespace) {
            return Err(AppError::BadRequest(format!("无效的 IP: '{}'", ip)));
        }
        self.update(|cfg| cfg.esp_ip = ip.to_string())?;
        info!("设备 IP 已更新: {}", ip);
        Ok(ip.to_string())
    }

    pub fn set_remote_base_url(&self, category: AssetCategory, base_url: &str) -> AppResult<()> {
        let base_url = base_url.trim();
        if !base_url.is_empty() {
            url::Url::parse(base_url)?;
        }
        self.update(|cfg| match category {
            AssetCategory::Ui => cfg.remote_assets.base_url = base_url.to_string(),
            AssetCategory::Video => cfg.remote_videos.base_url = base_url.to_string(),
        })?;
        info!("远程源 {} 的 base_url 已更新: '{}'", category, base_url);
        Ok(())
    }

    pub fn set_auto_update_ui(&self, enabled: bool) -> AppResult<()> {
        self.update(|cfg| cfg.auto_update_ui = enabled)
    }

    fn update<F>(&self, mutate: F) -> AppResult<()>
    where
        F: FnOnce(&mut ExternalConfig),
    {
        // 保证多次并发修改按顺序落盘，避免旧快照覆盖新快照
        // 先在副本上修改并落盘，成功后才替换内存中的配置
        let _guard = self.save_lock.lock().unwrap();
        let mut next = self.snapshot();
        mutate(&mut next);
        if let Some(path) = &self.path {
            store::save_external_config(path, &next)?;
        }
        *self.inner.write().unwrap() = next;
        Ok(())
    }
}
