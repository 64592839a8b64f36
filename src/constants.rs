// src/constants.rs

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const LOG_DIR_NAME: &str = "logs";
pub const LOG_FILE_NAME: &str = concat!(clap::crate_name!(), ".log");
/// 内存日志环形缓冲的容量 (行)
pub const LOG_BUFFER_LINES: usize = 500;
pub const DEFAULT_LOG_TAIL: usize = 200;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_VIDEO_DIR: &str = "static/videos";
pub const REMOTE_CACHE_DIR: &str = "remote_cache";
pub const META_SUFFIX: &str = ".meta.json";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const USER_AGENT: &str = concat!("PanelHub/", clap::crate_version!());

/// 诊断响应头：标记本次资源由哪一层提供
pub const ASSET_SOURCE_HEADER: &str = "x-asset-source";

pub mod remote {
    pub const UI_CACHE_TTL_S: u64 = 3600;
    pub const UI_TIMEOUT_S: f64 = 3.0;
    pub const VIDEO_CACHE_TTL_S: u64 = 86_400;
    pub const VIDEO_TIMEOUT_S: f64 = 20.0;
    pub const FAIL_COOLDOWN_S: u64 = 90;
    pub const CACHE_BUSTER_PARAM: &str = "cb";

    pub const UI_FILES: &[&str] = &["index.html", "esp.html", "style.css"];
    pub const VIDEO_FILES: &[(&str, &str)] = &[
        ("welcome", "bemvindo.mp4"),
        ("video1", "video1.mp4"),
        ("saudacao", "saudacao.mp4"),
    ];
}

pub mod device {
    pub const TIMEOUT_S: f64 = 4.0;
    pub const COMMAND_TIMEOUT_S: f64 = 5.0;
    pub const MIN_OK_GAP_S: f64 = 1.0;
    pub const MIN_FAIL_GAP_S: f64 = 3.0;
    pub const ONLINE_GRACE_S: f64 = 12.0;

    /// GPIO 引脚到继电器名称的映射
    pub const RELAY_PINS: &[(u32, &str)] = &[(23, "r1"), (22, "r2"), (21, "r3"), (19, "r4")];
    pub const ZONES: &[&str] = &["QUIOSQUE", "PISCINA"];
    pub const PASSTHROUGH_KEYS: &[&str] = &[
        "local_ip",
        "gateway",
        "subnet",
        "free_heap_kb",
        "uptime_s",
        "flask_connected",
        "last_event",
    ];
}

pub mod network {
    pub const CONNECT_TIMEOUT_SECS: u64 = 5;
    pub const MAX_RETRIES: u32 = 2;
    pub const SYNC_WORKERS: usize = 2;
}

pub mod server {
    pub const SLOW_REQUEST_MS: u128 = 800;
    pub const AUTO_UPDATE_TICK_S: u64 = 2;
}
