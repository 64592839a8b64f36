// src/cli.rs

use crate::constants;
use clap::{Parser, ValueEnum, command, crate_version};
use std::path::PathBuf;

/// 定义日志输出级别
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    version = crate_version!(),
    about,
    long_about = None,
    disable_help_flag = true,
    disable_version_flag = true,
)]
pub struct Cli {
    // --- 服务选项 (Server) ---
    /// 监听地址
    #[arg(long, default_value_t = constants::DEFAULT_HOST.to_string(), help_heading = "Server")]
    pub host: String,
    /// 监听端口
    #[arg(short, long, env = "PANEL_PORT", default_value_t = constants::DEFAULT_PORT, help_heading = "Server")]
    pub port: u16,

    // --- 目录选项 (Paths) ---
    /// 数据目录 (配置、远程缓存、日志)
    #[arg(short, long, value_name = "DIR", default_value_os_t = PathBuf::from(constants::DEFAULT_DATA_DIR), help_heading = "Paths")]
    pub data_dir: PathBuf,
    /// 内置静态文件目录 (本地回退)
    #[arg(short, long, value_name = "DIR", default_value_os_t = PathBuf::from(constants::DEFAULT_STATIC_DIR), help_heading = "Paths")]
    pub static_dir: PathBuf,
    /// 指定配置文件路径 (默认: <DATA_DIR>/config.json)
    #[arg(short, long, value_name = "FILE", help_heading = "Paths")]
    pub config: Option<PathBuf>,

    // --- 通用选项 (General) ---
    /// 显示此帮助信息并退出
    #[arg(short = 'h', long, action = clap::ArgAction::Help, global = true, help_heading = "General")]
    _help: Option<bool>,
    /// 显示版本信息并退出
    #[arg(short = 'V', long, action = clap::ArgAction::Version, global = true, help_heading = "General")]
    _version: Option<bool>,
    /// (隐藏参数) 设置日志输出级别，用于调试
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true, hide = true)]
    pub log_level: LogLevel,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.data_dir.join(constants::CONFIG_FILE_NAME))
    }
}
