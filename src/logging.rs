// src/logging.rs

use crate::constants;
use fern::colors::{Color, ColoredLevelConfig};
use log::{LevelFilter, warn};
use std::{
    collections::VecDeque,
    env,
    fs::File,
    path::Path,
    sync::{LazyLock, Mutex},
};

/// 最近的日志行，供 `/api/logs` 读取。
pub static RECENT_LOGS: LazyLock<LogBuffer> = LazyLock::new(|| LogBuffer::new(constants::LOG_BUFFER_LINES));

/// 固定容量的日志环形缓冲，写满后丢弃最旧的行。
pub struct LogBuffer {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// 最后 `n` 行，按时间顺序
    pub fn tail(&self, n: usize) -> Vec<String> {
        let lines = self.lines.lock().unwrap();
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }
}

/// 初始化日志：同时输出到 stderr 和 `<data_dir>/logs/panel-hub.log`。
///
/// 主日志文件无法打开时退回到用户缓存目录（或系统临时目录）；
/// 两者都失败时只输出到 stderr。
pub fn init_logger(level: LevelFilter, data_dir: &Path) {
    let app_name = clap::crate_name!();
    let log_file_path = data_dir
        .join(constants::LOG_DIR_NAME)
        .join(constants::LOG_FILE_NAME);

    let file_appender = open_log_file(&log_file_path).or_else(|| {
        let fallback_path = dirs::cache_dir()
            .unwrap_or_else(env::temp_dir)
            .join(app_name)
            .join(constants::LOG_FILE_NAME);
        eprintln!(
            "警告: 无法打开日志文件 {:?}，改用备用文件 {:?}",
            log_file_path, fallback_path
        );
        open_log_file(&fallback_path)
    });

    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::BrightBlack);

    let stderr = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{}] [{:<5}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                colors.color(record.level()),
                message
            ))
        })
        .chain(std::io::stderr());

    let mut dispatch = fern::Dispatch::new()
        .level(level)
        // 第三方库的连接细节只在 trace 级别输出
        .level_for("hyper", LevelFilter::Warn)
        .level_for("hyper_util", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("mio", LevelFilter::Warn)
        .chain(stderr);

    // 内存缓冲：与文件相同的时间格式，不带源码位置
    dispatch = dispatch.chain(
        fern::Dispatch::new()
            .level(LevelFilter::Info.min(level))
            .format(|out, message, record| {
                out.finish(format_args!(
                    "[{}] [{}] {}",
                    chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    message
                ))
            })
            .chain(fern::Output::call(|record| RECENT_LOGS.push(record.args().to_string()))),
    );

    if let Some(file) = file_appender {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "[{}] [{:<5}] [{}:{}] - {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                        record.level(),
                        record.target(),
                        record.line().unwrap_or(0),
                        message
                    ))
                })
                .chain(file),
        );
    }

    if let Err(e) = dispatch.apply() {
        eprintln!("警告: 日志系统初始化失败: {}", e);
        return;
    }
    if level != LevelFilter::Off {
        warn_if_level_noisy(level);
    }
}

fn open_log_file(path: &Path) -> Option<File> {
    if let Some(dir) = path.parent()
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("警告: 无法创建日志目录 {:?}: {}", dir, e);
        return None;
    }
    fern::log_file(path).ok()
}

fn warn_if_level_noisy(level: LevelFilter) {
    if level >= LevelFilter::Trace {
        warn!("日志级别为 trace，日志文件可能快速增长");
    }
}
