// src/main.rs

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use log::info;
use panel_hub::{cli::Cli, logging, run_from_cli};
use std::{env, sync::Arc};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    // 为 Windows 终端启用 ANSI 颜色支持。
    #[cfg(windows)]
    {
        colored::control::set_virtual_terminal(true).ok();
    }

    let bin_name = env::var("CARGO_BIN_NAME").unwrap_or_else(|_| "panel-hub".to_string());
    let after_help = format!(
        "示例:\n  # 使用默认目录启动\n  {bin}\n\n  # 指定端口与数据目录\n  {bin} --port 9000 --data-dir /var/lib/panel\n\n  # 使用独立的配置文件\n  {bin} -c ./config.json",
        bin = bin_name
    );
    let cmd = Cli::command().after_help(after_help);
    let args = match Cli::from_arg_matches(&cmd.get_matches()) {
        Ok(args) => Arc::new(args),
        Err(e) => e.exit(),
    };

    logging::init_logger(args.log_level.into(), &args.data_dir);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n{} 收到中断信号，正在停止服务...", "[!]".yellow());
            info!("收到 Ctrl+C，开始优雅退出");
            signal_token.cancel();
        }
    });

    if let Err(e) = run_from_cli(args, shutdown).await {
        eprintln!("\n{} {}", "[X]".red(), format!("程序执行出错: {}", e).red());
        std::process::exit(1);
    }
}
