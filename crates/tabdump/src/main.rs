use std::io::stderr;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::Instant;

use clap::Parser;
use tracing_appender::{non_blocking, rolling::never};
use tracing_subscriber::{EnvFilter, fmt::layer, layer::SubscriberExt, util::SubscriberInitExt};

use tabdump_core::check_connection;

use crate::config::Config;
use crate::error::Result;
use crate::progress::Reporter;

mod config;
mod error;
mod export;
mod progress;
mod schedule;
#[cfg(test)]
mod test_support;

/// 将数据库表按块导出为 CSV 文件
#[derive(Debug, Parser)]
#[command(name = "tabdump", version, about)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

/// 初始化日志系统，配置了 log_dir 时同时写入 tabdump.log
fn init_logging(log_dir: Option<&Path>) -> Option<non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = layer().with_writer(stderr);

    match log_dir {
        Some(dir) => {
            let (writer, guard) = non_blocking(never(dir, "tabdump.log"));
            tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(console).init();
            None
        }
    }
}

fn main() {
    // 1. 解析命令行参数
    let cli = Cli::parse();

    // 2. 读取配置，日志系统依赖配置中的 log_dir
    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            exit(1);
        }
    };

    // 3. 初始化日志系统
    let _log_guard = init_logging(config.log_dir.as_deref());
    tracing::info!("配置文件加载成功: {}", cli.config.display());

    if let Err(err) = run(&config) {
        tracing::error!("{}", err);
        exit(1);
    }
}

fn run(config: &Config) -> Result<()> {
    let opts = config.datasource();
    tracing::info!("正在连接数据库 ({}): {}", opts.kind().label(), opts.endpoint());
    check_connection(&opts)?;
    tracing::info!("数据库连接成功");

    let plans = schedule::plan(config);
    tracing::info!(
        "待导出 {} 个表，chunk_size={}，并发={}",
        plans.len(),
        config.chunk_size,
        config.concurrently
    );

    let start_time = Instant::now();
    let reporter = Reporter::new();
    let summaries = schedule::run(&opts, &plans, config.chunk_size, config.concurrently, &reporter)?;

    let rows: u64 = summaries.iter().map(|s| s.rows).sum();
    let chunks: usize = summaries.iter().map(|s| s.chunks).sum();
    tracing::info!(
        "全部导出完成: {} 个表，{} 行，{} 个文件，耗时 {:.1} 秒",
        summaries.len(),
        rows,
        chunks,
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
