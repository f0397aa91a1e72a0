use clap::{Parser, Subcommand};
use multicopier_lib::commands::{backup, ledger, location, log};
use multicopier_lib::logging::{get_log_dir, LogConfig, SizeRotatingWriter};
use multicopier_lib::{AppState, BackupStatus};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing_subscriber::prelude::*;

/// MultiCopier - 把一个主目录镜像到多个备份位置
#[derive(Parser, Debug)]
#[command(name = "multicopier")]
#[command(version)]
#[command(about = "Mirror a master folder to multiple backup locations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 备份到所有备份位置（未指定 --dest 时使用已保存的位置）
    Backup {
        #[arg(long, value_name = "PATH")]
        master: Option<String>,
        #[arg(long = "dest", value_name = "PATH")]
        dests: Vec<String>,
        /// 标记备份位置需要加密（仅对 --dest 指定的位置生效）
        #[arg(long)]
        encrypt: bool,
    },
    /// 浅层校验：比较文件数和目录数
    Check {
        #[arg(long, value_name = "PATH")]
        master: Option<String>,
        #[arg(long = "dest", value_name = "PATH")]
        dests: Vec<String>,
    },
    /// 使账本与主目录一致
    Align {
        #[arg(long, value_name = "PATH")]
        master: Option<String>,
    },
    /// 只检查路径冲突
    Validate {
        #[arg(long, value_name = "PATH")]
        master: String,
        #[arg(long = "dest", value_name = "PATH", required = true)]
        dests: Vec<String>,
    },
    /// 设置主目录
    Master { path: String },
    /// 管理备份位置
    Location {
        #[command(subcommand)]
        action: LocationAction,
    },
    /// 查看或修改日志配置
    Log {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long, value_name = "MB")]
        max_size_mb: Option<u32>,
        #[arg(long, value_name = "LEVEL")]
        level: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum LocationAction {
    Add {
        path: String,
        #[arg(long)]
        encrypt: bool,
    },
    Remove { path: String },
    List,
}

/// 初始化日志系统
fn init_logging() {
    let log_dir = get_log_dir();
    let _ = std::fs::create_dir_all(&log_dir);

    let config = LogConfig::load(&log_dir);

    if !config.enabled {
        let subscriber = tracing_subscriber::registry();
        let _ = tracing::subscriber::set_global_default(subscriber);
        return;
    }

    let mut env_filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(config.tracing_level().into());
    if let Ok(directive) = "sqlx=warn".parse() {
        env_filter = env_filter.add_directive(directive);
    }

    match SizeRotatingWriter::new(&log_dir, config.max_size_mb) {
        Ok(file_writer) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);

            // 在 debug 模式下也输出到 stderr
            #[cfg(debug_assertions)]
            {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false);

                let subscriber = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer)
                    .with(console_layer);

                let _ = tracing::subscriber::set_global_default(subscriber);
            }

            // 在 release 模式下只输出到文件
            #[cfg(not(debug_assertions))]
            {
                let subscriber = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer);

                let _ = tracing::subscriber::set_global_default(subscriber);
            }
        }
        Err(e) => {
            eprintln!("无法创建日志文件: {}", e);
            let _ = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(env_filter)
                .try_init();
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("输出结果失败: {}", e),
    }
}

async fn run(command: Command, state: &AppState) -> Result<bool, String> {
    match command {
        Command::Backup {
            master,
            dests,
            encrypt,
        } => {
            let summaries = backup::start_backup(master, dests, encrypt, state).await?;
            let mut all_ok = true;
            for summary in &summaries {
                match (&summary.report, &summary.error) {
                    (Some(report), _) => {
                        let c = &report.context;
                        println!(
                            "[{}] {}: 复制 {}, 更新 {}, 删除 {}, 新建目录 {}, 删除目录 {} ({} ms)",
                            summary.status,
                            summary.path,
                            c.files_copied,
                            c.files_updated,
                            c.files_deleted,
                            c.directories_created,
                            c.directories_deleted,
                            report.duration_ms
                        );
                    }
                    (None, error) => {
                        println!(
                            "[{}] {}: {}",
                            summary.status,
                            summary.path,
                            error.as_deref().unwrap_or_default()
                        );
                    }
                }
                all_ok &= summary.status == BackupStatus::Ok;
            }
            Ok(all_ok)
        }
        Command::Check { master, dests } => {
            let summaries = backup::check_backups(master, dests, state).await?;
            let mut all_ok = true;
            for summary in &summaries {
                match (&summary.result, &summary.error) {
                    (Some(result), _) => {
                        println!(
                            "{}: 文件数相差 {}, 目录数相差 {}",
                            summary.path,
                            result.file_mismatch_count,
                            result.directory_mismatch_count
                        );
                        all_ok &= !result.has_mismatch();
                    }
                    (None, error) => {
                        println!("{}: {}", summary.path, error.as_deref().unwrap_or_default());
                        all_ok = false;
                    }
                }
            }
            Ok(all_ok)
        }
        Command::Align { master } => {
            print_json(&ledger::align_ledger(master, state).await?);
            Ok(true)
        }
        Command::Validate { master, dests } => {
            backup::validate_paths(master, dests)?;
            println!("路径检查通过");
            Ok(true)
        }
        Command::Master { path } => {
            print_json(&location::set_master(path, state)?);
            Ok(true)
        }
        Command::Location { action } => {
            let settings = match action {
                LocationAction::Add { path, encrypt } => location::add_location(path, encrypt, state)?,
                LocationAction::Remove { path } => location::remove_location(path, state)?,
                LocationAction::List => location::list_locations(state)?,
            };
            print_json(&settings);
            Ok(true)
        }
        Command::Log {
            enabled,
            max_size_mb,
            level,
        } => {
            let config = if enabled.is_none() && max_size_mb.is_none() && level.is_none() {
                log::get_log_config(state)?
            } else {
                log::set_log_config(enabled, max_size_mb, level, state)?
            };
            print_json(&config);
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging();

    let state = match AppState::new().await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("初始化失败: {:#}", e);
            eprintln!("初始化失败: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    {
        let cancel_flag = state.cancel_flag.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("收到中断信号，正在取消备份...");
                cancel_flag.store(true, Ordering::SeqCst);
            }
        });
    }

    let result = run(cli.command, &state).await;
    state.cleanup().await;

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
