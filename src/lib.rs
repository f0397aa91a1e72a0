use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod commands;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod logging;

pub use crate::core::{BackupEngine, BackupReport, FolderMirror, SyncContext};
pub use config::{BackupDestination, BackupSettings, BackupStatus};
pub use db::{BackupEntry, LedgerStore, SqliteLedger};
pub use error::{BackupError, CollisionError, FolderMismatch, NotEnoughDiskSpace};

const APP_DIR: &str = "multicopier";

/// 默认数据目录；`config.json` 中的 `data_path` 指向已存在的目录时改用该目录
pub fn data_dir() -> PathBuf {
    let default_dir = dirs::config_dir()
        .map(|p| p.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".multicopier"));

    std::fs::read_to_string(default_dir.join("config.json"))
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|config| config.get("data_path")?.as_str().map(PathBuf::from))
        .filter(|p| p.is_dir())
        .unwrap_or(default_dir)
}

/// 应用状态，在各个命令之间共享
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub config_dir: PathBuf,
    /// 备份取消标志（Ctrl-C 时置位）
    pub cancel_flag: Arc<AtomicBool>,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        let config_dir = data_dir();
        std::fs::create_dir_all(&config_dir)?;
        tracing::debug!("数据目录: {:?}", config_dir);

        Self::open(config_dir).await
    }

    /// 使用指定的数据目录打开账本数据库
    pub async fn open(config_dir: PathBuf) -> anyhow::Result<Self> {
        let db = db::connect(&config_dir.join("multicopier.db")).await?;

        Ok(Self {
            db: Arc::new(db),
            config_dir,
            cancel_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 基于共享数据库和取消标志创建备份引擎
    pub fn engine(&self) -> BackupEngine {
        BackupEngine::new(Arc::new(SqliteLedger::new(self.db.clone())))
            .with_cancel(self.cancel_flag.clone())
    }

    /// 清理资源（退出前调用）
    pub async fn cleanup(&self) {
        tracing::info!("正在清理应用资源...");

        self.cancel_flag.store(true, Ordering::SeqCst);

        tracing::debug!("关闭数据库连接池...");
        self.db.close().await;

        tracing::info!("资源清理完成");
    }
}

pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        }
    }
}
