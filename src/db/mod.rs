//! 账本存储 - 记录主目录中已知文件的路径、哈希、大小和修改时间

pub mod models;
pub use models::*;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
pub use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 打开（必要时创建）账本数据库并执行迁移
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    // Windows 路径需要转换反斜杠为正斜杠
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid database path"))?
        .replace('\\', "/");

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path_str))?
        .journal_mode(SqliteJournalMode::Wal);

    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect_with(options)
        .await
        .with_context(|| format!("打开账本数据库失败: {}", db_path_str))?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("账本数据库迁移失败")?;

    Ok(db)
}

/// 账本存储接口
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// 加载全部记录
    async fn load_all(&self) -> Result<Vec<BackupEntry>>;

    /// 在同一个事务中应用删除、新增和更新，最后提交
    async fn apply_changes(&self, changes: &LedgerChanges) -> Result<()>;

    /// 把 WAL 中的修改写回主数据库文件
    async fn checkpoint(&self) -> Result<()>;

    /// 整理数据库文件，回收批量删除留下的空间
    async fn compact(&self) -> Result<()>;

    async fn count(&self) -> Result<u64>;
}

/// SQLite 账本
pub struct SqliteLedger {
    db: Arc<SqlitePool>,
}

impl SqliteLedger {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn load_all(&self) -> Result<Vec<BackupEntry>> {
        let rows = sqlx::query_as::<_, BackupEntryRow>("SELECT * FROM backup_entries")
            .fetch_all(&*self.db)
            .await
            .context("加载账本失败")?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(row.try_into()?);
        }
        Ok(entries)
    }

    async fn apply_changes(&self, changes: &LedgerChanges) -> Result<()> {
        let mut tx = self.db.begin().await.context("开启账本事务失败")?;

        for entry in &changes.deleted {
            sqlx::query("DELETE FROM backup_entries WHERE original_file_path = ?")
                .bind(&entry.original_file_path)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("删除账本记录失败: {}", entry.original_file_path))?;
        }

        for entry in &changes.added {
            let encryption = entry.encryption.as_ref();
            sqlx::query(
                r#"INSERT INTO backup_entries
                   (original_file_name, original_file_path, content_hash, file_size, last_modified, backup_time,
                    encrypted_file_name, encrypted_file_path, encryption_key, iv)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&entry.original_file_name)
            .bind(&entry.original_file_path)
            .bind(&entry.content_hash)
            .bind(entry.file_size)
            .bind(entry.last_modified.timestamp_millis())
            .bind(entry.backup_time.timestamp_millis())
            .bind(encryption.map(|e| e.encrypted_file_name.clone()))
            .bind(encryption.map(|e| e.encrypted_file_path.clone()))
            .bind(encryption.map(|e| e.encryption_key.clone()))
            .bind(encryption.map(|e| e.iv.clone()))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("新增账本记录失败: {}", entry.original_file_path))?;
        }

        for entry in &changes.updated {
            sqlx::query(
                r#"UPDATE backup_entries SET
                       content_hash = ?,
                       file_size = ?,
                       last_modified = ?
                   WHERE original_file_path = ?"#,
            )
            .bind(&entry.content_hash)
            .bind(entry.file_size)
            .bind(entry.last_modified.timestamp_millis())
            .bind(&entry.original_file_path)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("更新账本记录失败: {}", entry.original_file_path))?;
        }

        tx.commit().await.context("提交账本事务失败")?;

        info!(
            "账本已更新: 新增 {}, 更新 {}, 删除 {}",
            changes.added.len(),
            changes.updated.len(),
            changes.deleted.len()
        );
        Ok(())
    }

    async fn checkpoint(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(FULL)")
            .execute(&*self.db)
            .await
            .context("WAL 检查点失败")?;
        debug!("WAL 检查点完成");
        Ok(())
    }

    async fn compact(&self) -> Result<()> {
        sqlx::query("VACUUM")
            .execute(&*self.db)
            .await
            .context("整理账本数据库失败")?;
        info!("账本数据库整理完成");
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM backup_entries")
            .fetch_one(&*self.db)
            .await?;
        Ok(count as u64)
    }
}
