use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 加密元数据（由外部加密服务生成，核心只负责存取）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionMetadata {
    pub encrypted_file_name: String,
    pub encrypted_file_path: String,
    pub encryption_key: Vec<u8>,
    pub iv: Vec<u8>,
}

/// 账本记录，以原始完整路径为唯一键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    /// 新记录为 None，写入数据库后由 SQLite 分配
    pub id: Option<i64>,
    pub original_file_name: String,
    pub original_file_path: String,
    pub content_hash: String,
    pub file_size: i64,
    pub last_modified: DateTime<Utc>,
    pub backup_time: DateTime<Utc>,
    pub encryption: Option<EncryptionMetadata>,
}

impl BackupEntry {
    pub fn new(
        original_file_name: String,
        original_file_path: String,
        content_hash: String,
        file_size: i64,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            original_file_name,
            original_file_path,
            content_hash,
            file_size,
            last_modified,
            backup_time: Utc::now(),
            encryption: None,
        }
    }
}

/// 一次对账需要写入账本的全部变更
#[derive(Debug, Clone, Default)]
pub struct LedgerChanges {
    pub added: Vec<BackupEntry>,
    pub updated: Vec<BackupEntry>,
    pub deleted: Vec<BackupEntry>,
}

impl LedgerChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

// 数据库表模型
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BackupEntryRow {
    pub id: i64,
    pub original_file_name: String,
    pub original_file_path: String,
    pub content_hash: String,
    pub file_size: i64,
    pub last_modified: i64,
    pub backup_time: i64,
    pub encrypted_file_name: Option<String>,
    pub encrypted_file_path: Option<String>,
    pub encryption_key: Option<Vec<u8>>,
    pub iv: Option<Vec<u8>>,
}

fn from_millis(millis: i64, column: &str) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| anyhow!("无效的时间戳 {}: {}", column, millis))
}

impl TryFrom<BackupEntryRow> for BackupEntry {
    type Error = anyhow::Error;

    fn try_from(row: BackupEntryRow) -> Result<Self, Self::Error> {
        // 四个加密字段同时存在才视为已加密
        let encryption = match (
            row.encrypted_file_name,
            row.encrypted_file_path,
            row.encryption_key,
            row.iv,
        ) {
            (Some(name), Some(path), Some(key), Some(iv)) => Some(EncryptionMetadata {
                encrypted_file_name: name,
                encrypted_file_path: path,
                encryption_key: key,
                iv,
            }),
            _ => None,
        };

        Ok(BackupEntry {
            id: Some(row.id),
            original_file_name: row.original_file_name,
            original_file_path: row.original_file_path,
            content_hash: row.content_hash,
            file_size: row.file_size,
            last_modified: from_millis(row.last_modified, "last_modified")?,
            backup_time: from_millis(row.backup_time, "backup_time")?,
            encryption,
        })
    }
}
