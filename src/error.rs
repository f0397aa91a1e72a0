//! 错误类型
//!
//! 每一类失败对应一个独立变体，携带足够的上下文（路径、字节数、差异数量），
//! 调用方无需查看日志即可处理。

use std::io;
use std::path::PathBuf;
use thiserror::Error;

const MB: u64 = 1024 * 1024;

/// 备份流程中的所有错误
#[derive(Debug, Error)]
pub enum BackupError {
    /// 主目录或备份目录为空、不存在或不是目录
    #[error("{name} 路径无效: {path:?} ({reason})")]
    InvalidPath {
        name: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error(transparent)]
    DiskSpace(#[from] NotEnoughDiskSpace),

    /// 复制、删除、创建等文件系统操作失败
    #[error("{operation} 失败: {path:?}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Collision(#[from] CollisionError),

    #[error(transparent)]
    Mismatch(#[from] FolderMismatch),

    /// 镜像在目录层级之间被取消，目标目录处于部分同步状态
    #[error("镜像已取消，目标目录未完成同步: {path:?}")]
    Cancelled { path: PathBuf },

    /// 后台工作线程异常退出
    #[error("后台任务失败: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Ledger(#[from] anyhow::Error),
}

impl BackupError {
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn invalid_path(
        name: &'static str,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidPath {
            name,
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// 备份卷剩余空间不足
#[derive(Debug, Clone, Error)]
#[error(
    "备份位置 {path:?} 所在磁盘空间不足: 需要 {} MB ({required} 字节), 可用 {} MB ({available} 字节)",
    .required / MB,
    .available / MB
)]
pub struct NotEnoughDiskSpace {
    pub path: PathBuf,
    pub required: u64,
    pub available: u64,
}

/// 镜像完成后文件数或目录数与主目录不一致
#[derive(Debug, Clone, Error)]
#[error(
    "备份校验失败 {path:?}: 文件数相差 {file_mismatch_count}, 目录数相差 {directory_mismatch_count}"
)]
pub struct FolderMismatch {
    pub path: PathBuf,
    pub file_mismatch_count: u64,
    pub directory_mismatch_count: u64,
}

/// 主目录与备份目录的路径冲突
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollisionError {
    #[error("路径无法解析: {path:?} ({reason})")]
    Unresolvable { path: PathBuf, reason: String },

    #[error("存在重复的备份位置: {path:?}，每个备份位置必须唯一")]
    DuplicateBackup { path: PathBuf },

    #[error("备份位置与主目录相同: {path:?}")]
    SameAsMaster { path: PathBuf },

    #[error("备份位置 {path:?} 位于主目录 {master:?} 内部，会导致递归复制")]
    InsideMaster { path: PathBuf, master: PathBuf },

    #[error("主目录 {master:?} 位于备份位置 {path:?} 内部，镜像会删除主目录")]
    MasterInsideBackup { path: PathBuf, master: PathBuf },

    #[error("备份位置 {inner:?} 嵌套在另一个备份位置 {outer:?} 内部")]
    NestedBackups { outer: PathBuf, inner: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_space_message_keeps_exact_bytes() {
        let err = NotEnoughDiskSpace {
            path: PathBuf::from("/mnt/usb"),
            required: 4096,
            available: 1000,
        };
        let message = err.to_string();
        assert!(message.contains("需要 0 MB (4096 字节)"), "{message}");
        assert!(message.contains("可用 0 MB (1000 字节)"), "{message}");
    }
}
