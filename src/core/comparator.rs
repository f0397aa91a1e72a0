//! 浅层校验：分别统计两个目录树下的文件数与目录数并比较
//!
//! 只比较数量，不比较内容，也不确认同名文件是否一致。

use crate::core::fs_helper::{classify, EntryKind};
use crate::error::BackupError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// 数量比较结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderComparisonResult {
    pub file_mismatch_count: u64,
    pub directory_mismatch_count: u64,
}

impl FolderComparisonResult {
    pub fn new(file_mismatch_count: u64, directory_mismatch_count: u64) -> Self {
        Self {
            file_mismatch_count,
            directory_mismatch_count,
        }
    }

    pub fn has_mismatch(&self) -> bool {
        self.file_mismatch_count > 0 || self.directory_mismatch_count > 0
    }
}

/// 递归统计某一类目录项的数量（不含根目录本身）
fn count_entries(root: &Path, kind: EntryKind) -> Result<u64, BackupError> {
    let mut count = 0u64;
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| BackupError::io("统计目录", root, e.into()))?;
        if classify(entry.path(), entry.file_type()) == Some(kind) {
            count += 1;
        }
    }
    Ok(count)
}

fn count_both(master: &Path, backup: &Path, kind: EntryKind) -> Result<(u64, u64), BackupError> {
    Ok((count_entries(master, kind)?, count_entries(backup, kind)?))
}

/// 比较两个目录树的文件数和目录数；文件统计与目录统计并行执行
pub async fn compare_counts(
    master: &Path,
    backup: &Path,
) -> Result<FolderComparisonResult, BackupError> {
    let spawn_count = |kind: EntryKind| {
        let master: PathBuf = master.to_path_buf();
        let backup: PathBuf = backup.to_path_buf();
        tokio::task::spawn_blocking(move || count_both(&master, &backup, kind))
    };

    let file_task = spawn_count(EntryKind::File);
    let dir_task = spawn_count(EntryKind::Dir);

    let (files, dirs) = tokio::try_join!(file_task, dir_task)?;
    let (master_files, backup_files) = files?;
    let (master_dirs, backup_dirs) = dirs?;

    debug!(
        "数量比较: 文件 {}/{}, 目录 {}/{}",
        master_files, backup_files, master_dirs, backup_dirs
    );

    Ok(FolderComparisonResult::new(
        master_files.abs_diff(backup_files),
        master_dirs.abs_diff(backup_dirs),
    ))
}
