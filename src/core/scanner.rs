//! 主目录扫描器 - 为账本对账收集文件的路径、大小和修改时间

use crate::core::fs_helper::{classify, EntryKind};
use crate::error::BackupError;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

/// 扫描得到的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub full_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub last_modified: DateTime<Utc>,
}

/// 递归扫描目录下的所有文件（阻塞）
pub fn scan_files(root: &Path) -> Result<Vec<ScannedFile>, BackupError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| BackupError::io("扫描目录", root, e.into()))?;
        let path = entry.path();
        if classify(path, entry.file_type()) != Some(EntryKind::File) {
            continue;
        }

        let meta = fs::metadata(path).map_err(|e| BackupError::io("读取文件信息", path, e))?;
        let modified = meta
            .modified()
            .map_err(|e| BackupError::io("读取修改时间", path, e))?;

        files.push(ScannedFile {
            full_path: path.to_string_lossy().into_owned(),
            file_name: entry.file_name().to_string_lossy().into_owned(),
            file_size: meta.len(),
            last_modified: DateTime::<Utc>::from(modified),
        });
    }

    Ok(files)
}

/// 在后台线程扫描主目录
pub async fn scan_master_folder(root: &Path) -> Result<Vec<ScannedFile>, BackupError> {
    let root: PathBuf = root.to_path_buf();
    let files = tokio::task::spawn_blocking(move || scan_files(&root)).await??;
    info!("扫描完成: {} 个文件", files.len());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scans_all_levels() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.txt"), "top").unwrap();
        fs::write(dir.path().join("a/b/leaf.txt"), "leaf!").unwrap();

        let mut files = scan_master_folder(dir.path()).await.unwrap();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].file_name, "leaf.txt");
        assert_eq!(files[0].file_size, 5);
        assert!(files[0].full_path.ends_with("leaf.txt"));
        assert_eq!(files[1].file_name, "top.txt");
    }

    #[tokio::test]
    async fn test_missing_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan_master_folder(&dir.path().join("gone")).await.unwrap_err();
        assert!(matches!(err, BackupError::Io { .. }));
    }
}
