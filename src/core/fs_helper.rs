//! 文件系统辅助工具：目录大小、卷格式检测、磁盘空间检查

use crate::error::{BackupError, NotEnoughDiskSpace};
use std::fs::{self, FileType};
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// FAT 系列文件系统的修改时间精度为 2 秒
pub const FAT_TIME_TOLERANCE_SECS: u64 = 2;

const FAT_FORMATS: &[&str] = &["fat", "vfat", "fat12", "fat16", "fat32", "msdos"];

/// 卷信息查询接口
pub trait VolumeProbe: Send + Sync {
    /// 路径所在卷的文件系统格式（如 "ext4"、"vfat"、"NTFS"）
    fn filesystem_format(&self, path: &Path) -> Option<String>;

    /// 路径所在卷的可用空间（字节）
    fn available_space(&self, path: &Path) -> Option<u64>;
}

/// 基于 sysinfo 的系统卷查询
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemVolumes;

impl SystemVolumes {
    /// 找到挂载点最长匹配该路径的磁盘
    fn with_disk<T>(path: &Path, f: impl Fn(&sysinfo::Disk) -> T) -> Option<T> {
        let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let disks = Disks::new_with_refreshed_list();

        disks
            .iter()
            .filter(|d| resolved.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().components().count())
            .map(f)
    }
}

impl VolumeProbe for SystemVolumes {
    fn filesystem_format(&self, path: &Path) -> Option<String> {
        Self::with_disk(path, |d| d.file_system().to_string_lossy().into_owned())
    }

    fn available_space(&self, path: &Path) -> Option<u64> {
        Self::with_disk(path, |d| d.available_space())
    }
}

/// 判断路径所在卷是否为 FAT32 类文件系统
pub fn is_fat32(volumes: &dyn VolumeProbe, path: &Path) -> bool {
    volumes
        .filesystem_format(path)
        .map(|format| {
            FAT_FORMATS
                .iter()
                .any(|fat| format.eq_ignore_ascii_case(fat))
        })
        .unwrap_or(false)
}

/// 目标卷的时间容差（秒）
pub fn time_tolerance_secs(volumes: &dyn VolumeProbe, path: &Path) -> u64 {
    if is_fat32(volumes, path) {
        FAT_TIME_TOLERANCE_SECS
    } else {
        0
    }
}

/// 目录项类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// 判断目录项类型；指向目录的符号链接返回 None（避免循环递归）
pub fn classify(path: &Path, file_type: FileType) -> Option<EntryKind> {
    if file_type.is_dir() {
        return Some(EntryKind::Dir);
    }
    if file_type.is_file() {
        return Some(EntryKind::File);
    }
    if file_type.is_symlink() {
        return match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Some(EntryKind::File),
            Ok(_) => {
                debug!("跳过指向目录的符号链接: {:?}", path);
                None
            }
            Err(e) => {
                debug!("跳过失效的符号链接: {:?} ({})", path, e);
                None
            }
        };
    }
    None
}

/// 递归计算目录下所有文件的总大小
pub fn directory_size(root: &Path) -> Result<u64, BackupError> {
    let mut size = 0u64;

    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| BackupError::io("计算目录大小", root, e.into()))?;
        if classify(entry.path(), entry.file_type()) != Some(EntryKind::File) {
            continue;
        }
        let meta = fs::metadata(entry.path())
            .map_err(|e| BackupError::io("读取文件信息", entry.path(), e))?;
        size += meta.len();
    }

    Ok(size)
}

/// 检查备份卷是否有足够空间容纳整个主目录
pub fn ensure_enough_disk_space(
    volumes: &dyn VolumeProbe,
    source: &Path,
    backup: &Path,
) -> Result<(), BackupError> {
    let required = directory_size(source)?;

    let Some(available) = volumes.available_space(backup) else {
        warn!("无法确定备份位置所在卷，跳过磁盘空间检查: {:?}", backup);
        return Ok(());
    };

    debug!(
        "磁盘空间检查: {:?} 需要 {} 字节, 可用 {} 字节",
        backup, required, available
    );

    check_space(backup, required, available)
}

fn check_space(backup: &Path, required: u64, available: u64) -> Result<(), BackupError> {
    if available < required {
        return Err(NotEnoughDiskSpace {
            path: PathBuf::from(backup),
            required,
            available,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 固定结果的卷查询，用于测试
    pub(crate) struct FixedVolume {
        pub format: Option<&'static str>,
        pub available: Option<u64>,
    }

    impl VolumeProbe for FixedVolume {
        fn filesystem_format(&self, _path: &Path) -> Option<String> {
            self.format.map(str::to_string)
        }

        fn available_space(&self, _path: &Path) -> Option<u64> {
            self.available
        }
    }

    #[test]
    fn test_directory_size_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), vec![0u8; 100]).unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("sub/b.bin"), vec![0u8; 20]).unwrap();
        fs::write(dir.path().join("sub/deeper/c.bin"), vec![0u8; 3]).unwrap();

        assert_eq!(directory_size(dir.path()).unwrap(), 123);
    }

    #[test]
    fn test_fat_detection() {
        let path = Path::new("/mnt/usb");
        for format in ["vfat", "FAT32", "msdos"] {
            let volume = FixedVolume {
                format: Some(format),
                available: None,
            };
            assert!(is_fat32(&volume, path), "{format}");
            assert_eq!(time_tolerance_secs(&volume, path), 2);
        }

        let ext4 = FixedVolume {
            format: Some("ext4"),
            available: None,
        };
        assert!(!is_fat32(&ext4, path));
        assert_eq!(time_tolerance_secs(&ext4, path), 0);

        let unknown = FixedVolume {
            format: None,
            available: None,
        };
        assert_eq!(time_tolerance_secs(&unknown, path), 0);
    }

    #[test]
    fn test_disk_space_error_carries_byte_counts() {
        let source = tempfile::tempdir().unwrap();
        let backup = tempfile::tempdir().unwrap();
        fs::write(source.path().join("big.bin"), vec![1u8; 4096]).unwrap();

        let volume = FixedVolume {
            format: None,
            available: Some(1000),
        };
        let err = ensure_enough_disk_space(&volume, source.path(), backup.path()).unwrap_err();
        match err {
            BackupError::DiskSpace(e) => {
                assert_eq!(e.required, 4096);
                assert_eq!(e.available, 1000);
                assert_eq!(e.path, backup.path());
            }
            other => panic!("unexpected error: {other}"),
        }

        let roomy = FixedVolume {
            format: None,
            available: Some(4096),
        };
        assert!(ensure_enough_disk_space(&roomy, source.path(), backup.path()).is_ok());
    }

    #[test]
    fn test_unknown_volume_skips_space_check() {
        let source = tempfile::tempdir().unwrap();
        let backup = tempfile::tempdir().unwrap();
        fs::write(source.path().join("f.txt"), "data").unwrap();

        let volume = FixedVolume {
            format: None,
            available: None,
        };
        assert!(ensure_enough_disk_space(&volume, source.path(), backup.path()).is_ok());
    }
}
