//! 镜像引擎：递归比较主目录与备份目录，使备份目录与主目录结构完全一致
//!
//! 每个目录层级依次执行：删除目标中的符号链接 → 同步文件 → 删除多余文件
//! → 同步子目录（递归）→ 删除多余子目录。
//!
//! 目标侧从不跟随符号链接，所有修改都限制在目标目录之内。源侧指向文件的
//! 符号链接按文件内容复制，指向目录的符号链接被跳过。
//!
//! 文件比较只看大小和修改时间，不计算内容哈希。大小和时间都未变化但内容
//! 被修改的文件不会被检测到。
//!
//! 任何 I/O 错误都会立即中止整个递归，已完成的修改不会回滚。

use crate::core::fs_helper::{classify, time_tolerance_secs, EntryKind, SystemVolumes, VolumeProbe};
use crate::error::BackupError;
use filetime::FileTime;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace};

/// 一次镜像调用的统计结果，在整个递归过程中只增不减
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncContext {
    pub files_copied: u64,
    pub files_updated: u64,
    pub files_deleted: u64,
    pub directories_created: u64,
    pub directories_deleted: u64,
}

impl SyncContext {
    pub fn total_changes(&self) -> u64 {
        self.files_copied
            + self.files_updated
            + self.files_deleted
            + self.directories_created
            + self.directories_deleted
    }
}

/// 单个目录层级的直接子项
#[derive(Default)]
struct DirListing {
    files: HashMap<OsString, Metadata>,
    dirs: HashSet<OsString>,
    /// 符号链接和其他特殊项（仅目标侧记录）
    links: HashSet<OsString>,
}

impl DirListing {
    /// 读取源目录：指向文件的符号链接按文件处理
    fn read_source(dir: &Path) -> Result<Self, BackupError> {
        let mut listing = Self::default();

        let entries = fs::read_dir(dir).map_err(|e| BackupError::io("读取目录", dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| BackupError::io("读取目录", dir, e))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| BackupError::io("读取文件信息", &path, e))?;

            match classify(&path, file_type) {
                Some(EntryKind::File) => {
                    let meta =
                        fs::metadata(&path).map_err(|e| BackupError::io("读取文件信息", &path, e))?;
                    listing.files.insert(entry.file_name(), meta);
                }
                Some(EntryKind::Dir) => {
                    listing.dirs.insert(entry.file_name());
                }
                None => {}
            }
        }

        Ok(listing)
    }

    /// 读取目标目录：不跟随符号链接
    fn read_target(dir: &Path) -> Result<Self, BackupError> {
        let mut listing = Self::default();

        let entries = fs::read_dir(dir).map_err(|e| BackupError::io("读取目录", dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| BackupError::io("读取目录", dir, e))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .map_err(|e| BackupError::io("读取文件信息", &path, e))?;

            if file_type.is_dir() {
                listing.dirs.insert(entry.file_name());
            } else if file_type.is_file() {
                let meta = fs::symlink_metadata(&path)
                    .map_err(|e| BackupError::io("读取文件信息", &path, e))?;
                listing.files.insert(entry.file_name(), meta);
            } else {
                listing.links.insert(entry.file_name());
            }
        }

        Ok(listing)
    }
}

/// 目录镜像器
pub struct FolderMirror {
    volumes: Arc<dyn VolumeProbe>,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl FolderMirror {
    pub fn new() -> Self {
        Self::with_volumes(Arc::new(SystemVolumes))
    }

    pub fn with_volumes(volumes: Arc<dyn VolumeProbe>) -> Self {
        Self {
            volumes,
            cancel_flag: None,
        }
    }

    /// 设置取消标志，每进入一个目录层级前检查一次
    pub fn with_cancel(mut self, cancel_flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(cancel_flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn check_cancelled(&self, target: &Path) -> Result<(), BackupError> {
        if self.is_cancelled() {
            return Err(BackupError::Cancelled {
                path: target.to_path_buf(),
            });
        }
        Ok(())
    }

    /// 使 `target` 成为 `source` 的镜像，所有操作计入 `context`
    pub fn mirror(
        &self,
        source: &Path,
        target: &Path,
        context: &mut SyncContext,
    ) -> Result<(), BackupError> {
        self.check_cancelled(target)?;

        fs::create_dir_all(target).map_err(|e| BackupError::io("创建目录", target, e))?;

        // FAT32 的时间戳精度为 2 秒；整个目标树位于同一个卷上
        let tolerance = time_tolerance_secs(self.volumes.as_ref(), target);
        debug!("目标卷时间容差: {}s ({:?})", tolerance, target);

        self.mirror_level(source, target, tolerance, context)
    }

    fn mirror_level(
        &self,
        source: &Path,
        target: &Path,
        tolerance: u64,
        context: &mut SyncContext,
    ) -> Result<(), BackupError> {
        self.check_cancelled(target)?;

        debug!("开始镜像: {:?} -> {:?}", source, target);

        let source_listing = DirListing::read_source(source)?;
        let target_listing = DirListing::read_target(target)?;

        self.remove_links(target, &target_listing, context)?;

        self.sync_files(source, target, &source_listing, &target_listing, tolerance, context)?;
        self.remove_deleted_files(target, &source_listing, &target_listing, context)?;

        self.sync_directories(source, target, &source_listing, &target_listing, tolerance, context)?;
        self.remove_deleted_directories(target, &source_listing, &target_listing, context)?;

        debug!("镜像完成: {:?} -> {:?}", source, target);
        Ok(())
    }

    /// 目标中的符号链接一律删除（只删链接本身）；同名的源项随后按普通文件或目录重新创建
    fn remove_links(
        &self,
        target: &Path,
        target_listing: &DirListing,
        context: &mut SyncContext,
    ) -> Result<(), BackupError> {
        for name in &target_listing.links {
            let path = target.join(name);
            info!("删除目标中的符号链接: {:?}", path);
            remove_link(&path).map_err(|e| BackupError::io("删除符号链接", &path, e))?;
            context.files_deleted += 1;
        }
        Ok(())
    }

    fn sync_files(
        &self,
        source: &Path,
        target: &Path,
        source_listing: &DirListing,
        target_listing: &DirListing,
        tolerance: u64,
        context: &mut SyncContext,
    ) -> Result<(), BackupError> {
        for (name, source_meta) in &source_listing.files {
            let source_file = source.join(name);
            let target_file = target.join(name);

            if target_listing.dirs.contains(name) {
                info!("目标中同名目录被文件取代: {:?}", target_file);
                fs::remove_dir_all(&target_file)
                    .map_err(|e| BackupError::io("删除目录", &target_file, e))?;
                context.directories_deleted += 1;
            }

            match target_listing.files.get(name) {
                None => {
                    info!("复制新文件: {:?}", target_file);
                    copy_and_preserve_timestamp(&source_file, source_meta, &target_file)?;
                    context.files_copied += 1;
                }
                Some(target_meta) if should_copy(source_meta, target_meta, tolerance) => {
                    info!("更新文件: {:?}", target_file);
                    copy_and_preserve_timestamp(&source_file, source_meta, &target_file)?;
                    context.files_updated += 1;
                }
                Some(_) => {
                    debug!("文件已是最新: {:?}", target_file);
                }
            }
        }
        Ok(())
    }

    fn remove_deleted_files(
        &self,
        target: &Path,
        source_listing: &DirListing,
        target_listing: &DirListing,
        context: &mut SyncContext,
    ) -> Result<(), BackupError> {
        for name in target_listing.files.keys() {
            if source_listing.files.contains_key(name) {
                continue;
            }
            let path = target.join(name);
            info!("删除多余文件: {:?}", path);
            fs::remove_file(&path).map_err(|e| BackupError::io("删除文件", &path, e))?;
            context.files_deleted += 1;
        }
        Ok(())
    }

    fn sync_directories(
        &self,
        source: &Path,
        target: &Path,
        source_listing: &DirListing,
        target_listing: &DirListing,
        tolerance: u64,
        context: &mut SyncContext,
    ) -> Result<(), BackupError> {
        for name in &source_listing.dirs {
            let target_dir = target.join(name);

            if !target_listing.dirs.contains(name) {
                info!("创建目录: {:?}", target_dir);
                fs::create_dir(&target_dir)
                    .map_err(|e| BackupError::io("创建目录", &target_dir, e))?;
                context.directories_created += 1;
            }

            self.mirror_level(&source.join(name), &target_dir, tolerance, context)?;
        }
        Ok(())
    }

    fn remove_deleted_directories(
        &self,
        target: &Path,
        source_listing: &DirListing,
        target_listing: &DirListing,
        context: &mut SyncContext,
    ) -> Result<(), BackupError> {
        for name in &target_listing.dirs {
            // 被同名文件取代的目录已在同步文件时删除
            if source_listing.dirs.contains(name) || source_listing.files.contains_key(name) {
                continue;
            }
            let path = target.join(name);
            info!("删除多余目录: {:?}", path);
            fs::remove_dir_all(&path).map_err(|e| BackupError::io("删除目录", &path, e))?;
            context.directories_deleted += 1;
        }
        Ok(())
    }
}

impl Default for FolderMirror {
    fn default() -> Self {
        Self::new()
    }
}

/// 删除符号链接本身；Windows 上指向目录的链接需要 remove_dir
fn remove_link(path: &Path) -> io::Result<()> {
    fs::remove_file(path).or_else(|e| {
        if cfg!(windows) {
            fs::remove_dir(path)
        } else {
            Err(e)
        }
    })
}

/// 大小不同，或修改时间相差超过容差时需要覆盖
fn should_copy(source: &Metadata, target: &Metadata, tolerance_secs: u64) -> bool {
    if source.len() != target.len() {
        return true;
    }

    let (Ok(source_time), Ok(target_time)) = (source.modified(), target.modified()) else {
        return true;
    };

    let diff = time_difference(source_time, target_time);
    let changed = diff > Duration::from_secs(tolerance_secs);
    trace!("时间差 {:?}, 容差 {}s, 需要复制={}", diff, tolerance_secs, changed);
    changed
}

fn time_difference(a: SystemTime, b: SystemTime) -> Duration {
    a.duration_since(b)
        .or_else(|_| b.duration_since(a))
        .unwrap_or_default()
}

/// 复制文件（覆盖已存在的目标），并把目标的修改时间设为与源文件一致，
/// 保证下次运行时未修改的文件不会再次复制
fn copy_and_preserve_timestamp(
    source: &Path,
    source_meta: &Metadata,
    target: &Path,
) -> Result<(), BackupError> {
    trace!("复制: {:?} -> {:?}", source, target);
    fs::copy(source, target).map_err(|e| BackupError::io("复制文件", target, e))?;
    filetime::set_file_mtime(target, FileTime::from_last_modification_time(source_meta))
        .map_err(|e| BackupError::io("设置修改时间", target, e))?;
    Ok(())
}
