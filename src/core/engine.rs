use crate::config::BackupDestination;
use crate::core::comparator::compare_counts;
use crate::core::fs_helper::{ensure_enough_disk_space, SystemVolumes, VolumeProbe};
use crate::core::hasher::{Blake3Hasher, ContentHasher};
use crate::core::mirror::{FolderMirror, SyncContext};
use crate::core::scanner::{scan_master_folder, ScannedFile};
use crate::db::{BackupEntry, LedgerChanges, LedgerStore};
use crate::error::{BackupError, FolderMismatch};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 删除数量超过此值时整理账本数据库
pub const COMPACT_THRESHOLD: usize = 1000;

/// 单个备份位置的执行报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupReport {
    pub master: PathBuf,
    pub backup: PathBuf,
    pub encrypt: bool,
    pub context: SyncContext,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
}

/// 多个备份位置依次执行时，每个位置的结果
#[derive(Debug)]
pub struct DestinationOutcome {
    pub path: PathBuf,
    pub result: Result<BackupReport, BackupError>,
}

/// 账本对账结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSyncSummary {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub compacted: bool,
}

/// 备份编排：空间检查 → 后台镜像 → 数量校验；以及账本对账
pub struct BackupEngine {
    ledger: Arc<dyn LedgerStore>,
    hasher: Arc<dyn ContentHasher>,
    volumes: Arc<dyn VolumeProbe>,
    cancelled: Arc<AtomicBool>,
}

impl BackupEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger,
            hasher: Arc::new(Blake3Hasher),
            volumes: Arc::new(SystemVolumes),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_volumes(mut self, volumes: Arc<dyn VolumeProbe>) -> Self {
        self.volumes = volumes;
        self
    }

    /// 共享外部的取消标志
    pub fn with_cancel(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// 请求取消；正在进行的镜像会在下一个目录层级停止，目标目录保持部分同步状态
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 把主目录镜像到一个备份位置
    ///
    /// 路径校验和磁盘空间检查在任何修改之前完成；镜像在后台线程执行，
    /// 完成后比较两边的文件数和目录数。
    pub async fn run_backup(
        &self,
        master: &Path,
        backup: &Path,
        encrypt: bool,
    ) -> Result<BackupReport, BackupError> {
        let start_time = Utc::now();

        ensure_directory("master", master)?;
        ensure_directory("backup", backup)?;

        info!("开始备份: {:?} -> {:?} (加密: {})", master, backup, encrypt);

        let master_path = master.to_path_buf();
        let backup_path = backup.to_path_buf();

        {
            let volumes = self.volumes.clone();
            let (m, b) = (master_path.clone(), backup_path.clone());
            tokio::task::spawn_blocking(move || ensure_enough_disk_space(volumes.as_ref(), &m, &b))
                .await??;
        }

        let mirror = FolderMirror::with_volumes(self.volumes.clone()).with_cancel(self.cancelled.clone());
        let context = {
            let (m, b) = (master_path.clone(), backup_path.clone());
            tokio::task::spawn_blocking(move || {
                let mut context = SyncContext::default();
                mirror.mirror(&m, &b, &mut context)?;
                Ok::<_, BackupError>(context)
            })
            .await??
        };

        debug!("镜像统计: {:?}", context);

        ensure_folder_counts_match(&master_path, &backup_path).await?;

        let end_time = Utc::now();
        info!(
            "备份完成: {:?} - 复制 {}, 更新 {}, 删除 {}, 新建目录 {}, 删除目录 {}",
            backup_path,
            context.files_copied,
            context.files_updated,
            context.files_deleted,
            context.directories_created,
            context.directories_deleted
        );

        Ok(BackupReport {
            master: master_path,
            backup: backup_path,
            encrypt,
            context,
            start_time,
            end_time,
            duration_ms: (end_time - start_time).num_milliseconds(),
        })
    }

    /// 依次备份到每个位置；一个位置失败不影响后续位置
    pub async fn run_all(
        &self,
        master: &Path,
        destinations: &[BackupDestination],
    ) -> Vec<DestinationOutcome> {
        let mut outcomes = Vec::with_capacity(destinations.len());

        for destination in destinations {
            let path = PathBuf::from(&destination.path);

            let result = if self.is_cancelled() {
                Err(BackupError::Cancelled { path: path.clone() })
            } else {
                self.run_backup(master, &path, destination.encrypt_files).await
            };

            if let Err(e) = &result {
                error!("备份失败: {:?}: {}", path, e);
            }

            outcomes.push(DestinationOutcome { path, result });
        }

        outcomes
    }

    /// 使账本与主目录的实际内容一致
    pub async fn align_ledger_with_filesystem(
        &self,
        master: &Path,
    ) -> Result<LedgerSyncSummary, BackupError> {
        ensure_directory("master", master)?;

        let scanned = scan_master_folder(master).await?;
        let existing = self.ledger.load_all().await?;
        debug!("账本现有 {} 条记录", existing.len());

        let hasher = self.hasher.clone();
        let changes =
            tokio::task::spawn_blocking(move || classify_changes(hasher.as_ref(), scanned, existing))
                .await??;

        let mut summary = LedgerSyncSummary {
            added: changes.added.len(),
            updated: changes.updated.len(),
            deleted: changes.deleted.len(),
            compacted: false,
        };

        if !changes.is_empty() {
            self.ledger.apply_changes(&changes).await?;
        }
        self.ledger.checkpoint().await?;

        if summary.deleted > COMPACT_THRESHOLD {
            info!("删除了 {} 条记录，整理账本数据库", summary.deleted);
            self.ledger.compact().await?;
            summary.compacted = true;
        }

        info!(
            "账本对账完成: 新增 {}, 更新 {}, 删除 {}",
            summary.added, summary.updated, summary.deleted
        );
        Ok(summary)
    }
}

fn ensure_directory(name: &'static str, path: &Path) -> Result<(), BackupError> {
    if path.as_os_str().is_empty() {
        return Err(BackupError::invalid_path(name, path, "路径为空"));
    }
    if !path.exists() {
        return Err(BackupError::invalid_path(name, path, "目录不存在"));
    }
    if !path.is_dir() {
        return Err(BackupError::invalid_path(name, path, "不是目录"));
    }
    Ok(())
}

async fn ensure_folder_counts_match(master: &Path, backup: &Path) -> Result<(), BackupError> {
    let result = compare_counts(master, backup).await?;

    if result.has_mismatch() {
        warn!("备份校验不一致: {:?} {:?}", backup, result);
        return Err(FolderMismatch {
            path: backup.to_path_buf(),
            file_mismatch_count: result.file_mismatch_count,
            directory_mismatch_count: result.directory_mismatch_count,
        }
        .into());
    }
    Ok(())
}

/// 对比扫描结果与账本：
/// - 账本有、磁盘没有 → 删除
/// - 磁盘有、账本没有 → 新增（计算哈希）
/// - 大小或修改时间不同 → 重新计算哈希，只有哈希变化才算更新
fn classify_changes(
    hasher: &dyn ContentHasher,
    scanned: Vec<ScannedFile>,
    existing: Vec<BackupEntry>,
) -> Result<LedgerChanges, BackupError> {
    let mut entries: HashMap<String, BackupEntry> = existing
        .into_iter()
        .map(|e| (e.original_file_path.clone(), e))
        .collect();

    let scanned_paths: HashSet<&str> = scanned.iter().map(|f| f.full_path.as_str()).collect();
    let mut changes = LedgerChanges::default();

    let missing: Vec<String> = entries
        .keys()
        .filter(|path| !scanned_paths.contains(path.as_str()))
        .cloned()
        .collect();
    for path in missing {
        if let Some(entry) = entries.remove(&path) {
            changes.deleted.push(entry);
        }
    }

    for file in &scanned {
        let hash = || {
            hasher
                .compute_hash(Path::new(&file.full_path))
                .map_err(|e| BackupError::io("计算哈希", &file.full_path, e))
        };

        match entries.get(&file.full_path) {
            None => {
                changes.added.push(BackupEntry::new(
                    file.file_name.clone(),
                    file.full_path.clone(),
                    hash()?,
                    file.file_size as i64,
                    file.last_modified,
                ));
            }
            Some(entry)
                if entry.file_size != file.file_size as i64
                    || entry.last_modified.timestamp_millis()
                        != file.last_modified.timestamp_millis() =>
            {
                let sha = hash()?;
                if sha != entry.content_hash {
                    let mut updated = entry.clone();
                    updated.content_hash = sha;
                    updated.file_size = file.file_size as i64;
                    updated.last_modified = file.last_modified;
                    changes.updated.push(updated);
                } else {
                    debug!("仅时间戳变化，内容未变: {}", file.full_path);
                }
            }
            Some(_) => {}
        }
    }

    Ok(changes)
}
