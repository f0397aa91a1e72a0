pub mod collision;
pub mod comparator;
pub mod engine;
pub mod fs_helper;
pub mod hasher;
pub mod mirror;
pub mod scanner;

pub use collision::{normalize_path, validate};
pub use comparator::{compare_counts, FolderComparisonResult};
pub use engine::{BackupEngine, BackupReport, DestinationOutcome, LedgerSyncSummary, COMPACT_THRESHOLD};
pub use fs_helper::{directory_size, ensure_enough_disk_space, SystemVolumes, VolumeProbe};
pub use hasher::{Blake3Hasher, ContentHasher};
pub use mirror::{FolderMirror, SyncContext};
pub use scanner::{scan_master_folder, ScannedFile};
