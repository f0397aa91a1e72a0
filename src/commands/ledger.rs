//! 账本对账命令

use super::{require_dir, resolve_master};
use crate::config::BackupSettings;
use crate::core::LedgerSyncSummary;
use crate::AppState;

/// 使账本与主目录当前内容一致
pub async fn align_ledger(
    master: Option<String>,
    state: &AppState,
) -> Result<LedgerSyncSummary, String> {
    let settings = BackupSettings::load(&state.config_dir);
    let master = resolve_master(master, &settings)?;
    require_dir("主目录", &master)?;

    state
        .engine()
        .align_ledger_with_filesystem(&master)
        .await
        .map_err(|e| format!("账本对账失败: {}", e))
}
