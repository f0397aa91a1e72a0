//! 命令层：供命令行调用，统一返回面向用户的错误信息

pub mod backup;
pub mod ledger;
pub mod location;
pub mod log;

use crate::config::BackupSettings;
use std::path::PathBuf;

/// 取命令行指定的主目录，未指定时使用配置中的主目录
pub(crate) fn resolve_master(
    master: Option<String>,
    settings: &BackupSettings,
) -> Result<PathBuf, String> {
    master
        .or_else(|| settings.master_folder.clone())
        .map(PathBuf::from)
        .ok_or_else(|| "未设置主目录，请使用 --master 或 `master <PATH>` 设置".to_string())
}

/// 检查路径是否为已存在的目录
pub(crate) fn require_dir(name: &str, path: &std::path::Path) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("{}不存在: {}", name, path.display()));
    }
    if !path.is_dir() {
        return Err(format!("{}不是目录: {}", name, path.display()));
    }
    Ok(())
}
