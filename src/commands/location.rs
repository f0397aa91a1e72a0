//! 主目录与备份位置管理命令

use super::require_dir;
use crate::config::{BackupDestination, BackupSettings};
use crate::core::collision;
use crate::AppState;
use std::path::Path;

fn save(settings: &BackupSettings, state: &AppState) -> Result<(), String> {
    settings
        .save(&state.config_dir)
        .map_err(|e| format!("保存配置失败: {}", e))
}

fn check_locations(master: &str, locations: &[BackupDestination]) -> Result<(), String> {
    let paths: Vec<&str> = locations.iter().map(|l| l.path.as_str()).collect();
    collision::validate(Path::new(master), &paths).map_err(|e| e.to_string())
}

/// 设置主目录（会用现有备份位置重新校验）
pub fn set_master(path: String, state: &AppState) -> Result<BackupSettings, String> {
    require_dir("主目录", Path::new(&path))?;

    let mut settings = BackupSettings::load(&state.config_dir);
    check_locations(&path, &settings.backup_locations)?;

    settings.master_folder = Some(path);
    save(&settings, state)?;
    Ok(settings)
}

/// 添加备份位置：先把新位置放进候选列表整体校验，通过后才保存
pub fn add_location(
    path: String,
    encrypt: bool,
    state: &AppState,
) -> Result<BackupSettings, String> {
    require_dir("备份位置", Path::new(&path))?;

    let mut settings = BackupSettings::load(&state.config_dir);
    let master = settings
        .master_folder
        .clone()
        .ok_or_else(|| "请先设置主目录".to_string())?;

    let mut candidate = settings.backup_locations.clone();
    candidate.push(BackupDestination::new(path, encrypt));
    check_locations(&master, &candidate)?;

    settings.backup_locations = candidate;
    save(&settings, state)?;
    Ok(settings)
}

/// 移除备份位置（不会删除备份位置中的文件）
pub fn remove_location(path: String, state: &AppState) -> Result<BackupSettings, String> {
    let mut settings = BackupSettings::load(&state.config_dir);

    let before = settings.backup_locations.len();
    settings.backup_locations.retain(|l| l.path != path);
    if settings.backup_locations.len() == before {
        return Err(format!("备份位置不存在: {}", path));
    }

    save(&settings, state)?;
    Ok(settings)
}

pub fn list_locations(state: &AppState) -> Result<BackupSettings, String> {
    Ok(BackupSettings::load(&state.config_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn path_string(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_location_lifecycle() {
        let data = tempfile::tempdir().unwrap();
        let master = tempfile::tempdir().unwrap();
        let backup = tempfile::tempdir().unwrap();
        let state = AppState::open(data.path().to_path_buf()).await.unwrap();

        assert!(add_location(path_string(backup.path()), false, &state).is_err());

        set_master(path_string(master.path()), &state).unwrap();
        let settings = add_location(path_string(backup.path()), true, &state).unwrap();
        assert_eq!(settings.backup_locations.len(), 1);
        assert!(settings.backup_locations[0].encrypt_files);

        // 重复添加被拒绝，配置保持不变
        assert!(add_location(path_string(backup.path()), false, &state).is_err());
        assert_eq!(list_locations(&state).unwrap().backup_locations.len(), 1);

        let settings = remove_location(path_string(backup.path()), &state).unwrap();
        assert!(settings.backup_locations.is_empty());
        assert!(remove_location(path_string(backup.path()), &state).is_err());
    }

    #[tokio::test]
    async fn test_location_inside_master_is_rejected() {
        let data = tempfile::tempdir().unwrap();
        let master = tempfile::tempdir().unwrap();
        let inner = master.path().join("inner");
        fs::create_dir(&inner).unwrap();
        let state = AppState::open(data.path().to_path_buf()).await.unwrap();

        set_master(path_string(master.path()), &state).unwrap();
        assert!(add_location(path_string(&inner), false, &state).is_err());
        assert!(list_locations(&state).unwrap().backup_locations.is_empty());
    }
}
