//! 应用配置模块
//!
//! 所有配置保存在数据目录下的 `config.json` 中，每个模块占一个顶层字段，
//! 保存某个字段时保留其他字段。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

const CONFIG_FILE: &str = "config.json";

/// 读取 `config.json` 中的某个字段；文件或字段不存在、格式错误时返回 None
pub fn load_section<T: DeserializeOwned>(config_dir: &Path, key: &str) -> Option<T> {
    let content = fs::read_to_string(config_dir.join(CONFIG_FILE)).ok()?;
    let config: serde_json::Value = serde_json::from_str(&content).ok()?;
    serde_json::from_value(config.get(key)?.clone()).ok()
}

/// 写入 `config.json` 中的某个字段
pub fn save_section<T: Serialize>(config_dir: &Path, key: &str, value: &T) -> io::Result<()> {
    let config_file = config_dir.join(CONFIG_FILE);

    // 读取现有配置
    let mut config: serde_json::Value = if config_file.exists() {
        let content = fs::read_to_string(&config_file)?;
        serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
    } else {
        serde_json::json!({})
    };
    if !config.is_object() {
        config = serde_json::json!({});
    }

    config[key] = serde_json::to_value(value).map_err(io::Error::other)?;

    let content = serde_json::to_string_pretty(&config).map_err(io::Error::other)?;
    fs::write(&config_file, content)
}

/// 备份位置状态（由调用方维护）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    #[default]
    Unknown,
    Processing,
    Ok,
    Failed,
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupStatus::Unknown => write!(f, "unknown"),
            BackupStatus::Processing => write!(f, "processing"),
            BackupStatus::Ok => write!(f, "ok"),
            BackupStatus::Failed => write!(f, "failed"),
        }
    }
}

/// 备份位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDestination {
    pub path: String,
    #[serde(default)]
    pub encrypt_files: bool,
    #[serde(default)]
    pub status: BackupStatus,
}

impl BackupDestination {
    pub fn new(path: impl Into<String>, encrypt_files: bool) -> Self {
        Self {
            path: path.into(),
            encrypt_files,
            status: BackupStatus::Unknown,
        }
    }
}

/// 备份配置：主目录和所有备份位置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSettings {
    #[serde(default)]
    pub master_folder: Option<String>,
    #[serde(default)]
    pub backup_locations: Vec<BackupDestination>,
}

impl BackupSettings {
    /// 从配置文件加载备份配置
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "backup").unwrap_or_default()
    }

    /// 保存备份配置
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        save_section(config_dir, "backup", self)
    }

    pub fn find_location_mut(&mut self, path: &str) -> Option<&mut BackupDestination> {
        self.backup_locations.iter_mut().find(|l| l.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(BackupSettings::load(dir.path()), BackupSettings::default());
    }

    #[test]
    fn test_sections_are_preserved_on_save() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"data_path": "/somewhere", "log": {"level": "debug"}}"#,
        )
        .unwrap();

        let settings = BackupSettings {
            master_folder: Some("/data".to_string()),
            backup_locations: vec![BackupDestination::new("/mnt/usb", true)],
        };
        settings.save(dir.path()).unwrap();

        assert_eq!(BackupSettings::load(dir.path()), settings);
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap())
                .unwrap();
        assert_eq!(raw["data_path"], "/somewhere");
        assert_eq!(raw["log"]["level"], "debug");
        assert_eq!(raw["backup"]["backupLocations"][0]["encryptFiles"], true);
        assert_eq!(raw["backup"]["backupLocations"][0]["status"], "unknown");
    }

    #[test]
    fn test_malformed_section_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{"backup": 17}"#).unwrap();
        assert_eq!(BackupSettings::load(dir.path()), BackupSettings::default());
    }
}
