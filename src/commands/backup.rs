//! 备份相关命令

use super::{require_dir, resolve_master};
use crate::config::{BackupDestination, BackupSettings, BackupStatus};
use crate::core::{collision, compare_counts, BackupReport, FolderComparisonResult};
use crate::AppState;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// 单个备份位置的执行结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSummary {
    pub path: String,
    pub status: BackupStatus,
    pub report: Option<BackupReport>,
    pub error: Option<String>,
}

/// 单个备份位置的浅层校验结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSummary {
    pub path: String,
    pub result: Option<FolderComparisonResult>,
    pub error: Option<String>,
}

/// 命令行指定了备份位置时使用这些位置，否则使用配置中的位置
fn resolve_destinations(
    dests: Vec<String>,
    encrypt: bool,
    settings: &BackupSettings,
) -> (Vec<BackupDestination>, bool) {
    if dests.is_empty() {
        (settings.backup_locations.clone(), true)
    } else {
        let destinations = dests
            .into_iter()
            .map(|path| BackupDestination::new(path, encrypt))
            .collect();
        (destinations, false)
    }
}

fn save_statuses(
    settings: &mut BackupSettings,
    destinations: &[BackupDestination],
    state: &AppState,
) -> Result<(), String> {
    for destination in destinations {
        if let Some(location) = settings.find_location_mut(&destination.path) {
            location.status = destination.status;
        }
    }
    settings
        .save(&state.config_dir)
        .map_err(|e| format!("保存配置失败: {}", e))
}

/// 把主目录备份到所有备份位置
pub async fn start_backup(
    master: Option<String>,
    dests: Vec<String>,
    encrypt: bool,
    state: &AppState,
) -> Result<Vec<DestinationSummary>, String> {
    let mut settings = BackupSettings::load(&state.config_dir);
    let master = resolve_master(master, &settings)?;
    let (mut destinations, from_settings) = resolve_destinations(dests, encrypt, &settings);

    if destinations.is_empty() {
        return Err("没有可用的备份位置".to_string());
    }

    require_dir("主目录", &master)?;
    for destination in &destinations {
        require_dir("备份位置", Path::new(&destination.path))?;
    }

    let paths: Vec<PathBuf> = destinations.iter().map(|d| PathBuf::from(&d.path)).collect();
    collision::validate(&master, &paths).map_err(|e| e.to_string())?;

    for destination in destinations.iter_mut() {
        destination.status = BackupStatus::Processing;
    }
    if from_settings {
        save_statuses(&mut settings, &destinations, state)?;
    }

    let outcomes = state.engine().run_all(&master, &destinations).await;

    let mut summaries = Vec::with_capacity(outcomes.len());
    for (destination, outcome) in destinations.iter_mut().zip(outcomes) {
        let (status, report, error) = match outcome.result {
            Ok(report) => (BackupStatus::Ok, Some(report), None),
            Err(e) => (BackupStatus::Failed, None, Some(e.to_string())),
        };
        destination.status = status;
        summaries.push(DestinationSummary {
            path: destination.path.clone(),
            status,
            report,
            error,
        });
    }

    if from_settings {
        save_statuses(&mut settings, &destinations, state)?;
    }

    Ok(summaries)
}

/// 浅层校验：只比较文件数和目录数
pub async fn check_backups(
    master: Option<String>,
    dests: Vec<String>,
    state: &AppState,
) -> Result<Vec<CheckSummary>, String> {
    let settings = BackupSettings::load(&state.config_dir);
    let master = resolve_master(master, &settings)?;
    let (destinations, _) = resolve_destinations(dests, false, &settings);

    require_dir("主目录", &master)?;

    let mut summaries = Vec::with_capacity(destinations.len());
    for destination in destinations {
        let outcome = compare_counts(&master, Path::new(&destination.path)).await;
        let (result, error) = match outcome {
            Ok(result) => (Some(result), None),
            Err(e) => (None, Some(e.to_string())),
        };
        summaries.push(CheckSummary {
            path: destination.path,
            result,
            error,
        });
    }

    Ok(summaries)
}

/// 只做路径冲突检查
pub fn validate_paths(master: String, dests: Vec<String>) -> Result<(), String> {
    collision::validate(Path::new(&master), &dests).map_err(|e| e.to_string())
}
