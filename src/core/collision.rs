//! 路径冲突检查：防止备份位置与主目录或彼此之间重叠导致递归复制

use crate::error::CollisionError;
use std::path::{Component, Path, PathBuf};

/// 转换为绝对路径并按字面折叠 `.` 与 `..`，末尾分隔符自然去除
pub fn normalize_path(path: &Path) -> Result<PathBuf, CollisionError> {
    if path.as_os_str().is_empty() {
        return Err(CollisionError::Unresolvable {
            path: path.to_path_buf(),
            reason: "路径为空".to_string(),
        });
    }

    let absolute = std::path::absolute(path).map_err(|e| CollisionError::Unresolvable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// 大小写不敏感的比较键
fn comparison_key(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

/// `inner` 是否位于 `outer` 内部（按路径段比较，`/data2` 不在 `/data` 内）
fn is_nested(inner: &Path, outer: &Path) -> bool {
    inner != outer && inner.starts_with(outer)
}

/// 检查主目录与备份位置的组合是否安全
pub fn validate<P: AsRef<Path>>(master: &Path, backups: &[P]) -> Result<(), CollisionError> {
    let master = normalize_path(master)?;
    let master_key = comparison_key(&master);

    let mut normalized = Vec::with_capacity(backups.len());
    for backup in backups {
        let path = normalize_path(backup.as_ref())?;
        let key = comparison_key(&path);
        normalized.push((path, key));
    }

    for (i, (path, key)) in normalized.iter().enumerate() {
        if normalized[..i].iter().any(|(_, other)| other == key) {
            return Err(CollisionError::DuplicateBackup { path: path.clone() });
        }
    }

    for (path, key) in &normalized {
        if *key == master_key {
            return Err(CollisionError::SameAsMaster { path: path.clone() });
        }
    }

    for (path, key) in &normalized {
        if is_nested(key, &master_key) {
            return Err(CollisionError::InsideMaster {
                path: path.clone(),
                master: master.clone(),
            });
        }
    }

    // 主目录位于备份位置内部时，镜像会把主目录当作多余目录删除
    for (path, key) in &normalized {
        if is_nested(&master_key, key) {
            return Err(CollisionError::MasterInsideBackup {
                path: path.clone(),
                master: master.clone(),
            });
        }
    }

    for (i, (a, a_key)) in normalized.iter().enumerate() {
        for (b, b_key) in normalized.iter().skip(i + 1) {
            if is_nested(a_key, b_key) {
                return Err(CollisionError::NestedBackups {
                    outer: b.clone(),
                    inner: a.clone(),
                });
            }
            if is_nested(b_key, a_key) {
                return Err(CollisionError::NestedBackups {
                    outer: a.clone(),
                    inner: b.clone(),
                });
            }
        }
    }

    Ok(())
}
