use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config;

/// Базовая директория для бэкапов
const BACKUP_DIR: &str = "data/backups";

/// Создает директорию для бэкапов если её нет
fn ensure_backup_dir() -> Result<PathBuf> {
    let backup_dir = PathBuf::from(BACKUP_DIR);
    if !backup_dir.exists() {
        fs::create_dir_all(&backup_dir)?;
        log::info!("Created backup directory: {}", backup_dir.display());
    }
    Ok(backup_dir)
}

/// Создает бэкап базы данных
///
/// Имя файла содержит timestamp; после успешного копирования бэкапы старше
/// окна хранения (30 дней) удаляются.
///
/// # Arguments
///
/// * `db_path` - Путь к файлу базы данных
///
/// # Returns
///
/// Возвращает путь к созданному бэкапу или ошибку
pub fn create_backup(db_path: &str) -> Result<PathBuf> {
    let backup_dir = ensure_backup_dir()?;

    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let db_name = Path::new(db_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("users.db");
    let backup_filename = format!("{}_{}", timestamp, db_name);
    let backup_path = backup_dir.join(backup_filename);

    fs::copy(db_path, &backup_path)?;
    log::info!("Created backup: {}", backup_path.display());

    cleanup_old_backups(&backup_dir, Utc::now())?;

    Ok(backup_path)
}

/// Парсит timestamp из имени бэкапа (`YYYYMMDD_HHMMSS_users.db`).
fn parse_backup_timestamp(file_name: &str) -> Option<DateTime<Utc>> {
    let ts_part = file_name.get(0..15)?;
    NaiveDateTime::parse_from_str(ts_part, "%Y%m%d_%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Удаляет бэкапы старше окна хранения.
fn cleanup_old_backups(backup_dir: &Path, now: DateTime<Utc>) -> Result<()> {
    let cutoff = now - Duration::days(config::backup::RETENTION_DAYS);

    if !backup_dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(backup_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(created) = parse_backup_timestamp(file_name) else {
            continue;
        };

        if created < cutoff {
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("Failed to remove old backup {}: {}", path.display(), e);
            } else {
                log::info!("Removed old backup: {}", path.display());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_timestamp_from_backup_name() {
        let dt = parse_backup_timestamp("20260115_031500_users.db").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-01-15 03:15:00");
    }

    #[test]
    fn ignores_foreign_files() {
        assert!(parse_backup_timestamp("notes.txt").is_none());
        assert!(parse_backup_timestamp("").is_none());
    }

    #[test]
    fn cleanup_removes_only_stale_backups() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let old = (now - Duration::days(40)).format("%Y%m%d_%H%M%S").to_string();
        let fresh = now.format("%Y%m%d_%H%M%S").to_string();

        let old_path = dir.path().join(format!("{}_users.db", old));
        let fresh_path = dir.path().join(format!("{}_users.db", fresh));
        fs::write(&old_path, b"old").unwrap();
        fs::write(&fresh_path, b"fresh").unwrap();

        cleanup_old_backups(dir.path(), now).unwrap();

        assert!(!old_path.exists());
        assert!(fresh_path.exists());
    }
}
