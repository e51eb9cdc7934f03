// Exporters: render the run record into LaTeX documents and write audit files.
// Every run writes into its own timestamped directory under `paths.out_dir`.

pub mod cover_letter;
pub mod resume;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::run_record::RunRecord;

pub const RUN_DIR_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const SNAPSHOT_FILE: &str = "run_record.yaml";

/// Creates `<out_dir>/<YYYYMMDD_HHMMSS>` for this run.
///
/// An existing directory is never reused: on collision the first eight characters of the
/// run id are appended.
pub fn prepare_run_dir(
    out_dir: &Path,
    started_at: DateTime<Local>,
    run_id: Uuid,
) -> Result<PathBuf, AppError> {
    std::fs::create_dir_all(out_dir)?;
    let stamp = started_at.format(RUN_DIR_FORMAT).to_string();

    let primary = out_dir.join(&stamp);
    match std::fs::create_dir(&primary) {
        Ok(()) => return Ok(primary),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            warn!("Run directory {} already exists", primary.display());
        }
        Err(e) => return Err(e.into()),
    }

    let short_id: String = run_id.simple().to_string().chars().take(8).collect();
    let fallback = out_dir.join(format!("{stamp}_{short_id}"));
    std::fs::create_dir(&fallback)?;
    Ok(fallback)
}

pub(crate) fn write_text(path: &Path, contents: &str) -> Result<(), AppError> {
    std::fs::write(path, contents)?;
    info!("Wrote {}", path.display());
    Ok(())
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value)?;
    write_text(path, &json)
}

/// Serializes the full run record next to the run's artifacts.
pub fn write_snapshot(record: &RunRecord) -> Result<PathBuf, AppError> {
    let path = record.run_dir.join(SNAPSHOT_FILE);
    let yaml = serde_yaml::to_string(record)?;
    write_text(&path, &yaml)?;
    Ok(path)
}
