//! Fact Store: read-only YAML access to the applicant's bank.
//!
//! Optional documents come back as `Option`/empty collections. Required documents fail
//! with `AppError::NotFound` naming the document's role, not its path.

use std::collections::HashSet;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::bank::{BankItem, CoverLetterBank, CoverLetterItem, DetailItem, SkillItem};
use crate::models::profile::Profile;

const CL_NARRATIVES_FILE: &str = "content.yaml";
const CL_CONCERNS_FILE: &str = "stumbling_block.yaml";

/// Reads the raw job description. Blank text is rejected.
pub fn load_jd(path: &Path) -> Result<String, AppError> {
    let text = read_required(path, "job description")?;
    if text.trim().is_empty() {
        return Err(AppError::Validation(
            "job description text cannot be empty".to_string(),
        ));
    }
    Ok(text)
}

pub fn load_profile(path: &Path) -> Result<Profile, AppError> {
    let raw = read_required(path, "profile")?;
    if raw.trim().is_empty() {
        return Ok(Profile::default());
    }
    Ok(serde_yaml::from_str(&raw)?)
}

/// Loads every bank item from the YAML files directly under `dir`.
///
/// Files are read in name order. Only top-level sequences contribute items; elements
/// that are not bank items (e.g. skills lines) are skipped. Duplicate ids keep the
/// first occurrence.
pub fn load_bank(dir: &Path) -> Result<Vec<BankItem>, AppError> {
    if !dir.is_dir() {
        info!("Bank directory {} not found, using empty bank", dir.display());
        return Ok(Vec::new());
    }

    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    files.sort();

    let mut items = Vec::new();
    let mut seen = HashSet::new();

    for file in files {
        let raw = std::fs::read_to_string(&file)?;
        let value: serde_yaml::Value = match serde_yaml::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping unparseable bank file {}: {e}", file.display());
                continue;
            }
        };
        let serde_yaml::Value::Sequence(elements) = value else {
            debug!("Skipping non-list bank file {}", file.display());
            continue;
        };

        let mut skipped = 0usize;
        for element in elements {
            let mut item: BankItem = match serde_yaml::from_value(element) {
                Ok(item) => item,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            if let Some(priority) = item.priority {
                if !(0.0..=1.0).contains(&priority) {
                    warn!(
                        "Bank item '{}' has priority {priority} outside [0, 1], clamping",
                        item.id
                    );
                    item.priority = Some(priority.clamp(0.0, 1.0));
                }
            }
            if !seen.insert(item.id.clone()) {
                warn!("Duplicate bank item id '{}', keeping first occurrence", item.id);
                continue;
            }
            items.push(item);
        }
        if skipped > 0 {
            debug!("Skipped {skipped} non-bank entries in {}", file.display());
        }
    }

    Ok(items)
}

/// Loads a work/education detail document. `None` if the file does not exist.
pub fn load_details(path: &Path) -> Result<Option<Vec<DetailItem>>, AppError> {
    load_optional_list(path)
}

/// Loads the shared skills document.
pub fn load_skills(path: &Path) -> Result<Vec<SkillItem>, AppError> {
    load_optional_list(path)?.ok_or_else(|| AppError::NotFound("skills document".to_string()))
}

/// Loads cover-letter narratives and stumbling blocks. Both documents are mandatory.
pub fn load_cover_letter_bank(dir: &Path) -> Result<CoverLetterBank, AppError> {
    let narratives: Vec<CoverLetterItem> = load_optional_list(&dir.join(CL_NARRATIVES_FILE))?
        .ok_or_else(|| AppError::NotFound("cover letter narratives".to_string()))?;
    let concerns: Vec<CoverLetterItem> = load_optional_list(&dir.join(CL_CONCERNS_FILE))?
        .ok_or_else(|| AppError::NotFound("cover letter stumbling blocks".to_string()))?;
    Ok(CoverLetterBank {
        narratives,
        concerns,
    })
}

fn load_optional_list<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(Some(Vec::new()));
    }
    let items: Option<Vec<T>> = serde_yaml::from_str(&raw)?;
    Ok(Some(items.unwrap_or_default()))
}

fn read_required(path: &Path, role: &str) -> Result<String, AppError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::NotFound(role.to_string()))
        }
        Err(e) => Err(AppError::Io(e)),
    }
}
