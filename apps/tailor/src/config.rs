use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::generation::tailoring::TailoringMode;

/// Run configuration loaded from the YAML config file.
///
/// Carried verbatim inside the run record, so it must never hold secrets.
/// The API key is resolved separately through [`require_env`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelSettings,
    /// Per-stage model overrides keyed by stage name (`parse`, `rank`, `critic`, `cover_letter`).
    pub stages: BTreeMap<String, ModelSettings>,
    pub llm: LlmSettings,
    pub caps: Caps,
    pub paths: PathsConfig,
    /// Work entry name → detail document path.
    pub work_experience: BTreeMap<String, PathBuf>,
    /// Education entry name → detail document path.
    pub edu_experience: BTreeMap<String, PathBuf>,
    /// Shared skills document, grouped by category.
    pub skills: Option<PathBuf>,
    pub works: BTreeMap<String, EntryMeta>,
    pub educations: BTreeMap<String, EntryMeta>,
    pub templating: TemplatingConfig,
    pub tailoring_type: TailoringMode,
    pub critic: CriticConfig,
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: "gpt-4o-mini".to_string(),
            temperature: default_temperature(),
        }
    }
}

fn default_temperature() -> f32 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 120,
            max_retries: 3,
            retry_base_delay_ms: 1000,
        }
    }
}

/// Per-section item caps. Enforced by hard truncation regardless of what the model returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Caps {
    pub experience: usize,
    pub education: usize,
    pub projects: usize,
    pub achievements: usize,
    pub skills: usize,
}

impl Default for Caps {
    fn default() -> Self {
        Self {
            experience: 5,
            education: 3,
            projects: 3,
            achievements: 3,
            skills: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub jd: PathBuf,
    pub profile: PathBuf,
    pub bank_dir: PathBuf,
    pub cl_bank_dir: PathBuf,
    pub out_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            jd: PathBuf::from("data/jd.txt"),
            profile: PathBuf::from("bank/profile.yaml"),
            bank_dir: PathBuf::from("bank"),
            cl_bank_dir: PathBuf::from("cl_bank"),
            out_dir: PathBuf::from("out"),
        }
    }
}

/// Static display metadata for one work or education entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryMeta {
    pub name: String,
    pub time: String,
    pub title: String,
    pub city: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatingConfig {
    pub cv_template_path: PathBuf,
    pub cover_letter_template_path: PathBuf,
}

impl Default for TemplatingConfig {
    fn default() -> Self {
        Self {
            cv_template_path: PathBuf::from("templates/cv.tex.j2"),
            cover_letter_template_path: PathBuf::from("templates/cl.tex.j2"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticConfig {
    pub enabled: bool,
}

impl RunConfig {
    /// Loads the run configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_yaml(&raw)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let mut config: RunConfig = serde_yaml::from_str(raw)?;
        if config.log_level.trim().is_empty() {
            config.log_level = "info".to_string();
        }
        Ok(config)
    }

    /// Model settings for a stage: the stage override if present, the global model otherwise.
    pub fn model_for(&self, stage: &str) -> &ModelSettings {
        self.stages.get(stage).unwrap_or(&self.model)
    }
}

/// Loads `.env` and `.apikey` into the process environment if they exist.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
    dotenvy::from_filename(".apikey").ok();
}

pub fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
