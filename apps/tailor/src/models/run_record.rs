//! Run Record: the single aggregate threaded through every pipeline stage.
//!
//! Stages never mutate the record. They return a [`StageOutput`] and the orchestrator
//! folds it in through [`RunRecord::apply`], which enforces single-writer-per-field.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::errors::AppError;
use crate::generation::assembler::Assembled;
use crate::generation::cover_letter::CoverLetterContent;
use crate::generation::critic::CriticResult;
use crate::generation::jd_parser::JdSummary;
use crate::generation::ranker::Ranking;
use crate::models::bank::{BankItem, CoverLetterBank};
use crate::models::profile::Profile;

/// Bumped whenever the serialized shape of `RunRecord` changes.
pub const RUN_RECORD_VERSION: u32 = 1;

/// Addressable fields of the run record, used by stages to declare reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Field {
    JdRaw,
    Bank,
    Profile,
    CoverLetterBank,
    Config,
    RunDir,
    JdSummary,
    Ranking,
    Assembled,
    CriticResult,
    CoverLetter,
    Artifacts,
}

impl Field {
    /// Inputs are populated when the record is created and never written by a stage.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Field::JdRaw
                | Field::Bank
                | Field::Profile
                | Field::CoverLetterBank
                | Field::Config
                | Field::RunDir
        )
    }

    /// Append-only fields accept writes from several stages, one key at a time.
    pub fn is_append_only(&self) -> bool {
        matches!(self, Field::Artifacts)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::JdRaw => "jd_raw",
            Field::Bank => "bank",
            Field::Profile => "profile",
            Field::CoverLetterBank => "cl_bank",
            Field::Config => "config",
            Field::RunDir => "run_dir",
            Field::JdSummary => "jd_summary",
            Field::Ranking => "ranking",
            Field::Assembled => "assembled",
            Field::CriticResult => "critic_result",
            Field::CoverLetter => "cover_letter_content",
            Field::Artifacts => "artifacts",
        };
        f.write_str(name)
    }
}

/// A file produced by an exporter, registered under a unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub key: String,
    pub path: PathBuf,
}

/// What a stage hands back to the orchestrator.
#[derive(Debug, Clone)]
pub enum StageOutput {
    JdSummary(JdSummary),
    Ranking(Ranking),
    Assembled(Assembled),
    CriticResult(CriticResult),
    CoverLetter(CoverLetterContent),
    Artifacts(Vec<Artifact>),
}

impl StageOutput {
    pub fn field(&self) -> Field {
        match self {
            StageOutput::JdSummary(_) => Field::JdSummary,
            StageOutput::Ranking(_) => Field::Ranking,
            StageOutput::Assembled(_) => Field::Assembled,
            StageOutput::CriticResult(_) => Field::CriticResult,
            StageOutput::CoverLetter(_) => Field::CoverLetter,
            StageOutput::Artifacts(_) => Field::Artifacts,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMeta {
    pub retry_count: u32,
    pub errors: Vec<String>,
}

/// Everything known before the first stage runs.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub jd_raw: String,
    pub bank: Vec<BankItem>,
    pub profile: Profile,
    pub cl_bank: CoverLetterBank,
    pub config: RunConfig,
    pub run_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub version: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Local>,

    // Inputs
    pub jd_raw: String,
    pub bank: Vec<BankItem>,
    pub profile: Profile,
    pub cl_bank: CoverLetterBank,
    pub config: RunConfig,
    pub run_dir: PathBuf,

    // Derived, each written by exactly one stage
    pub jd_summary: Option<JdSummary>,
    pub ranking: Option<Ranking>,
    pub assembled: Option<Assembled>,
    pub critic_result: Option<CriticResult>,
    pub cover_letter_content: Option<CoverLetterContent>,
    pub artifacts: BTreeMap<String, PathBuf>,

    pub meta: RunMeta,
}

impl RunRecord {
    pub fn new(inputs: RunInputs) -> Self {
        Self::with_identity(inputs, Uuid::new_v4(), Local::now())
    }

    /// Creates a record for an id and start time chosen by the caller, e.g. after the
    /// run directory was named from them.
    pub fn with_identity(inputs: RunInputs, run_id: Uuid, started_at: DateTime<Local>) -> Self {
        Self {
            version: RUN_RECORD_VERSION,
            run_id,
            started_at,
            jd_raw: inputs.jd_raw,
            bank: inputs.bank,
            profile: inputs.profile,
            cl_bank: inputs.cl_bank,
            config: inputs.config,
            run_dir: inputs.run_dir,
            jd_summary: None,
            ranking: None,
            assembled: None,
            critic_result: None,
            cover_letter_content: None,
            artifacts: BTreeMap::new(),
            meta: RunMeta::default(),
        }
    }

    /// Merges one stage output. Fails if the target field was already written or an
    /// artifact key is already registered.
    pub fn apply(&mut self, output: StageOutput) -> Result<(), AppError> {
        match output {
            StageOutput::JdSummary(v) => set_once(&mut self.jd_summary, v, Field::JdSummary),
            StageOutput::Ranking(v) => set_once(&mut self.ranking, v, Field::Ranking),
            StageOutput::Assembled(v) => set_once(&mut self.assembled, v, Field::Assembled),
            StageOutput::CriticResult(v) => {
                set_once(&mut self.critic_result, v, Field::CriticResult)
            }
            StageOutput::CoverLetter(v) => {
                set_once(&mut self.cover_letter_content, v, Field::CoverLetter)
            }
            StageOutput::Artifacts(list) => {
                for artifact in list {
                    if self.artifacts.contains_key(&artifact.key) {
                        return Err(AppError::Composition(format!(
                            "artifact '{}' registered twice",
                            artifact.key
                        )));
                    }
                    self.artifacts.insert(artifact.key, artifact.path);
                }
                Ok(())
            }
        }
    }

    /// Records a soft failure in the meta bag.
    pub fn record_error(&mut self, message: String) {
        self.meta.errors.push(message);
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: Field) -> Result<(), AppError> {
    if slot.is_some() {
        return Err(AppError::Composition(format!(
            "field '{field}' was already written by an earlier stage"
        )));
    }
    *slot = Some(value);
    Ok(())
}
