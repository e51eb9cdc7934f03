//! Résumé exporter: renders `resume.tex` and writes `audit_cv.json`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::EntryMeta;
use crate::export::{write_json, write_text, RUN_DIR_FORMAT};
use crate::generation::critic::CriticResult;
use crate::generation::jd_parser::JdSummary;
use crate::generation::pipeline::{Stage, StageError};
use crate::generation::ranker::Ranking;
use crate::models::profile::Profile;
use crate::models::run_record::{Artifact, Field, RunRecord, StageOutput};
use crate::render::render_template_file;

pub const RESUME_FILE: &str = "resume.tex";
pub const RESUME_AUDIT_FILE: &str = "audit_cv.json";

#[derive(Debug, Serialize)]
struct ResumeContext<'a> {
    profile: &'a Profile,
    jd_summary: &'a JdSummary,
    selected: &'a BTreeMap<String, Vec<String>>,
    works: &'a BTreeMap<String, EntryMeta>,
    educations: &'a BTreeMap<String, EntryMeta>,
}

/// What the model decided for this résumé, and from which input.
#[derive(Debug, Serialize)]
struct ResumeAudit<'a> {
    timestamp: String,
    run_id: Uuid,
    jd_raw: &'a str,
    jd_summary: &'a JdSummary,
    ranked: &'a Ranking,
    critic_result: Option<&'a CriticResult>,
}

pub fn export_resume(record: &RunRecord) -> Result<Vec<Artifact>, StageError> {
    let jd_summary = record
        .jd_summary
        .as_ref()
        .ok_or(StageError::MissingPrecondition(Field::JdSummary))?;
    let assembled = record
        .assembled
        .as_ref()
        .ok_or(StageError::MissingPrecondition(Field::Assembled))?;
    let ranking = record
        .ranking
        .as_ref()
        .ok_or(StageError::MissingPrecondition(Field::Ranking))?;
    let config = &record.config;

    let context = ResumeContext {
        profile: &record.profile,
        jd_summary,
        selected: &assembled.sections,
        works: &config.works,
        educations: &config.educations,
    };
    let latex = render_template_file(
        &config.templating.cv_template_path,
        "resume template",
        &context,
    )?;

    let tex_path = record.run_dir.join(RESUME_FILE);
    write_text(&tex_path, &latex)?;

    let audit = ResumeAudit {
        timestamp: record.started_at.format(RUN_DIR_FORMAT).to_string(),
        run_id: record.run_id,
        jd_raw: &record.jd_raw,
        jd_summary,
        ranked: ranking,
        critic_result: record.critic_result.as_ref(),
    };
    let audit_path = record.run_dir.join(RESUME_AUDIT_FILE);
    write_json(&audit_path, &audit)?;

    Ok(vec![
        Artifact {
            key: "resume".to_string(),
            path: tex_path,
        },
        Artifact {
            key: "resume_audit".to_string(),
            path: audit_path,
        },
    ])
}

pub struct ResumeExportStage;

#[async_trait]
impl Stage for ResumeExportStage {
    fn name(&self) -> &'static str {
        "export_resume"
    }

    fn reads(&self) -> &'static [Field] {
        &[
            Field::JdRaw,
            Field::JdSummary,
            Field::Ranking,
            Field::Assembled,
            Field::Profile,
            Field::Config,
            Field::RunDir,
        ]
    }

    fn optional_reads(&self) -> &'static [Field] {
        &[Field::CriticResult]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Artifacts]
    }

    async fn run(&self, record: &RunRecord) -> Result<StageOutput, StageError> {
        info!("Exporting resume to {}", record.run_dir.display());
        let artifacts = export_resume(record)?;
        Ok(StageOutput::Artifacts(artifacts))
    }
}
