//! Cover-letter exporter: renders `cover_letter.tex` and writes `audit_cl.json`.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::export::{write_json, write_text, RUN_DIR_FORMAT};
use crate::generation::cover_letter::CoverLetterContent;
use crate::generation::jd_parser::JdSummary;
use crate::generation::pipeline::{Stage, StageError};
use crate::models::bank::CoverLetterBank;
use crate::models::profile::Profile;
use crate::models::run_record::{Artifact, Field, RunRecord, StageOutput};
use crate::render::render_template_file;

pub const COVER_LETTER_FILE: &str = "cover_letter.tex";
pub const COVER_LETTER_AUDIT_FILE: &str = "audit_cl.json";

/// Salutation and closing. Template-level, never generated.
#[derive(Debug, Serialize)]
struct ClContext<'a> {
    recipient: &'a str,
    greeting: &'static str,
    closer: &'static str,
}

#[derive(Debug, Serialize)]
struct CoverLetterRenderContext<'a> {
    profile: &'a Profile,
    jd_summary: &'a JdSummary,
    cover_letter_content: &'a CoverLetterContent,
    cl_context: ClContext<'a>,
}

#[derive(Debug, Serialize)]
struct CoverLetterAudit<'a> {
    timestamp: String,
    run_id: Uuid,
    jd_raw: &'a str,
    jd_summary: &'a JdSummary,
    cover_letter_content: &'a CoverLetterContent,
    cl_bank: &'a CoverLetterBank,
}

pub fn export_cover_letter(record: &RunRecord) -> Result<Vec<Artifact>, StageError> {
    let jd_summary = record
        .jd_summary
        .as_ref()
        .ok_or(StageError::MissingPrecondition(Field::JdSummary))?;
    let content = record
        .cover_letter_content
        .as_ref()
        .ok_or(StageError::MissingPrecondition(Field::CoverLetter))?;

    let context = CoverLetterRenderContext {
        profile: &record.profile,
        jd_summary,
        cover_letter_content: content,
        cl_context: ClContext {
            recipient: &jd_summary.hiring_contact,
            greeting: "Dear",
            closer: "Kind Regards",
        },
    };
    let latex = render_template_file(
        &record.config.templating.cover_letter_template_path,
        "cover letter template",
        &context,
    )?;
    let tex_path = record.run_dir.join(COVER_LETTER_FILE);
    write_text(&tex_path, &latex)?;

    let audit = CoverLetterAudit {
        timestamp: record.started_at.format(RUN_DIR_FORMAT).to_string(),
        run_id: record.run_id,
        jd_raw: &record.jd_raw,
        jd_summary,
        cover_letter_content: content,
        cl_bank: &record.cl_bank,
    };
    let audit_path = record.run_dir.join(COVER_LETTER_AUDIT_FILE);
    write_json(&audit_path, &audit)?;

    Ok(vec![
        Artifact {
            key: "cover_letter".to_string(),
            path: tex_path,
        },
        Artifact {
            key: "cover_letter_audit".to_string(),
            path: audit_path,
        },
    ])
}

pub struct CoverLetterExportStage;

#[async_trait]
impl Stage for CoverLetterExportStage {
    fn name(&self) -> &'static str {
        "export_cover_letter"
    }

    fn reads(&self) -> &'static [Field] {
        &[
            Field::JdRaw,
            Field::JdSummary,
            Field::CoverLetter,
            Field::Profile,
            Field::CoverLetterBank,
            Field::Config,
            Field::RunDir,
        ]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Artifacts]
    }

    async fn run(&self, record: &RunRecord) -> Result<StageOutput, StageError> {
        info!("Exporting cover letter to {}", record.run_dir.display());
        let artifacts = export_cover_letter(record)?;
        Ok(StageOutput::Artifacts(artifacts))
    }
}
