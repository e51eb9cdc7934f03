//! JD Parser: turns raw job-description text into a structured summary.
//!
//! Every field of [`JdSummary`] is always populated: lists default to empty and strings
//! fall back to the placeholders below, so templates never meet a missing key.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::generation::pipeline::{Stage, StageError};
use crate::generation::prompts::{JD_PARSE_PROMPT_TEMPLATE, JD_PARSE_SYSTEM};
use crate::llm_client::prompts::{json_system, JSON_ONLY_FOOTER};
use crate::llm_client::{call_structured, nullable, GenerativePort};
use crate::models::run_record::{Field, RunRecord, StageOutput};

pub const UNKNOWN: &str = "unknown";
pub const DEFAULT_HIRING_CONTACT: &str = "Hiring Manager";
pub const DEFAULT_ADDRESS: &str = "xxxxxxx x";
pub const DEFAULT_ZIP: &str = "1000";
pub const DEFAULT_CITY: &str = "Zurich";

/// Structured extraction of a job posting. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JdSummary {
    pub company: String,
    pub role: String,
    pub skills: Vec<String>,
    pub responsibilities: Vec<String>,
    pub must_haves: Vec<String>,
    pub nice_to_haves: Vec<String>,
    /// Salutation plus last name of the hiring contact, e.g. "Ms. Meier".
    #[serde(rename = "hr")]
    pub hiring_contact: String,
    pub address: String,
    pub zip: String,
    pub city: String,
}

/// What the model actually returns. Any key may be absent or null.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawJdSummary {
    company: Option<String>,
    role: Option<String>,
    #[serde(deserialize_with = "nullable")]
    skills: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    responsibilities: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    must_haves: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    nice_to_haves: Vec<String>,
    #[serde(alias = "hiring_contact")]
    hr: Option<String>,
    address: Option<String>,
    zip: Option<String>,
    city: Option<String>,
}

fn or_placeholder(value: Option<String>, placeholder: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| placeholder.to_string())
}

impl From<RawJdSummary> for JdSummary {
    fn from(raw: RawJdSummary) -> Self {
        Self {
            company: or_placeholder(raw.company, UNKNOWN),
            role: or_placeholder(raw.role, UNKNOWN),
            skills: raw.skills,
            responsibilities: raw.responsibilities,
            must_haves: raw.must_haves,
            nice_to_haves: raw.nice_to_haves,
            hiring_contact: or_placeholder(raw.hr, DEFAULT_HIRING_CONTACT),
            address: or_placeholder(raw.address, DEFAULT_ADDRESS),
            zip: or_placeholder(raw.zip, DEFAULT_ZIP),
            city: or_placeholder(raw.city, DEFAULT_CITY),
        }
    }
}

impl JdSummary {
    /// Compact JSON used inside downstream prompts.
    pub fn to_prompt_block(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Parses a job description through the generative port.
pub async fn parse_jd(
    port: &dyn GenerativePort,
    jd_text: &str,
    record: &RunRecord,
) -> Result<JdSummary, AppError> {
    if jd_text.trim().is_empty() {
        return Err(AppError::Validation(
            "job description text cannot be empty".to_string(),
        ));
    }
    let prompt = JD_PARSE_PROMPT_TEMPLATE
        .replace("{jd_text}", jd_text)
        .replace("{footer}", JSON_ONLY_FOOTER);
    let raw: RawJdSummary = call_structured(
        port,
        &json_system(JD_PARSE_SYSTEM),
        &prompt,
        record.config.model_for(ParseStage::NAME),
    )
    .await
    .map_err(|e| AppError::llm(ParseStage::NAME, e))?
    .into_result(ParseStage::NAME)?;
    Ok(raw.into())
}

pub struct ParseStage {
    port: Arc<dyn GenerativePort>,
}

impl ParseStage {
    pub const NAME: &'static str = "parse";

    pub fn new(port: Arc<dyn GenerativePort>) -> Self {
        Self { port }
    }
}

#[async_trait]
impl Stage for ParseStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn reads(&self) -> &'static [Field] {
        &[Field::JdRaw, Field::Config]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::JdSummary]
    }

    async fn run(&self, record: &RunRecord) -> Result<StageOutput, StageError> {
        info!("Parsing job description ({} chars)", record.jd_raw.len());
        let summary = parse_jd(self.port.as_ref(), &record.jd_raw, record).await?;
        info!(
            "Parsed JD: company={}, role={}, {} skills, {} must-haves",
            summary.company,
            summary.role,
            summary.skills.len(),
            summary.must_haves.len()
        );
        Ok(StageOutput::JdSummary(summary))
    }
}
