//! Cover-Letter Writer: four AIDA paragraphs from the JD summary, profile and narratives.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::generation::jd_parser::JdSummary;
use crate::generation::pipeline::{Stage, StageError};
use crate::generation::prompts::{COVER_LETTER_PROMPT_TEMPLATE, COVER_LETTER_SYSTEM};
use crate::llm_client::prompts::{json_system, JSON_ONLY_FOOTER};
use crate::llm_client::{call_structured, GenerativePort};
use crate::models::bank::{CoverLetterBank, CoverLetterItem};
use crate::models::profile::Profile;
use crate::models::run_record::{Field, RunRecord, StageOutput};

/// Attention / Interest / Desire / Action, in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCoverLetter")]
pub struct CoverLetterContent {
    pub attention: String,
    pub interest: String,
    pub desire: String,
    pub action: String,
}

impl CoverLetterContent {
    pub fn paragraphs(&self) -> [&str; 4] {
        [&self.attention, &self.interest, &self.desire, &self.action]
    }
}

/// Accepts both the model's `paragraph_N` keys and the named keys written to snapshots.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCoverLetter {
    #[serde(alias = "attention")]
    paragraph_1: Option<String>,
    #[serde(alias = "interest")]
    paragraph_2: Option<String>,
    #[serde(alias = "desire")]
    paragraph_3: Option<String>,
    #[serde(alias = "action")]
    paragraph_4: Option<String>,
}

impl From<RawCoverLetter> for CoverLetterContent {
    fn from(raw: RawCoverLetter) -> Self {
        Self {
            attention: raw.paragraph_1.unwrap_or_default(),
            interest: raw.paragraph_2.unwrap_or_default(),
            desire: raw.paragraph_3.unwrap_or_default(),
            action: raw.paragraph_4.unwrap_or_default(),
        }
    }
}

fn bullet_list(items: &[CoverLetterItem]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {}", item.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The applicant's summary, or a placeholder when the profile has none.
fn background(profile: &Profile) -> &str {
    let summary = profile.summary.trim();
    if summary.is_empty() {
        "(none)"
    } else {
        summary
    }
}

pub async fn write_cover_letter(
    port: &dyn GenerativePort,
    jd: &JdSummary,
    profile: &Profile,
    cl_bank: &CoverLetterBank,
    record: &RunRecord,
) -> Result<CoverLetterContent, AppError> {
    let prompt = COVER_LETTER_PROMPT_TEMPLATE
        .replace("{jd_summary}", &jd.to_prompt_block())
        .replace("{name}", &profile.name)
        .replace("{background}", background(profile))
        .replace("{narratives}", &bullet_list(&cl_bank.narratives))
        .replace("{concerns}", &bullet_list(&cl_bank.concerns))
        .replace("{footer}", JSON_ONLY_FOOTER);

    call_structured(
        port,
        &json_system(COVER_LETTER_SYSTEM),
        &prompt,
        record.config.model_for(CoverLetterStage::NAME),
    )
    .await
    .map_err(|e| AppError::llm(CoverLetterStage::NAME, e))?
    .into_result(CoverLetterStage::NAME)
}

pub struct CoverLetterStage {
    port: Arc<dyn GenerativePort>,
}

impl CoverLetterStage {
    pub const NAME: &'static str = "cover_letter";

    pub fn new(port: Arc<dyn GenerativePort>) -> Self {
        Self { port }
    }
}

#[async_trait]
impl Stage for CoverLetterStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn reads(&self) -> &'static [Field] {
        &[
            Field::JdSummary,
            Field::Profile,
            Field::CoverLetterBank,
            Field::Config,
        ]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::CoverLetter]
    }

    async fn run(&self, record: &RunRecord) -> Result<StageOutput, StageError> {
        let Some(jd) = record.jd_summary.as_ref() else {
            return Err(StageError::MissingPrecondition(Field::JdSummary));
        };
        info!(
            "Writing cover letter for '{}' at {} with {} narratives and {} concerns",
            jd.role,
            jd.company,
            record.cl_bank.narratives.len(),
            record.cl_bank.concerns.len()
        );
        let content = write_cover_letter(
            self.port.as_ref(),
            jd,
            &record.profile,
            &record.cl_bank,
            record,
        )
        .await?;
        let words: usize = content
            .paragraphs()
            .iter()
            .map(|p| p.split_whitespace().count())
            .sum();
        info!("Cover letter written: 4 paragraphs, {words} words");
        Ok(StageOutput::CoverLetter(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::testing::{record_with, sample_jd_summary, ScriptedPort};

    #[tokio::test]
    async fn test_four_paragraphs_in_aida_order() {
        let port = Arc::new(ScriptedPort::new(vec![
            r#"{"paragraph_1": "A", "paragraph_2": "I", "paragraph_3": "D", "paragraph_4": "Act"}"#,
        ]));
        let mut record = record_with(vec![], RunConfig::default());
        record.jd_summary = Some(sample_jd_summary());
        record.cl_bank.narratives.push(CoverLetterItem {
            id: "cl_1".to_string(),
            text: "I bridge research and product".to_string(),
            tags: vec![],
        });

        let output = CoverLetterStage::new(port.clone()).run(&record).await.unwrap();
        let StageOutput::CoverLetter(content) = output else {
            panic!("expected CoverLetter");
        };
        assert_eq!(content.paragraphs(), ["A", "I", "D", "Act"]);

        let user = &port.requests()[0].user;
        assert!(user.contains("- I bridge research and product"));
        assert!(user.contains("Do NOT write a salutation"));
    }

    #[tokio::test]
    async fn test_missing_paragraphs_default_to_empty() {
        let port = ScriptedPort::new(vec![r#"{"paragraph_1": "Only one"}"#]);
        let record = record_with(vec![], RunConfig::default());
        let jd = sample_jd_summary();
        let content = write_cover_letter(&port, &jd, &record.profile, &record.cl_bank, &record)
            .await
            .unwrap();
        assert_eq!(content.attention, "Only one");
        assert_eq!(content.paragraphs().len(), 4);
        assert!(content.action.is_empty());
    }

    #[tokio::test]
    async fn test_background_is_summary_or_placeholder() {
        let port = ScriptedPort::new(vec![
            r#"{"paragraph_1": "a"}"#,
            r#"{"paragraph_1": "b"}"#,
        ]);
        let mut record = record_with(vec![], RunConfig::default());
        record.profile.location = "Zurich, Switzerland".to_string();
        let jd = sample_jd_summary();

        write_cover_letter(&port, &jd, &record.profile, &record.cl_bank, &record)
            .await
            .unwrap();
        record.profile.summary = "Backend engineer with 6 years in payments".to_string();
        write_cover_letter(&port, &jd, &record.profile, &record.cl_bank, &record)
            .await
            .unwrap();

        let requests = port.requests();
        assert!(requests[0].user.contains("Background: (none)"));
        assert!(!requests[0].user.contains("Zurich, Switzerland"));
        assert!(requests[1]
            .user
            .contains("Background: Backend engineer with 6 years in payments"));
    }

    #[tokio::test]
    async fn test_missing_jd_is_a_soft_precondition_failure() {
        let port = Arc::new(ScriptedPort::new(vec![]));
        let record = record_with(vec![], RunConfig::default());
        let err = CoverLetterStage::new(port.clone()).run(&record).await.unwrap_err();
        assert!(matches!(err, StageError::MissingPrecondition(Field::JdSummary)));
        assert!(port.requests().is_empty());
    }

    #[test]
    fn test_content_round_trips_through_named_keys() {
        let content = CoverLetterContent {
            attention: "a".to_string(),
            interest: "i".to_string(),
            desire: "d".to_string(),
            action: "x".to_string(),
        };
        let json = serde_json::to_string(&content).unwrap();
        assert!(json.contains("\"attention\":\"a\""));
        let back: CoverLetterContent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, content);
    }
}
