//! Critic: optional gate checking whether the assembled content covers the JD.
//!
//! The gate is advisory. A failed gate is logged and reported; it never reroutes the run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::errors::AppError;
use crate::generation::assembler::Assembled;
use crate::generation::jd_parser::JdSummary;
use crate::generation::pipeline::{Stage, StageError};
use crate::generation::prompts::{CRITIC_PROMPT_TEMPLATE, CRITIC_SYSTEM};
use crate::llm_client::prompts::{json_system, JSON_ONLY_FOOTER};
use crate::llm_client::{call_structured, nullable, GenerativePort};
use crate::models::run_record::{Field, RunRecord, StageOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticResult {
    #[serde(default)]
    pub gate_passed: bool,
    #[serde(default, deserialize_with = "nullable")]
    pub missing_topics: Vec<String>,
}

impl CriticResult {
    pub fn failed() -> Self {
        Self {
            gate_passed: false,
            missing_topics: Vec::new(),
        }
    }
}

/// Evaluates coverage. Absent inputs short-circuit to a failed gate without raising.
pub async fn critique(
    port: &dyn GenerativePort,
    jd: Option<&JdSummary>,
    assembled: Option<&Assembled>,
    record: &RunRecord,
) -> Result<CriticResult, AppError> {
    let (Some(jd), Some(assembled)) = (jd, assembled) else {
        error!("Critic is missing jd_summary or assembled content, failing the gate");
        return Ok(CriticResult::failed());
    };

    let prompt = CRITIC_PROMPT_TEMPLATE
        .replace("{jd_summary}", &jd.to_prompt_block())
        .replace(
            "{assembled}",
            &serde_json::to_string_pretty(&assembled.sections)?,
        )
        .replace("{footer}", JSON_ONLY_FOOTER);

    call_structured(
        port,
        &json_system(CRITIC_SYSTEM),
        &prompt,
        record.config.model_for(CriticStage::NAME),
    )
    .await
    .map_err(|e| AppError::llm(CriticStage::NAME, e))?
    .into_result(CriticStage::NAME)
}

pub struct CriticStage {
    port: Arc<dyn GenerativePort>,
}

impl CriticStage {
    pub const NAME: &'static str = "critic";

    pub fn new(port: Arc<dyn GenerativePort>) -> Self {
        Self { port }
    }
}

#[async_trait]
impl Stage for CriticStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn reads(&self) -> &'static [Field] {
        &[Field::JdSummary, Field::Assembled, Field::Config]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::CriticResult]
    }

    async fn run(&self, record: &RunRecord) -> Result<StageOutput, StageError> {
        let result = critique(
            self.port.as_ref(),
            record.jd_summary.as_ref(),
            record.assembled.as_ref(),
            record,
        )
        .await?;
        if result.gate_passed {
            info!("Critic gate passed");
        } else {
            warn!(
                "Critic gate failed, missing topics: [{}]",
                result.missing_topics.join(", ")
            );
        }
        Ok(StageOutput::CriticResult(result))
    }
}
