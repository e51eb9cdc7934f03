//! Test doubles and fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::{ModelSettings, RunConfig};
use crate::generation::jd_parser::JdSummary;
use crate::llm_client::{GenerativePort, LlmError, PromptRequest};
use crate::models::bank::{BankItem, CoverLetterBank};
use crate::models::profile::Profile;
use crate::models::run_record::{RunInputs, RunRecord};

pub const SAMPLE_JD: &str = "Engineer at Acme, Zurich. You will build payment services in Go \
    and SQL. Must have: 3+ years backend experience. Nice to have: Kafka.";

/// A request as the port received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub user: String,
    pub model: ModelSettings,
    pub structured: bool,
}

/// Generative port that answers from a fixed script, in order, and records every request.
/// Running out of answers yields `LlmError::EmptyContent`.
pub struct ScriptedPort {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedPort {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativePort for ScriptedPort {
    async fn complete(&self, request: &PromptRequest<'_>) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            system: request.system.to_string(),
            user: request.user.to_string(),
            model: request.model.clone(),
            structured: request.structured,
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyContent)
    }
}

pub fn record_with(bank: Vec<BankItem>, config: RunConfig) -> RunRecord {
    RunRecord::new(RunInputs {
        jd_raw: SAMPLE_JD.to_string(),
        bank,
        profile: Profile::default(),
        cl_bank: CoverLetterBank::default(),
        config,
        run_dir: PathBuf::from("out/test-run"),
    })
}

pub fn sample_jd_summary() -> JdSummary {
    JdSummary {
        company: "Acme".to_string(),
        role: "Engineer".to_string(),
        skills: vec!["Go".to_string(), "SQL".to_string()],
        responsibilities: vec!["Build payment services".to_string()],
        must_haves: vec!["3+ years backend experience".to_string()],
        nice_to_haves: vec!["Kafka".to_string()],
        hiring_contact: "Hiring Manager".to_string(),
        address: "xxxxxxx x".to_string(),
        zip: "1000".to_string(),
        city: "Zurich".to_string(),
    }
}
