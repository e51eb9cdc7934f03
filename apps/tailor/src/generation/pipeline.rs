//! Pipeline: an ordered list of stages threaded through one run record.
//!
//! Wiring is checked once, at composition time: every derived field a stage reads must be
//! written by an earlier stage, and no two stages may write the same field (the artifact
//! registry excepted). At run time each stage output is folded in by `RunRecord::apply`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info};

use crate::errors::AppError;
use crate::export::cover_letter::CoverLetterExportStage;
use crate::export::resume::ResumeExportStage;
use crate::generation::assembler::AssembleStage;
use crate::generation::cover_letter::CoverLetterStage;
use crate::generation::critic::CriticStage;
use crate::generation::jd_parser::ParseStage;
use crate::generation::ranker::RankStage;
use crate::llm_client::GenerativePort;
use crate::models::run_record::{Field, RunRecord, StageOutput};

#[derive(Debug, Error)]
pub enum StageError {
    /// A field this stage needs was never produced. The run continues.
    #[error("missing precondition: '{0}' has not been produced")]
    MissingPrecondition(Field),

    #[error(transparent)]
    Fatal(#[from] AppError),
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fields that must be available before the stage runs.
    fn reads(&self) -> &'static [Field];

    /// Fields that are used when present but never required.
    fn optional_reads(&self) -> &'static [Field] {
        &[]
    }

    fn writes(&self) -> &'static [Field];

    async fn run(&self, record: &RunRecord) -> Result<StageOutput, StageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Resume,
    CoverLetter,
    Both,
}

impl RunMode {
    pub fn includes_resume(&self) -> bool {
        matches!(self, RunMode::Resume | RunMode::Both)
    }

    pub fn includes_cover_letter(&self) -> bool {
        matches!(self, RunMode::CoverLetter | RunMode::Both)
    }
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    port: Option<Arc<dyn GenerativePort>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Pipeline {
    /// Validates the stage wiring and builds the pipeline.
    pub fn compose(stages: Vec<Box<dyn Stage>>) -> Result<Self, AppError> {
        if stages.is_empty() {
            return Err(AppError::Composition("pipeline has no stages".to_string()));
        }

        let mut names = HashSet::new();
        let mut written: HashSet<Field> = HashSet::new();

        for stage in &stages {
            if !names.insert(stage.name()) {
                return Err(AppError::Composition(format!(
                    "stage '{}' appears twice",
                    stage.name()
                )));
            }
            for field in stage.reads() {
                if !field.is_input() && !written.contains(field) {
                    return Err(AppError::Composition(format!(
                        "stage '{}' reads '{field}' but no earlier stage writes it",
                        stage.name()
                    )));
                }
            }
            for field in stage.writes() {
                if field.is_input() {
                    return Err(AppError::Composition(format!(
                        "stage '{}' writes input field '{field}'",
                        stage.name()
                    )));
                }
                if written.contains(field) && !field.is_append_only() {
                    return Err(AppError::Composition(format!(
                        "stage '{}' writes '{field}' which an earlier stage already writes",
                        stage.name()
                    )));
                }
                written.insert(*field);
            }
        }

        for (i, stage) in stages.iter().enumerate() {
            for field in stage.optional_reads() {
                if let Some(later) = stages[i + 1..]
                    .iter()
                    .find(|s| s.writes().contains(field))
                {
                    return Err(AppError::Composition(format!(
                        "stage '{}' reads '{field}' which is only written later by '{}'",
                        stage.name(),
                        later.name()
                    )));
                }
            }
        }

        Ok(Self { stages, port: None })
    }

    /// Surfaces the port's retry counter in `meta.retry_count` after every stage.
    pub fn with_port(mut self, port: Arc<dyn GenerativePort>) -> Self {
        self.port = Some(port);
        self
    }

    /// parse → rank → assemble → [critic] → export_resume
    pub fn resume(port: Arc<dyn GenerativePort>, critic: bool) -> Result<Self, AppError> {
        Self::compose(resume_stages(&port, critic)).map(|p| p.with_port(port))
    }

    /// parse → write_cover_letter → export_cover_letter
    pub fn cover_letter(port: Arc<dyn GenerativePort>) -> Result<Self, AppError> {
        let mut stages: Vec<Box<dyn Stage>> = vec![Box::new(ParseStage::new(port.clone()))];
        stages.extend(cover_letter_tail(&port));
        Self::compose(stages).map(|p| p.with_port(port))
    }

    /// The résumé stages followed by the cover-letter stages, sharing one JD parse.
    pub fn both(port: Arc<dyn GenerativePort>, critic: bool) -> Result<Self, AppError> {
        let mut stages = resume_stages(&port, critic);
        stages.extend(cover_letter_tail(&port));
        Self::compose(stages).map(|p| p.with_port(port))
    }

    pub fn for_mode(
        mode: RunMode,
        port: Arc<dyn GenerativePort>,
        critic: bool,
    ) -> Result<Self, AppError> {
        match mode {
            RunMode::Resume => Self::resume(port, critic),
            RunMode::CoverLetter => Self::cover_letter(port),
            RunMode::Both => Self::both(port, critic),
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Runs every stage in order against the record.
    ///
    /// Missing preconditions are logged, recorded in `meta.errors`, and the run goes on.
    /// Fatal errors are recorded and returned, leaving the record as far as it got.
    pub async fn run(&self, record: &mut RunRecord) -> Result<(), AppError> {
        for stage in &self.stages {
            info!("Stage '{}' started", stage.name());
            let outcome = stage.run(record).await;
            self.sync_retries(record);

            match outcome {
                Ok(output) => {
                    let field = output.field();
                    if !stage.writes().contains(&field) {
                        let err = AppError::Composition(format!(
                            "stage '{}' produced undeclared field '{field}'",
                            stage.name()
                        ));
                        record.record_error(err.to_string());
                        return Err(err);
                    }
                    if let Err(err) = record.apply(output) {
                        record.record_error(format!("{}: [{}] {err}", stage.name(), err.code()));
                        return Err(err);
                    }
                    info!("Stage '{}' wrote '{field}'", stage.name());
                }
                Err(StageError::MissingPrecondition(field)) => {
                    let message = format!("{}: missing {field}", stage.name());
                    error!("Stage '{}' skipped, '{field}' is missing", stage.name());
                    record.record_error(message);
                }
                Err(StageError::Fatal(err)) => {
                    error!("Stage '{}' failed: {err}", stage.name());
                    record.record_error(format!("{}: [{}] {err}", stage.name(), err.code()));
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn sync_retries(&self, record: &mut RunRecord) {
        if let Some(port) = &self.port {
            record.meta.retry_count = port.retries_used();
        }
    }
}

fn resume_stages(port: &Arc<dyn GenerativePort>, critic: bool) -> Vec<Box<dyn Stage>> {
    let mut stages: Vec<Box<dyn Stage>> = vec![
        Box::new(ParseStage::new(port.clone())),
        Box::new(RankStage::new(port.clone())),
        Box::new(AssembleStage),
    ];
    if critic {
        stages.push(Box::new(CriticStage::new(port.clone())));
    }
    stages.push(Box::new(ResumeExportStage));
    stages
}

fn cover_letter_tail(port: &Arc<dyn GenerativePort>) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(CoverLetterStage::new(port.clone())),
        Box::new(CoverLetterExportStage),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::generation::critic::CriticResult;
    use crate::models::bank::BankItem;
    use crate::models::run_record::Artifact;
    use crate::testing::{record_with, sample_jd_summary, ScriptedPort};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    /// Test stage with fixed declarations and a canned outcome.
    struct FakeStage {
        name: &'static str,
        reads: &'static [Field],
        optional_reads: &'static [Field],
        writes: &'static [Field],
        outcome: fn() -> Result<StageOutput, StageError>,
    }

    #[async_trait]
    impl Stage for FakeStage {
        fn name(&self) -> &'static str {
            self.name
        }
        fn reads(&self) -> &'static [Field] {
            self.reads
        }
        fn optional_reads(&self) -> &'static [Field] {
            self.optional_reads
        }
        fn writes(&self) -> &'static [Field] {
            self.writes
        }
        async fn run(&self, _record: &RunRecord) -> Result<StageOutput, StageError> {
            (self.outcome)()
        }
    }

    fn fake(
        name: &'static str,
        reads: &'static [Field],
        writes: &'static [Field],
        outcome: fn() -> Result<StageOutput, StageError>,
    ) -> Box<dyn Stage> {
        Box::new(FakeStage {
            name,
            reads,
            optional_reads: &[],
            writes,
            outcome,
        })
    }

    fn parsed() -> Result<StageOutput, StageError> {
        Ok(StageOutput::JdSummary(sample_jd_summary()))
    }

    fn gate() -> Result<StageOutput, StageError> {
        Ok(StageOutput::CriticResult(CriticResult::failed()))
    }

    fn missing_jd() -> Result<StageOutput, StageError> {
        Err(StageError::MissingPrecondition(Field::JdSummary))
    }

    fn fatal() -> Result<StageOutput, StageError> {
        Err(StageError::Fatal(AppError::NotFound(
            "cover letter narratives".to_string(),
        )))
    }

    fn artifact_a() -> Result<StageOutput, StageError> {
        Ok(StageOutput::Artifacts(vec![Artifact {
            key: "a".to_string(),
            path: PathBuf::from("out/a"),
        }]))
    }

    fn artifact_b() -> Result<StageOutput, StageError> {
        Ok(StageOutput::Artifacts(vec![Artifact {
            key: "b".to_string(),
            path: PathBuf::from("out/b"),
        }]))
    }

    #[test]
    fn test_compose_rejects_read_before_write() {
        let err = Pipeline::compose(vec![
            fake("rank", &[Field::JdSummary], &[Field::Ranking], parsed),
            fake("parse", &[Field::JdRaw], &[Field::JdSummary], parsed),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::Composition(ref m) if m.contains("'rank' reads 'jd_summary'")));
    }

    #[test]
    fn test_compose_rejects_two_writers() {
        let err = Pipeline::compose(vec![
            fake("parse", &[Field::JdRaw], &[Field::JdSummary], parsed),
            fake("reparse", &[Field::JdRaw], &[Field::JdSummary], parsed),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::Composition(_)));
    }

    #[test]
    fn test_compose_rejects_input_writes_and_empty_lists() {
        let err = Pipeline::compose(vec![fake("bad", &[], &[Field::Bank], parsed)]).unwrap_err();
        assert!(err.to_string().contains("input field 'bank'"));
        assert!(Pipeline::compose(vec![]).is_err());
    }

    #[test]
    fn test_compose_allows_many_artifact_writers() {
        let pipeline = Pipeline::compose(vec![
            fake("export_a", &[], &[Field::Artifacts], artifact_a),
            fake("export_b", &[], &[Field::Artifacts], artifact_b),
        ])
        .unwrap();
        assert_eq!(pipeline.stage_names(), vec!["export_a", "export_b"]);
    }

    #[test]
    fn test_compose_rejects_optional_read_written_later() {
        let early_reader: Box<dyn Stage> = Box::new(FakeStage {
            name: "export",
            reads: &[],
            optional_reads: &[Field::CriticResult],
            writes: &[Field::Artifacts],
            outcome: artifact_a,
        });
        let err = Pipeline::compose(vec![
            early_reader,
            fake("critic", &[], &[Field::CriticResult], gate),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("only written later by 'critic'"));
    }

    #[test]
    fn test_builders_compose() {
        let port: Arc<dyn GenerativePort> = Arc::new(ScriptedPort::new(vec![]));
        let resume = Pipeline::resume(port.clone(), false).unwrap();
        assert_eq!(
            resume.stage_names(),
            vec!["parse", "rank", "assemble", "export_resume"]
        );
        let with_critic = Pipeline::resume(port.clone(), true).unwrap();
        assert_eq!(with_critic.stage_names()[3], "critic");

        let letter = Pipeline::cover_letter(port.clone()).unwrap();
        assert_eq!(
            letter.stage_names(),
            vec!["parse", "cover_letter", "export_cover_letter"]
        );

        let both = Pipeline::for_mode(RunMode::Both, port, true).unwrap();
        let names = both.stage_names();
        assert_eq!(names.iter().filter(|n| **n == "parse").count(), 1);
        assert_eq!(names.last(), Some(&"export_cover_letter"));
    }

    #[tokio::test]
    async fn test_soft_failure_is_recorded_and_run_continues() {
        let pipeline = Pipeline::compose(vec![
            fake("write", &[], &[Field::CoverLetter], missing_jd),
            fake("export", &[], &[Field::Artifacts], artifact_a),
        ])
        .unwrap();
        let mut record = record_with(vec![], RunConfig::default());
        pipeline.run(&mut record).await.unwrap();

        assert!(record.cover_letter_content.is_none());
        assert_eq!(record.meta.errors, vec!["write: missing jd_summary"]);
        assert!(record.artifacts.contains_key("a"));
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_remaining_stages() {
        let pipeline = Pipeline::compose(vec![
            fake("load", &[], &[Field::CoverLetter], fatal),
            fake("export", &[], &[Field::Artifacts], artifact_a),
        ])
        .unwrap();
        let mut record = record_with(vec![], RunConfig::default());
        let err = pipeline.run(&mut record).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(record.artifacts.is_empty());
        assert_eq!(record.meta.errors.len(), 1);
        assert!(record.meta.errors[0].contains("NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_undeclared_output_is_rejected() {
        let pipeline = Pipeline::compose(vec![fake("sneaky", &[], &[Field::Ranking], parsed)])
            .unwrap();
        let mut record = record_with(vec![], RunConfig::default());
        let err = pipeline.run(&mut record).await.unwrap_err();
        assert!(matches!(err, AppError::Composition(ref m) if m.contains("undeclared")));
        assert!(record.jd_summary.is_none());
    }

    #[tokio::test]
    async fn test_both_mode_runs_every_stage_end_to_end() {
        let dir = tempdir().unwrap();
        let work = dir.path().join("w1.yaml");
        fs::write(
            &work,
            "- id: exp_1\n  text: Acme builds payment rails\n  tags: [company]\n\
             - id: exp_2\n  text: Cut p99 latency by 40%\n",
        )
        .unwrap();
        let cv = dir.path().join("cv.tex.j2");
        fs::write(
            &cv,
            "{{ profile.name }}|{% for line in selected.work1 %}{{ line }};{% endfor %}\
             |{% for line in selected.Projects %}{{ line }};{% endfor %}\n",
        )
        .unwrap();
        let cl = dir.path().join("cl.tex.j2");
        fs::write(
            &cl,
            "{{ cl_context.greeting }} {{ cl_context.recipient }},\n\
             {{ cover_letter_content.attention }}\n{{ cover_letter_content.action }}\n",
        )
        .unwrap();

        let mut config = RunConfig::default();
        config.work_experience.insert("work1".to_string(), work);
        config.templating.cv_template_path = cv;
        config.templating.cover_letter_template_path = cl;
        let bank = vec![BankItem {
            id: "p1".to_string(),
            section: "Projects".to_string(),
            text: "Built X".to_string(),
            tags: vec![],
            priority: None,
        }];
        let mut record = record_with(bank, config);
        record.run_dir = dir.path().to_path_buf();
        record.profile.name = "Jane Doe".to_string();

        let port = Arc::new(ScriptedPort::new(vec![
            r#"{"company": "Acme", "role": "Engineer", "skills": ["Go"], "hr": "Ms. Meier"}"#,
            r#"{"selected": [{"id": "exp_2", "text": "Cut latency 40%"}], "missing_topics": []}"#,
            r#"{"selected": {"Projects": [{"id": "p1", "reason": "matches Go"}]}, "missing_topics": []}"#,
            r#"{"gate_passed": true, "missing_topics": []}"#,
            r#"{"paragraph_1": "I build payment systems.", "paragraph_2": "i",
                "paragraph_3": "d", "paragraph_4": "Let us talk."}"#,
        ]));
        let pipeline = Pipeline::for_mode(RunMode::Both, port.clone(), true).unwrap();
        pipeline.run(&mut record).await.unwrap();

        assert!(record.meta.errors.is_empty(), "{:?}", record.meta.errors);
        // parse, work, bank, critic, cover letter: the JD is parsed once for both documents
        assert_eq!(port.requests().len(), 5);
        let keys: Vec<_> = record.artifacts.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["cover_letter", "cover_letter_audit", "resume", "resume_audit"]
        );
        assert_eq!(
            record.critic_result,
            Some(CriticResult {
                gate_passed: true,
                missing_topics: vec![],
            })
        );

        let resume = fs::read_to_string(&record.artifacts["resume"]).unwrap();
        assert_eq!(
            resume,
            "Jane Doe|Acme builds payment rails;Cut latency 40%;|Built X;\n"
        );
        let letter = fs::read_to_string(&record.artifacts["cover_letter"]).unwrap();
        assert_eq!(letter, "Dear Ms. Meier,\nI build payment systems.\nLet us talk.\n");
        assert_eq!(
            record.cover_letter_content.as_ref().map(|c| c.action.as_str()),
            Some("Let us talk.")
        );
    }

    #[test]
    fn test_run_mode_flags() {
        assert!(RunMode::Both.includes_resume());
        assert!(RunMode::Both.includes_cover_letter());
        assert!(!RunMode::CoverLetter.includes_resume());
        assert!(!RunMode::Resume.includes_cover_letter());
    }
}
