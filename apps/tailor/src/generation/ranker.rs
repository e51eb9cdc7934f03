//! Ranker / Selector: chooses a bounded, JD-relevant subset of fact items per section.
//!
//! Four sub-selectors share one result shape:
//! - work experience: model ranks and rewrites one entry's bullets, company bullet first
//! - education: deterministic pass-through of the entry's bullets, no model call
//! - skills: model keeps every category and may add items inside them
//! - bank (Projects, Achievements): model selects ids with a reason
//!
//! Caps are requested in the prompt and then enforced here by truncation.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{Caps, ModelSettings, RunConfig};
use crate::errors::AppError;
use crate::generation::jd_parser::JdSummary;
use crate::generation::pipeline::{Stage, StageError};
use crate::generation::prompts::{
    BANK_SELECT_PROMPT_TEMPLATE, BANK_SELECT_SYSTEM, SKILLS_SELECT_PROMPT_TEMPLATE,
    SKILLS_SELECT_SYSTEM, WORK_SELECT_PROMPT_TEMPLATE, WORK_SELECT_SYSTEM,
};
use crate::generation::tailoring::{get_tailoring_hint, TailoringMode};
use crate::llm_client::prompts::{json_system, JSON_ONLY_FOOTER, NO_INVENTION_INSTRUCTION};
use crate::llm_client::{call_structured, nullable, GenerativePort};
use crate::models::bank::{BankItem, BankSection, DetailItem, SkillItem};
use crate::models::run_record::{Field, RunRecord, StageOutput};
use crate::store;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// How an item was selected: filtered with a justification, or filtered and rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selection {
    #[serde(rename = "reason")]
    WithReason(String),
    #[serde(rename = "text")]
    WithText(String),
}

/// A reference to a fact item chosen by a selector. The id always points back at the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedItem {
    pub id: String,
    #[serde(flatten)]
    pub selection: Selection,
}

impl SelectedItem {
    pub fn with_reason(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            selection: Selection::WithReason(reason.into()),
        }
    }

    pub fn with_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            selection: Selection::WithText(text.into()),
        }
    }
}

/// One selected item as the model returns it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSelectedItem {
    id: Option<String>,
    reason: Option<String>,
    text: Option<String>,
}

/// Ordered selections for one section plus the JD topics the selector found uncovered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub selected: Vec<SelectedItem>,
    pub missing_topics: Vec<String>,
}

impl SelectionResult {
    fn truncate(&mut self, cap: usize) {
        if self.selected.len() > cap {
            warn!(
                "Selector returned {} items, truncating to cap {cap}",
                self.selected.len()
            );
            self.selected.truncate(cap);
        }
    }
}

/// One line of the skills section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillLine {
    #[serde(alias = "categories")]
    pub category: String,
    pub text: String,
}

/// Output of the rank stage, keyed by work/education entry name or bank section name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub sections: BTreeMap<String, SelectionResult>,
    pub skills: Vec<SkillLine>,
    pub missing_topics: Vec<String>,
}

/// Per-call context shared by the model-backed selectors.
pub struct SelectorContext<'a> {
    pub port: &'a dyn GenerativePort,
    pub jd: &'a JdSummary,
    pub mode: TailoringMode,
    pub model: &'a ModelSettings,
}

#[derive(Debug, Deserialize)]
struct WorkResponse {
    #[serde(default, deserialize_with = "nullable")]
    selected: Vec<RawSelectedItem>,
    #[serde(default, deserialize_with = "nullable")]
    missing_topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SkillsResponse {
    #[serde(default, deserialize_with = "nullable")]
    selected: Vec<SkillLine>,
}

#[derive(Debug, Deserialize)]
struct BankResponse {
    #[serde(default, deserialize_with = "nullable")]
    selected: BTreeMap<String, Vec<RawSelectedItem>>,
    #[serde(default, deserialize_with = "nullable")]
    missing_topics: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Work experience
// ────────────────────────────────────────────────────────────────────────────

/// Ranks, rewrites and caps one work entry's bullets.
///
/// Ids the model invents are dropped. The company bullet is always first, inserted from
/// the source when the model left it out.
pub async fn select_work_experience(
    ctx: &SelectorContext<'_>,
    entry_name: &str,
    details: &[DetailItem],
    cap: usize,
) -> Result<SelectionResult, AppError> {
    if details.is_empty() || cap == 0 {
        return Ok(SelectionResult::default());
    }

    let bullets_json = serde_json::to_string_pretty(details)?;
    let prompt = WORK_SELECT_PROMPT_TEMPLATE
        .replace("{jd_summary}", &ctx.jd.to_prompt_block())
        .replace("{entry_name}", entry_name)
        .replace("{bullets_json}", &bullets_json)
        .replace("{grounding_instruction}", NO_INVENTION_INSTRUCTION)
        .replace("{tailoring}", &get_tailoring_hint(ctx.mode).to_prompt())
        .replace("{cap}", &cap.to_string())
        .replace("{footer}", JSON_ONLY_FOOTER);

    let response: WorkResponse = call_structured(
        ctx.port,
        &json_system(WORK_SELECT_SYSTEM),
        &prompt,
        ctx.model,
    )
    .await
    .map_err(|e| AppError::llm(RankStage::NAME, e))?
    .into_result(RankStage::NAME)?;

    let by_id: BTreeMap<&str, &DetailItem> =
        details.iter().map(|d| (d.id.as_str(), d)).collect();
    let mut seen = HashSet::new();
    let mut selected = Vec::new();

    for raw in response.selected {
        let Some(id) = raw.id else {
            warn!("Work entry '{entry_name}': dropping selected item without id");
            continue;
        };
        let Some(source) = by_id.get(id.as_str()) else {
            warn!("Work entry '{entry_name}': unknown bullet id '{id}', skipping");
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        let text = raw
            .text
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| source.text.clone());
        selected.push(SelectedItem::with_text(id, text));
    }

    if let Some(company) = details.iter().find(|d| d.describes_company()) {
        match selected.iter().position(|s| s.id == company.id) {
            Some(0) => {}
            Some(pos) => {
                let item = selected.remove(pos);
                selected.insert(0, item);
            }
            None => {
                selected.insert(0, SelectedItem::with_text(&company.id, &company.text));
            }
        }
    }

    let mut result = SelectionResult {
        selected,
        missing_topics: response.missing_topics,
    };
    result.truncate(cap);
    Ok(result)
}

// ────────────────────────────────────────────────────────────────────────────
// Education
// ────────────────────────────────────────────────────────────────────────────

/// Education is a pass-through: the entry's bullets, unmodified and in order.
/// An absent, blank or unreadable document yields an empty list.
pub fn select_education(path: &Path) -> Vec<DetailItem> {
    match store::load_details(path) {
        Ok(Some(items)) => items,
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!("Unreadable education document {}: {e}", path.display());
            Vec::new()
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Skills
// ────────────────────────────────────────────────────────────────────────────

/// Groups the skills document into one line per category, in first-seen order.
fn group_skills(skills: &[SkillItem]) -> Vec<SkillLine> {
    let mut lines: Vec<SkillLine> = Vec::new();
    for skill in skills {
        match lines
            .iter_mut()
            .find(|l| l.category.eq_ignore_ascii_case(&skill.category))
        {
            Some(line) => {
                line.text.push_str(", ");
                line.text.push_str(&skill.text);
            }
            None => lines.push(SkillLine {
                category: skill.category.clone(),
                text: skill.text.clone(),
            }),
        }
    }
    lines
}

/// Produces the skills section. Every source category survives: categories the model
/// dropped are re-appended with their original text.
pub async fn select_skills(
    ctx: &SelectorContext<'_>,
    skills: &[SkillItem],
) -> Result<Vec<SkillLine>, AppError> {
    if skills.is_empty() {
        return Ok(Vec::new());
    }

    let source = group_skills(skills);
    let prompt = SKILLS_SELECT_PROMPT_TEMPLATE
        .replace("{jd_summary}", &ctx.jd.to_prompt_block())
        .replace("{skills_json}", &serde_json::to_string_pretty(&source)?)
        .replace("{tailoring}", &get_tailoring_hint(ctx.mode).to_prompt())
        .replace("{footer}", JSON_ONLY_FOOTER);

    let response: SkillsResponse = call_structured(
        ctx.port,
        &json_system(SKILLS_SELECT_SYSTEM),
        &prompt,
        ctx.model,
    )
    .await
    .map_err(|e| AppError::llm(RankStage::NAME, e))?
    .into_result(RankStage::NAME)?;

    let mut lines: Vec<SkillLine> = response
        .selected
        .into_iter()
        .filter(|l| !l.category.trim().is_empty())
        .collect();
    for original in source {
        if !lines
            .iter()
            .any(|l| l.category.eq_ignore_ascii_case(&original.category))
        {
            warn!(
                "Skills selector dropped category '{}', restoring it",
                original.category
            );
            lines.push(original);
        }
    }
    Ok(lines)
}

// ────────────────────────────────────────────────────────────────────────────
// Bank sections (selection with reason)
// ────────────────────────────────────────────────────────────────────────────

/// Selects Projects and Achievements from the flat bank in one call.
///
/// Both sections are always present in the result. Unknown ids are kept here and
/// skipped by the assembler when they fail to resolve.
pub async fn select_bank_items(
    ctx: &SelectorContext<'_>,
    bank: &[BankItem],
    caps: &Caps,
) -> Result<(BTreeMap<String, SelectionResult>, Vec<String>), AppError> {
    let mut sections: BTreeMap<String, SelectionResult> = BankSection::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), SelectionResult::default()))
        .collect();

    let candidates: Vec<&BankItem> = bank
        .iter()
        .filter(|item| BankSection::ALL.iter().any(|s| item.is_in(*s)))
        .collect();
    if candidates.is_empty() {
        info!("No Projects or Achievements in the bank, skipping bank selection");
        return Ok((sections, Vec::new()));
    }

    let caps_text = BankSection::ALL
        .iter()
        .map(|s| format!("- {}: max {}", s.as_str(), s.cap(caps)))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = BANK_SELECT_PROMPT_TEMPLATE
        .replace("{jd_summary}", &ctx.jd.to_prompt_block())
        .replace("{items_json}", &serde_json::to_string_pretty(&candidates)?)
        .replace("{caps}", &caps_text)
        .replace("{grounding_instruction}", NO_INVENTION_INSTRUCTION)
        .replace("{tailoring}", &get_tailoring_hint(ctx.mode).to_prompt())
        .replace("{footer}", JSON_ONLY_FOOTER);

    let response: BankResponse = call_structured(
        ctx.port,
        &json_system(BANK_SELECT_SYSTEM),
        &prompt,
        ctx.model,
    )
    .await
    .map_err(|e| AppError::llm(RankStage::NAME, e))?
    .into_result(RankStage::NAME)?;

    for (key, raw_items) in response.selected {
        let Some(section) = BankSection::ALL
            .iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(key.trim()))
        else {
            warn!("Bank selector returned unknown section '{key}', ignoring");
            continue;
        };
        let result = sections
            .entry(section.as_str().to_string())
            .or_default();
        for raw in raw_items {
            let Some(id) = raw.id else {
                continue;
            };
            if result.selected.iter().any(|s| s.id == id) {
                warn!(
                    "Bank section '{}': id '{id}' selected twice, keeping the first",
                    section.as_str()
                );
                continue;
            }
            result
                .selected
                .push(SelectedItem::with_reason(id, raw.reason.unwrap_or_default()));
        }
        result.truncate(section.cap(caps));
    }

    Ok((sections, response.missing_topics))
}

// ────────────────────────────────────────────────────────────────────────────
// Stage
// ────────────────────────────────────────────────────────────────────────────

pub struct RankStage {
    port: Arc<dyn GenerativePort>,
}

impl RankStage {
    pub const NAME: &'static str = "rank";

    pub fn new(port: Arc<dyn GenerativePort>) -> Self {
        Self { port }
    }

    async fn rank(&self, jd: &JdSummary, record: &RunRecord) -> Result<Ranking, AppError> {
        let config: &RunConfig = &record.config;
        let ctx = SelectorContext {
            port: self.port.as_ref(),
            jd,
            mode: config.tailoring_type,
            model: config.model_for(Self::NAME),
        };
        let mut ranking = Ranking::default();

        for (entry, path) in &config.work_experience {
            let details = store::load_details(path)?.ok_or_else(|| {
                AppError::NotFound(format!("work experience details for '{entry}'"))
            })?;
            let result =
                select_work_experience(&ctx, entry, &details, config.caps.experience).await?;
            info!("Work entry '{entry}': selected {} bullets", result.selected.len());
            ranking.sections.insert(entry.clone(), result);
        }

        for (entry, path) in &config.edu_experience {
            let details = select_education(path);
            info!("Education entry '{entry}': {} bullets", details.len());
            let selected = details
                .into_iter()
                .map(|d| SelectedItem::with_text(d.id, d.text))
                .collect();
            ranking.sections.insert(
                entry.clone(),
                SelectionResult {
                    selected,
                    missing_topics: Vec::new(),
                },
            );
        }

        if let Some(path) = &config.skills {
            let skills = store::load_skills(path)?;
            ranking.skills = select_skills(&ctx, &skills).await?;
            info!("Skills: {} categories", ranking.skills.len());
        }

        let (bank_sections, bank_missing) =
            select_bank_items(&ctx, &record.bank, &config.caps).await?;
        for (name, result) in bank_sections {
            info!("Bank section '{name}': selected {} items", result.selected.len());
            ranking.sections.insert(name, result);
        }

        let mut seen = HashSet::new();
        ranking.missing_topics = ranking
            .sections
            .values()
            .flat_map(|r| r.missing_topics.iter())
            .chain(bank_missing.iter())
            .filter(|t| seen.insert(t.to_lowercase()))
            .cloned()
            .collect();

        Ok(ranking)
    }
}

#[async_trait]
impl Stage for RankStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn reads(&self) -> &'static [Field] {
        &[Field::JdSummary, Field::Bank, Field::Config]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Ranking]
    }

    async fn run(&self, record: &RunRecord) -> Result<StageOutput, StageError> {
        let Some(jd) = record.jd_summary.as_ref() else {
            return Err(StageError::MissingPrecondition(Field::JdSummary));
        };
        info!("Ranking bank content against '{}' at {}", jd.role, jd.company);
        let ranking = self.rank(jd, record).await?;
        Ok(StageOutput::Ranking(ranking))
    }
}
