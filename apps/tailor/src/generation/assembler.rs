//! Assembler: resolves selections into ordered display text per section.
//!
//! The section set is fixed by configuration: every work entry, every education entry,
//! the bank sections and `Skills`. Each of them is present in the output, empty or not.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::generation::pipeline::{Stage, StageError};
use crate::generation::ranker::{Ranking, Selection, SelectionResult};
use crate::models::bank::{BankItem, BankSection};
use crate::models::run_record::{Field, RunRecord, StageOutput};

pub const SKILLS_SECTION: &str = "Skills";

/// Section name → ordered display strings, ready for the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assembled {
    pub sections: BTreeMap<String, Vec<String>>,
}

impl Assembled {
    pub fn total_items(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SectionKind {
    Work,
    Education,
    Bank(BankSection),
    Skills,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionSpec {
    pub name: String,
    pub kind: SectionKind,
    pub cap: usize,
}

/// The fixed section set for a configuration, with the cap that applies to each.
pub fn section_plan(config: &RunConfig) -> Vec<SectionSpec> {
    let caps = &config.caps;
    let mut plan: Vec<SectionSpec> = config
        .work_experience
        .keys()
        .map(|name| SectionSpec {
            name: name.clone(),
            kind: SectionKind::Work,
            cap: caps.experience,
        })
        .collect();
    plan.extend(config.edu_experience.keys().map(|name| SectionSpec {
        name: name.clone(),
        kind: SectionKind::Education,
        cap: caps.education,
    }));
    plan.extend(BankSection::ALL.iter().map(|section| SectionSpec {
        name: section.as_str().to_string(),
        kind: SectionKind::Bank(*section),
        cap: section.cap(caps),
    }));
    plan.push(SectionSpec {
        name: SKILLS_SECTION.to_string(),
        kind: SectionKind::Skills,
        cap: caps.skills,
    });
    plan
}

/// Truncates to the cap, then resolves each selection to display text.
///
/// Rewritten items carry their own text. Items selected with a reason are looked up
/// in the bank by id; ids that do not resolve are skipped.
fn resolve_section(
    name: &str,
    result: Option<&SelectionResult>,
    cap: usize,
    bank: &HashMap<&str, &BankItem>,
) -> Vec<String> {
    let Some(result) = result else {
        return Vec::new();
    };
    result
        .selected
        .iter()
        .take(cap)
        .filter_map(|item| match &item.selection {
            Selection::WithText(text) => Some(text.clone()),
            Selection::WithReason(_) => match bank.get(item.id.as_str()) {
                Some(source) => Some(source.text.clone()),
                None => {
                    warn!("Section '{name}': unresolved bank id '{}', skipping", item.id);
                    None
                }
            },
        })
        .collect()
}

pub fn assemble(ranking: &Ranking, bank: &[BankItem], config: &RunConfig) -> Assembled {
    let by_id: HashMap<&str, &BankItem> = bank.iter().map(|b| (b.id.as_str(), b)).collect();
    let mut sections = BTreeMap::new();

    for section in section_plan(config) {
        let lines = match section.kind {
            SectionKind::Skills => ranking
                .skills
                .iter()
                .take(section.cap)
                .map(|line| format!("{}: {}", line.category, line.text))
                .collect(),
            _ => resolve_section(
                &section.name,
                ranking.sections.get(&section.name),
                section.cap,
                &by_id,
            ),
        };
        sections.insert(section.name, lines);
    }

    Assembled { sections }
}

pub struct AssembleStage;

impl AssembleStage {
    pub const NAME: &'static str = "assemble";
}

#[async_trait]
impl Stage for AssembleStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn reads(&self) -> &'static [Field] {
        &[Field::Ranking, Field::Bank, Field::Config]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Assembled]
    }

    async fn run(&self, record: &RunRecord) -> Result<StageOutput, StageError> {
        let Some(ranking) = record.ranking.as_ref() else {
            return Err(StageError::MissingPrecondition(Field::Ranking));
        };
        let assembled = assemble(ranking, &record.bank, &record.config);
        info!(
            "Assembled {} sections, {} items",
            assembled.sections.len(),
            assembled.total_items()
        );
        Ok(StageOutput::Assembled(assembled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Caps;
    use crate::generation::ranker::{SelectedItem, SkillLine};
    use crate::testing::record_with;
    use std::path::PathBuf;

    fn bank_item(id: &str, section: &str, text: &str) -> BankItem {
        BankItem {
            id: id.to_string(),
            section: section.to_string(),
            text: text.to_string(),
            tags: vec![],
            priority: None,
        }
    }

    fn ranking_with(section: &str, selected: Vec<SelectedItem>) -> Ranking {
        let mut ranking = Ranking::default();
        ranking.sections.insert(
            section.to_string(),
            SelectionResult {
                selected,
                missing_topics: vec![],
            },
        );
        ranking
    }

    #[test]
    fn test_projects_reason_resolves_to_bank_text() {
        let bank = vec![bank_item("p1", "Projects", "Built X")];
        let config = RunConfig {
            caps: Caps {
                projects: 1,
                ..Caps::default()
            },
            ..RunConfig::default()
        };
        let ranking = ranking_with("Projects", vec![SelectedItem::with_reason("p1", "matches Go")]);
        let assembled = assemble(&ranking, &bank, &config);
        assert_eq!(assembled.sections["Projects"], vec!["Built X"]);
    }

    #[test]
    fn test_unresolved_ids_are_skipped() {
        let bank = vec![bank_item("p1", "Projects", "Built X")];
        let ranking = ranking_with(
            "Projects",
            vec![
                SelectedItem::with_reason("p1", "valid"),
                SelectedItem::with_reason("ghost", "missing"),
            ],
        );
        let assembled = assemble(&ranking, &bank, &RunConfig::default());
        assert_eq!(assembled.sections["Projects"], vec!["Built X"]);
    }

    #[test]
    fn test_output_never_exceeds_cap() {
        let bank: Vec<_> = (0..6)
            .map(|i| bank_item(&format!("a{i}"), "Achievements", &format!("Win {i}")))
            .collect();
        let selected = (0..6)
            .map(|i| SelectedItem::with_reason(format!("a{i}"), "r"))
            .collect();
        let ranking = ranking_with("Achievements", selected);
        let config = RunConfig {
            caps: Caps {
                achievements: 2,
                ..Caps::default()
            },
            ..RunConfig::default()
        };
        let assembled = assemble(&ranking, &bank, &config);
        assert_eq!(assembled.sections["Achievements"], vec!["Win 0", "Win 1"]);
    }

    #[test]
    fn test_truncation_happens_before_resolution() {
        // Cap of 1 keeps only the unresolvable first item, so nothing is emitted
        let bank = vec![bank_item("p2", "Projects", "Built Y")];
        let ranking = ranking_with(
            "Projects",
            vec![
                SelectedItem::with_reason("ghost", "r"),
                SelectedItem::with_reason("p2", "r"),
            ],
        );
        let config = RunConfig {
            caps: Caps {
                projects: 1,
                ..Caps::default()
            },
            ..RunConfig::default()
        };
        let assembled = assemble(&ranking, &bank, &config);
        assert!(assembled.sections["Projects"].is_empty());
    }

    #[test]
    fn test_every_planned_section_is_present_even_when_empty() {
        let mut config = RunConfig::default();
        config
            .work_experience
            .insert("work1".to_string(), PathBuf::from("w1.yaml"));
        config
            .edu_experience
            .insert("edu1".to_string(), PathBuf::from("e1.yaml"));

        let assembled = assemble(&Ranking::default(), &[], &config);
        let keys: Vec<_> = assembled.sections.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Achievements", "Projects", "Skills", "edu1", "work1"]);
        assert!(assembled.sections.values().all(Vec::is_empty));
    }

    #[test]
    fn test_rewritten_work_text_and_skills_lines() {
        let mut config = RunConfig::default();
        config
            .work_experience
            .insert("work1".to_string(), PathBuf::from("w1.yaml"));
        config.caps.skills = 1;

        let mut ranking = ranking_with(
            "work1",
            vec![
                SelectedItem::with_text("exp_1", "Acme builds payment rails"),
                SelectedItem::with_text("exp_2", "Cut latency 40%"),
            ],
        );
        ranking.skills = vec![
            SkillLine {
                category: "Languages".to_string(),
                text: "Rust, Go".to_string(),
            },
            SkillLine {
                category: "Tools".to_string(),
                text: "Docker".to_string(),
            },
        ];

        let assembled = assemble(&ranking, &[], &config);
        assert_eq!(
            assembled.sections["work1"],
            vec!["Acme builds payment rails", "Cut latency 40%"]
        );
        assert_eq!(assembled.sections[SKILLS_SECTION], vec!["Languages: Rust, Go"]);
    }

    #[test]
    fn test_section_plan_caps() {
        let mut config = RunConfig::default();
        config
            .edu_experience
            .insert("edu1".to_string(), PathBuf::from("e1.yaml"));
        let plan = section_plan(&config);
        let edu = plan.iter().find(|s| s.name == "edu1").unwrap();
        assert_eq!(edu.kind, SectionKind::Education);
        assert_eq!(edu.cap, 3);
        let skills = plan.iter().find(|s| s.kind == SectionKind::Skills).unwrap();
        assert_eq!(skills.cap, 12);
    }

    #[tokio::test]
    async fn test_assemble_stage_requires_ranking() {
        let record = record_with(vec![], RunConfig::default());
        let err = AssembleStage.run(&record).await.unwrap_err();
        assert!(matches!(err, StageError::MissingPrecondition(Field::Ranking)));
    }
}
