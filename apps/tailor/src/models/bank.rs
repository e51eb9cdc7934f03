use serde::{Deserialize, Serialize};

use crate::config::Caps;
use crate::llm_client::nullable;

/// An atomic fact from the résumé bank. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankItem {
    pub id: String,
    /// Originating category, e.g. "Projects" or "Achievements".
    pub section: String,
    pub text: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
    /// Author-assigned importance in [0.0, 1.0].
    #[serde(default)]
    pub priority: Option<f32>,
}

impl BankItem {
    pub fn is_in(&self, section: BankSection) -> bool {
        self.section.eq_ignore_ascii_case(section.as_str())
    }
}

/// A bullet point belonging to one work or education entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailItem {
    pub id: String,
    pub text: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
}

impl DetailItem {
    /// Whether this bullet describes the employer itself.
    pub fn describes_company(&self) -> bool {
        self.id.eq_ignore_ascii_case("company")
            || self.tags.iter().any(|t| t.eq_ignore_ascii_case("company"))
    }
}

/// One line of the shared skills document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillItem {
    #[serde(default)]
    pub id: Option<String>,
    pub category: String,
    pub text: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
}

/// A narrative or concern used by the cover-letter writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverLetterItem {
    pub id: String,
    pub text: String,
    #[serde(default, deserialize_with = "nullable")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverLetterBank {
    pub narratives: Vec<CoverLetterItem>,
    /// "Stumbling blocks": concerns a recruiter may raise, with the applicant's answer.
    pub concerns: Vec<CoverLetterItem>,
}

impl CoverLetterBank {
    pub fn len(&self) -> usize {
        self.narratives.len() + self.concerns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flat bank sections chosen by the selection-with-reason selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BankSection {
    Projects,
    Achievements,
}

impl BankSection {
    pub const ALL: [BankSection; 2] = [BankSection::Projects, BankSection::Achievements];

    pub fn as_str(&self) -> &'static str {
        match self {
            BankSection::Projects => "Projects",
            BankSection::Achievements => "Achievements",
        }
    }

    pub fn cap(&self, caps: &Caps) -> usize {
        match self {
            BankSection::Projects => caps.projects,
            BankSection::Achievements => caps.achievements,
        }
    }
}
