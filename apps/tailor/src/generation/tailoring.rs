//! Tailoring mode: biases selection toward technical or business content.
//!
//! The mode changes only the emphasis text handed to the selectors. Output shapes are
//! identical across modes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum TailoringMode {
    #[serde(rename = "tech", alias = "technical")]
    #[value(name = "tech")]
    Technical,
    #[serde(rename = "business")]
    #[value(name = "business")]
    Business,
    #[default]
    #[serde(rename = "general")]
    #[value(name = "general")]
    General,
}

/// Emphasis guidance for one tailoring mode.
#[derive(Debug, Clone)]
pub struct TailoringHint {
    pub emphasis: &'static str,
    pub prefer: Vec<&'static str>,
}

pub fn get_tailoring_hint(mode: TailoringMode) -> TailoringHint {
    match mode {
        TailoringMode::Technical => TailoringHint {
            emphasis: "This job description is in tech, very technical. \
                Prioritize hard technical skills and experiences.",
            prefer: vec![
                "programming languages",
                "frameworks",
                "system design",
                "measurable engineering impact",
            ],
        },
        TailoringMode::Business => TailoringHint {
            emphasis: "This job description is in business, very business-oriented. \
                Prioritize soft business skills and experiences.",
            prefer: vec![
                "stakeholder management",
                "communication",
                "commercial outcomes",
                "leadership",
            ],
        },
        TailoringMode::General => TailoringHint {
            emphasis: "",
            prefer: vec![],
        },
    }
}

impl TailoringHint {
    /// Renders the hint as a prompt fragment. Empty for the general mode.
    pub fn to_prompt(&self) -> String {
        if self.emphasis.is_empty() {
            return String::new();
        }
        format!(
            "{} Favor content about: {}.",
            self.emphasis,
            self.prefer.join(", ")
        )
    }
}
