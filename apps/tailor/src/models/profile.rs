use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Applicant profile. Known fields are typed; everything else (e.g. `work1`, `edu1`
/// blocks written by the setup wizard) is kept as-is for the templates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub linkedin: String,
    pub github: String,
    pub address: String,
    pub summary: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}
