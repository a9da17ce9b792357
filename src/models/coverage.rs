// Coverage Models - rubric verdicts used to gate the onboarding stop decision

use serde::{Deserialize, Serialize};

/// Verdict written into every category when coverage cannot be determined
pub const MISSING: &str = "Missing";

/// Per-category coverage of an onboarding transcript.
///
/// Produced fresh per evaluation and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    #[serde(default = "missing", alias = "identity_basics", alias = "identityBasics")]
    pub identity: String,
    #[serde(default = "missing", alias = "life_story")]
    pub life_story: String,
    #[serde(default = "missing", alias = "interests_and_passions")]
    pub interests: String,
    #[serde(default = "missing", alias = "personality_traits")]
    pub personality: String,
    #[serde(default = "missing", alias = "inner_world")]
    pub inner_world: String,
    #[serde(default = "missing", alias = "connection_needs")]
    pub connection_needs: String,
    #[serde(default, alias = "enough_to_stop")]
    pub enough_to_stop: bool,
}

fn missing() -> String {
    MISSING.to_string()
}

impl CoverageReport {
    /// Report used whenever the evaluator's reply cannot be understood
    pub fn conservative() -> Self {
        Self {
            identity: missing(),
            life_story: missing(),
            interests: missing(),
            personality: missing(),
            inner_world: missing(),
            connection_needs: missing(),
            enough_to_stop: false,
        }
    }

    /// Category verdicts in rubric order, labelled for display
    pub fn categories(&self) -> [(&'static str, &str); 6] {
        [
            ("Identity", self.identity.as_str()),
            ("Life story", self.life_story.as_str()),
            ("Interests", self.interests.as_str()),
            ("Personality", self.personality.as_str()),
            ("Inner world", self.inner_world.as_str()),
            ("Connection needs", self.connection_needs.as_str()),
        ]
    }

    /// Names of categories still reported as missing
    pub fn missing_categories(&self) -> Vec<&'static str> {
        self.categories()
            .into_iter()
            .filter(|(_, verdict)| verdict.trim().eq_ignore_ascii_case(MISSING))
            .map(|(name, _)| name)
            .collect()
    }
}

impl Default for CoverageReport {
    fn default() -> Self {
        Self::conservative()
    }
}
