//! Model and prompt selection.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Chat models the assistant can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelSelection {
    #[default]
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
}

impl ModelSelection {
    pub const ALL: [ModelSelection; 3] = [
        ModelSelection::Gpt4oMini,
        ModelSelection::Gpt4o,
        ModelSelection::Gpt35Turbo,
    ];

    /// Name sent to the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSelection::Gpt4oMini => "gpt-4o-mini",
            ModelSelection::Gpt4o => "gpt-4o",
            ModelSelection::Gpt35Turbo => "gpt-3.5-turbo",
        }
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelSelection {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        ModelSelection::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ValidationError::UnknownModel(name.to_string()))
    }
}

const DEFAULT_PROMPT: &str =
    "You are an expert programming assistant. Provide simple commenting, hints, and code response only.";

const INTERVIEW_PROMPT: &str = "You are an expert Data Science and Deep Learning Interview assistant. \
Your goal is to help the user act NATURAL and EXPERT. \
Structure your response into these sections:\n\
1. CONCEPT: A 1-sentence explanation of the underlying theory.\n\
2. STRATEGIC HINT TO ASK: A smart question the user can ask the interviewer to get a hint and look natural.\n\
3. TALKING POINTS: 2-3 bullet points to say out loud while thinking.\n\
4. CODE/SQL: The optimized solution, using Pandas, SQL or PyTorch as requested.\n\
Keep it concise and tactical.";

/// Which system prompt accompanies each query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    Default,
    #[default]
    Interview,
}

impl PromptMode {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            PromptMode::Default => DEFAULT_PROMPT,
            PromptMode::Interview => INTERVIEW_PROMPT,
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptMode::Default => f.write_str("default"),
            PromptMode::Interview => f.write_str("interview"),
        }
    }
}
