use serde::{Deserialize, Serialize};

/// A single captured note.  Immutable once stored; `created_at_epoch` is
/// stamped in UTC seconds at ingestion time and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Monotonic, store-assigned.
    pub id: u64,
    pub user_id: String,
    pub conversation_id: String,
    pub text: String,
    pub created_at_epoch: i64,
}

/// Task priority.  Unspecified priority means `med`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Med,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Med => "med",
            Priority::High => "high",
        }
    }
}

/// One extracted next-action.  Only `title` is required; blank titles are
/// rendered as a placeholder rather than dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskItem {
    pub title: String,
    /// ISO date (`YYYY-MM-DD`) when the analyzer could extract one.
    pub due: Option<String>,
    pub owner: Option<String>,
    pub priority: Priority,
}

/// Structured output of the analysis collaborator.
///
/// All five lists default to empty: absence of data is an empty list, never
/// a missing field, so a partial response still deserializes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    pub events: Vec<String>,
    pub tasks: Vec<TaskItem>,
    pub risks: Vec<String>,
    pub ideas: Vec<String>,
    pub quotes: Vec<String>,
}

impl AnalysisResult {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.tasks.is_empty()
            && self.risks.is_empty()
            && self.ideas.is_empty()
            && self.quotes.is_empty()
    }
}
