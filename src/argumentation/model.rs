//! Argumentation records: why a group of edits was made

use serde::{Deserialize, Serialize};

pub type ArgumentationId = String;

/// How sure the analyst is about the conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    Authentic,
    Plausible,
    Unlikely,
    #[default]
    Unknown,
}

/// What the performer is believed to be doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Motivation {
    Intensification,
    Relaxation,
    Move,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    pub certainty: Certainty,
    pub motivation: Motivation,
    /// Reference to the belief subject (a passage, a note, a transformer)
    #[serde(default)]
    pub that: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argumentation {
    pub id: ArgumentationId,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub conclusion: Conclusion,
}

impl Argumentation {
    pub fn new(id: impl Into<ArgumentationId>) -> Self {
        Self {
            id: id.into(),
            note: String::new(),
            description: String::new(),
            conclusion: Conclusion::default(),
        }
    }

    pub fn with_motivation(mut self, motivation: Motivation) -> Self {
        self.conclusion.motivation = motivation;
        self
    }
}
