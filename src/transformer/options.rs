//! Transformer options: what an edit changes and where

use serde::{Deserialize, Serialize};

use crate::document::Scope;
use crate::timemap::TimePair;

/// Where an operation applies in symbolic time.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Range { from: f64, to: f64 },
    Date { date: f64 },
    Notes { note_ids: Vec<String> },
}

impl Target {
    /// Span on the timeline; note sets cannot be resolved to one.
    pub fn span(&self) -> Option<(f64, f64)> {
        match self {
            Target::Range { from, to } => Some((*from, *to)),
            Target::Date { date } => Some((*date, *date)),
            Target::Notes { .. } => None,
        }
    }
}

fn default_beat_length() -> f64 {
    0.25
}

/// Approximate a logarithmic tempo curve over `[from, to)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoOptions {
    pub scope: Scope,
    pub from: u64,
    pub to: u64,
    #[serde(default = "default_beat_length")]
    pub beat_length: f64,
    /// Start from the tempo the previous instruction ends with
    #[serde(rename = "continue", default)]
    pub continue_previous: bool,
    /// Anchors for boundaries without a performed note
    #[serde(default)]
    pub silent_onsets: Vec<TimePair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicsOptions {
    pub scope: Scope,
    pub date: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_to: Option<f64>,
    /// Where the transition arrives; adds a closing instruction there
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubatoOptions {
    pub scope: Scope,
    pub from: f64,
    pub to: f64,
    pub intensity: f64,
    #[serde(default)]
    pub late_start: f64,
    #[serde(default = "one")]
    pub early_end: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PedalOptions {
    pub scope: Scope,
    pub from: f64,
    pub to: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccentuationOptions {
    pub scope: Scope,
    pub from: f64,
    pub to: f64,
    pub pattern: String,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticulationOptions {
    pub scope: Scope,
    #[serde(rename = "noteIDs")]
    pub note_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_velocity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrnamentOptions {
    pub scope: Scope,
    pub date: f64,
    pub name: String,
    #[serde(rename = "noteIDs", default)]
    pub note_ids: Vec<String>,
}

/// The operation a transformer performs, tagged by its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "options")]
pub enum Operation {
    #[serde(rename = "ApproximateLogarithmicTempo")]
    Tempo(TempoOptions),
    #[serde(rename = "InsertDynamicsInstructions")]
    Dynamics(DynamicsOptions),
    #[serde(rename = "InsertRubato")]
    Rubato(RubatoOptions),
    #[serde(rename = "InsertPedal")]
    Pedal(PedalOptions),
    #[serde(rename = "InsertMetricalAccentuation")]
    Accentuation(AccentuationOptions),
    #[serde(rename = "InsertArticulation")]
    Articulation(ArticulationOptions),
    #[serde(rename = "InsertOrnament")]
    Ornament(OrnamentOptions),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Tempo(_) => "ApproximateLogarithmicTempo",
            Operation::Dynamics(_) => "InsertDynamicsInstructions",
            Operation::Rubato(_) => "InsertRubato",
            Operation::Pedal(_) => "InsertPedal",
            Operation::Accentuation(_) => "InsertMetricalAccentuation",
            Operation::Articulation(_) => "InsertArticulation",
            Operation::Ornament(_) => "InsertOrnament",
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            Operation::Tempo(o) => o.scope,
            Operation::Dynamics(o) => o.scope,
            Operation::Rubato(o) => o.scope,
            Operation::Pedal(o) => o.scope,
            Operation::Accentuation(o) => o.scope,
            Operation::Articulation(o) => o.scope,
            Operation::Ornament(o) => o.scope,
        }
    }

    pub fn target(&self) -> Target {
        match self {
            Operation::Tempo(o) => Target::Range {
                from: o.from as f64,
                to: o.to as f64,
            },
            Operation::Dynamics(o) => match o.end_date {
                Some(end) => Target::Range { from: o.date, to: end },
                None => Target::Date { date: o.date },
            },
            Operation::Rubato(o) => Target::Range { from: o.from, to: o.to },
            Operation::Pedal(o) => Target::Range { from: o.from, to: o.to },
            Operation::Accentuation(o) => Target::Range { from: o.from, to: o.to },
            Operation::Articulation(o) => Target::Notes {
                note_ids: o.note_ids.clone(),
            },
            Operation::Ornament(o) => Target::Date { date: o.date },
        }
    }
}
