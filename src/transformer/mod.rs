//! # Transformer Module
//!
//! The edit history. A transformer is one parameterized operation
//! ([`Operation`]) tagged with the argumentation that justifies it.
//!
//! The live document is always `rebuild_document(base, history)`: appending
//! applies one edit in place, anything that removes or reorders edits replays
//! the whole history from the imported snapshot.

pub mod apply;
pub mod history;
pub mod options;

pub use apply::{apply, apply_tempo_instruction, SUSTAIN_CONTROLLER};
pub use history::{rebuild_document, Replay, Transformer, TransformerId, TransformerStack};
pub use options::{
    AccentuationOptions, ArticulationOptions, DynamicsOptions, Operation, OrnamentOptions,
    PedalOptions, RubatoOptions, Target, TempoOptions,
};
