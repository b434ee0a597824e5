//! # Tempo Module
//!
//! Everything behind the tempo desk: the curve model used to approximate
//! performed tempo, the segment skyline with its split/combine gestures, and
//! the chain of staged segments previewed before they are committed.
//!
//! ## Sub-modules
//! - `curve` - logarithmic tempo curves and their fitting
//! - `segment` - segment extraction from onsets and from committed tempo
//! - `skyline` - `Idle <-> Split` state machine, selection and combine
//! - `chain` - staged segments, scratch-document preview and commit

pub mod chain;
pub mod curve;
pub mod segment;
pub mod skyline;

use serde::{Deserialize, Serialize};

pub use chain::{StagedSegment, TempoChain};
pub use curve::{approximate, TempoCurve};
pub use segment::{extract_segments, segments_from_document, CommittedTempo, DateSpan, TempoSegment};
pub use skyline::{Skyline, SkylineMode, SplitOutcome};

/// Tempo desk state persisted with a bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoDesk {
    pub skyline: Skyline,
    pub chain: TempoChain,
}
