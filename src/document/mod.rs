//! # Document Module
//!
//! In-memory rendition of the documents the editor works on.
//!
//! ## Purpose
//! The full MEI/MSM/MPM object models belong to external libraries. This module
//! carries just enough of them to replay edit history deterministically and to
//! exchange documents with the rendering backend:
//! - [`Msm`] - notes with notated date/duration and performed onset/offset
//! - [`Mpm`] - global and per-part maps of dated performance instructions
//! - [`PerformanceTimings`] - performed timing read from an MEI recording
//!
//! ## Sub-modules
//! - `msm` - MSM model, parsing and serialization
//! - `mpm` - MPM model and deterministic serialization
//! - `mei` - MEI timing extraction and enrichment of MSM notes
//!
//! ## Tolerance
//! Malformed elements (a note without id, a `when` without time) are skipped
//! with a warning; only XML that cannot be tokenized is an error.

pub mod mei;
pub mod mpm;
pub mod msm;
mod xml;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use mei::{enrich, PerformanceTimings};
pub use mpm::{
    Accentuation, Articulation, Dated, Dynamics, Instruction, Movement, Mpm, Ornament, Rubato,
    Tempo,
};
pub use msm::{Msm, MsmNote, MsmPart};

use crate::error::Result;
use crate::timemap::{build_lookup_table, LookupTable, TimePair};

/// Which dated maps an instruction lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    Global,
    Part(u32),
}

impl Scope {
    /// Whether notes of `part` fall under this scope.
    pub fn covers_part(&self, part: u32) -> bool {
        match self {
            Scope::Global => true,
            Scope::Part(n) => *n == part,
        }
    }
}

/// The pair of documents transformers operate on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub msm: Msm,
    pub mpm: Mpm,
}

impl Document {
    pub fn new(msm: Msm) -> Self {
        Self {
            msm,
            mpm: Mpm::default(),
        }
    }

    pub fn pulses_per_quarter(&self) -> u32 {
        self.msm.pulses_per_quarter
    }

    /// Ids of every note and every performance instruction.
    pub fn element_ids(&self) -> BTreeSet<String> {
        let mut ids = self.mpm.element_ids();
        ids.extend(self.msm.notes.iter().map(|n| n.id.clone()));
        ids
    }

    pub fn contains_element(&self, id: &str) -> bool {
        self.msm.note(id).is_some() || self.mpm.contains_id(id)
    }

    /// Tick/second map for `scope`, augmented by silent onsets.
    pub fn lookup_table(&self, scope: Scope, silent_onsets: &[TimePair]) -> Option<LookupTable> {
        build_lookup_table(&self.msm.time_pairs(scope), silent_onsets)
    }

    pub fn mpm_xml(&self) -> Result<String> {
        self.mpm.to_xml(self.pulses_per_quarter())
    }
}
