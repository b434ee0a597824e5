//! Staged tempo segments and their chained preview
//!
//! Segment `k > 0` continues from whatever tempo segment `k - 1` actually
//! ended with. The preview finds that out by applying the staged segments in
//! order to a scratch copy of the document; the real document only changes
//! on [`TempoChain::insert`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::segment::{DateSpan, TempoSegment};
use crate::argumentation::Argumentation;
use crate::document::{Document, Scope, Tempo};
use crate::error::{EditorError, Result};
use crate::timemap::TimePair;
use crate::transformer::{apply_tempo_instruction, Operation, TempoOptions, TransformerId, TransformerStack};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedSegment {
    pub date: DateSpan,
    pub beat_length: f64,
    #[serde(default)]
    pub silent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoChain {
    pub scope: Scope,
    pub new_segments: Vec<StagedSegment>,
}

impl Default for TempoChain {
    fn default() -> Self {
        Self::new(Scope::Global)
    }
}

impl TempoChain {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            new_segments: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.new_segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new_segments.is_empty()
    }

    /// Add a segment to the end of the chain.
    pub fn stage(&mut self, segment: &TempoSegment, beat_length: f64) {
        self.new_segments.push(StagedSegment {
            date: segment.date,
            beat_length,
            silent: segment.silent,
        });
    }

    pub fn clear(&mut self) {
        self.new_segments.clear();
    }

    /// Transformer options for each staged segment; all but the first continue
    /// from their predecessor.
    pub fn options(&self, silent_onsets: &[TimePair]) -> Vec<TempoOptions> {
        self.new_segments
            .iter()
            .enumerate()
            .map(|(i, s)| TempoOptions {
                scope: self.scope,
                from: s.date.start,
                to: s.date.end,
                beat_length: s.beat_length,
                continue_previous: i > 0,
                silent_onsets: silent_onsets.to_vec(),
            })
            .collect()
    }

    /// Tempo instructions the staged segments would produce, computed on a
    /// scratch copy of `document`. Entry `k` belongs to staged segment `k`.
    ///
    /// Fails when a silent segment boundary has no physical onset yet, or when
    /// a staged span cannot be approximated (the performance does not move
    /// forward across it).
    pub fn preview(&self, document: &Document, silent_onsets: &[TimePair]) -> Result<Vec<Tempo>> {
        self.check_anchors(document, silent_onsets)?;
        let mut scratch = document.clone();
        let tempos = self
            .options(silent_onsets)
            .iter()
            .enumerate()
            .map(|(i, options)| {
                apply_tempo_instruction(options, &mut scratch, &format!("preview{}", i)).ok_or_else(|| {
                    EditorError::Segment(format!(
                        "tempo over [{}, {}) cannot be approximated",
                        options.from, options.to
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(staged = self.len(), "tempo chain preview");
        Ok(tempos)
    }

    /// Commit every staged segment as a transformer, in order, under one
    /// shared argumentation. Clears the chain.
    ///
    /// Fails like [`preview`](Self::preview), leaving the stack and the chain
    /// untouched.
    pub fn insert(
        &mut self,
        stack: &mut TransformerStack,
        silent_onsets: &[TimePair],
        argumentation: Option<Argumentation>,
    ) -> Result<Vec<TransformerId>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.preview(stack.document(), silent_onsets)?;
        let argumentation = argumentation.unwrap_or_else(|| stack.new_argumentation());
        let ids = self
            .options(silent_onsets)
            .into_iter()
            .map(|options| stack.append_with(Operation::Tempo(options), argumentation.clone()))
            .collect();
        self.clear();
        Ok(ids)
    }

    fn check_anchors(&self, document: &Document, silent_onsets: &[TimePair]) -> Result<()> {
        let table = document.lookup_table(self.scope, silent_onsets);
        for segment in self.new_segments.iter().filter(|s| s.silent) {
            for tick in [segment.date.start, segment.date.end] {
                if !table.as_ref().is_some_and(|t| t.has_tick(tick as f64)) {
                    return Err(EditorError::MissingPhysicalOnset { tick });
                }
            }
        }
        Ok(())
    }
}
