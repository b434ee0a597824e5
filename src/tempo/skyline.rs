//! Split/combine state machine over the tempo segments of one cluster

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::segment::{DateSpan, TempoSegment};
use crate::error::{EditorError, Result};
use crate::timemap::{LookupTable, TimePair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkylineMode {
    #[default]
    Idle,
    Split,
}

/// What a split did at the clicked tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitOutcome {
    /// The new boundary sits on a performed note
    Anchored,
    /// The new boundary needs this silent onset in the lookup table
    Silent(TimePair),
    /// No segment strictly contains the tick; nothing changed
    Outside,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skyline {
    segments: Vec<TempoSegment>,
    #[serde(default)]
    mode: SkylineMode,
}

impl Skyline {
    pub fn new(mut segments: Vec<TempoSegment>) -> Self {
        segments.sort_by_key(|s| (s.date.start, s.date.end));
        Self {
            segments,
            mode: SkylineMode::Idle,
        }
    }

    pub fn segments(&self) -> &[TempoSegment] {
        &self.segments
    }

    pub fn mode(&self) -> SkylineMode {
        self.mode
    }

    /// Replace the segments (e.g. after the note set changed); back to idle.
    pub fn set_segments(&mut self, segments: Vec<TempoSegment>) {
        *self = Self::new(segments);
    }

    pub fn enter_split_mode(&mut self) {
        self.mode = SkylineMode::Split;
    }

    /// Leave any pending gesture and drop the selection.
    pub fn cancel(&mut self) {
        self.mode = SkylineMode::Idle;
        self.clear_selection();
    }

    pub fn segment_at(&self, tick: u64) -> Option<&TempoSegment> {
        self.segments
            .iter()
            .find(|s| s.date.start <= tick && tick < s.date.end)
    }

    /// Bisect the segment strictly containing `tick`.
    ///
    /// When `table` has no entry at `tick`, the caller must supply the
    /// physical onset of the new boundary; the returned silent onset has to be
    /// added to the table before previews depend on it. Returns to idle on
    /// success.
    pub fn split_at(
        &mut self,
        tick: u64,
        table: Option<&LookupTable>,
        physical_onset: Option<f64>,
    ) -> Result<SplitOutcome> {
        if self.mode != SkylineMode::Split {
            return Err(EditorError::Segment("split requested outside split mode".to_string()));
        }
        let Some(index) = self.segments.iter().position(|s| s.date.contains_inner(tick)) else {
            debug!(tick, "split: no segment contains tick");
            return Ok(SplitOutcome::Outside);
        };

        let anchored = table.is_some_and(|t| t.has_tick(tick as f64));
        let outcome = if anchored {
            SplitOutcome::Anchored
        } else {
            match physical_onset.filter(|s| s.is_finite()) {
                Some(seconds) => SplitOutcome::Silent((tick as f64, seconds)),
                None => return Err(EditorError::MissingPhysicalOnset { tick }),
            }
        };

        let original = self.segments.remove(index);
        let silent_boundary = matches!(outcome, SplitOutcome::Silent(_));
        let left = TempoSegment {
            silent: original.silent || silent_boundary,
            ..TempoSegment::new(original.date.start, tick)
        };
        let right = TempoSegment {
            silent: original.silent || silent_boundary,
            ..TempoSegment::new(tick, original.date.end)
        };
        self.segments.insert(index, right);
        self.segments.insert(index, left);
        self.mode = SkylineMode::Idle;
        debug!(tick, ?outcome, "split segment");
        Ok(outcome)
    }

    /// Flip the selection flag of the segment starting at `start`.
    pub fn toggle_selected(&mut self, start: u64) -> bool {
        match self.segments.iter_mut().find(|s| s.date.start == start) {
            Some(segment) => {
                segment.selected = !segment.selected;
                true
            }
            None => false,
        }
    }

    pub fn selected(&self) -> impl Iterator<Item = &TempoSegment> + '_ {
        self.segments.iter().filter(|s| s.selected)
    }

    pub fn clear_selection(&mut self) {
        for segment in &mut self.segments {
            segment.selected = false;
        }
    }

    /// Replace the selected segments (and anything between them) with one
    /// segment spanning their union.
    pub fn combine(&mut self) -> Result<DateSpan> {
        let selected: Vec<DateSpan> = self.selected().map(|s| s.date).collect();
        if selected.len() < 2 {
            return Err(EditorError::Segment(format!(
                "combine needs at least two selected segments, got {}",
                selected.len()
            )));
        }
        let span = DateSpan::new(
            selected.iter().map(|d| d.start).min().unwrap_or_default(),
            selected.iter().map(|d| d.end).max().unwrap_or_default(),
        );
        let silent = self
            .segments
            .iter()
            .any(|s| s.silent && s.date.overlaps(&span));
        self.segments.retain(|s| !s.date.overlaps(&span));
        let index = self.segments.partition_point(|s| s.date.start < span.start);
        self.segments.insert(
            index,
            TempoSegment {
                silent,
                ..TempoSegment::new(span.start, span.end)
            },
        );
        self.mode = SkylineMode::Idle;
        debug!(start = span.start, end = span.end, "combined segments");
        Ok(span)
    }

    /// Whether no two segments overlap; holds between gestures.
    pub fn is_non_overlapping(&self) -> bool {
        self.segments.windows(2).all(|w| w[0].date.end <= w[1].date.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timemap::build_lookup_table;

    fn skyline() -> Skyline {
        Skyline::new(vec![
            TempoSegment::new(1440, 2880),
            TempoSegment::new(0, 1440),
            TempoSegment::new(2880, 4320),
        ])
    }

    fn table() -> LookupTable {
        build_lookup_table(&[(0.0, 0.0), (720.0, 0.5), (1440.0, 1.0), (2880.0, 2.0)], &[]).unwrap()
    }

    #[test]
    fn test_split_requires_split_mode() {
        let mut sky = skyline();
        assert!(matches!(sky.split_at(720, Some(&table()), None), Err(EditorError::Segment(_))));
    }

    #[test]
    fn test_split_at_note_onset() {
        let mut sky = skyline();
        sky.enter_split_mode();
        assert_eq!(sky.split_at(720, Some(&table()), None).unwrap(), SplitOutcome::Anchored);
        assert_eq!(sky.mode(), SkylineMode::Idle);
        let spans: Vec<_> = sky.segments().iter().map(|s| (s.date.start, s.date.end)).collect();
        assert_eq!(spans, vec![(0, 720), (720, 1440), (1440, 2880), (2880, 4320)]);
        assert!(sky.is_non_overlapping());
    }

    #[test]
    fn test_split_without_note_needs_physical_onset() {
        let mut sky = skyline();
        sky.enter_split_mode();
        assert!(matches!(
            sky.split_at(2000, Some(&table()), None),
            Err(EditorError::MissingPhysicalOnset { tick: 2000 })
        ));
        assert_eq!(sky.mode(), SkylineMode::Split);
        assert_eq!(
            sky.split_at(2000, Some(&table()), Some(1.4)).unwrap(),
            SplitOutcome::Silent((2000.0, 1.4))
        );
        assert!(sky.segment_at(2000).unwrap().silent);
    }

    #[test]
    fn test_split_outside_any_segment() {
        let mut sky = skyline();
        sky.enter_split_mode();
        assert_eq!(sky.split_at(1440, Some(&table()), None).unwrap(), SplitOutcome::Outside);
        assert_eq!(sky.split_at(9000, Some(&table()), None).unwrap(), SplitOutcome::Outside);
        assert_eq!(sky.segments().len(), 3);
    }

    #[test]
    fn test_combine_selected() {
        let mut sky = skyline();
        assert!(sky.toggle_selected(0));
        assert!(matches!(sky.combine(), Err(EditorError::Segment(_))));
        assert!(sky.toggle_selected(2880));
        assert!(!sky.toggle_selected(5));

        let span = sky.combine().unwrap();
        assert_eq!(span, DateSpan::new(0, 4320));
        assert_eq!(sky.segments().len(), 1);
        assert_eq!(sky.selected().count(), 0);
        assert!(sky.is_non_overlapping());
    }

    #[test]
    fn test_cancel_clears_selection() {
        let mut sky = skyline();
        sky.enter_split_mode();
        sky.toggle_selected(1440);
        sky.cancel();
        assert_eq!(sky.mode(), SkylineMode::Idle);
        assert_eq!(sky.selected().count(), 0);
    }
}
