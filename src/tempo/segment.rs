//! Tempo segments: the boxes of the tempo skyline

use serde::{Deserialize, Serialize};

use super::curve::mean_bpm;
use crate::document::{Mpm, Scope};
use crate::timemap::{LookupTable, TimePair};

/// Half-open tick span `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: u64,
    pub end: u64,
}

impl DateSpan {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Strictly inside, i.e. a valid split point.
    pub fn contains_inner(&self, tick: u64) -> bool {
        tick > self.start && tick < self.end
    }

    pub fn overlaps(&self, other: &DateSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Parameters read back from a committed tempo instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommittedTempo {
    pub end_date: u64,
    pub bpm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_tempo_at: Option<f64>,
    pub beat_length: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoSegment {
    pub date: DateSpan,
    #[serde(default)]
    pub selected: bool,
    /// A boundary is anchored by a silent onset rather than a played note
    #[serde(default)]
    pub silent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed: Option<CommittedTempo>,
}

impl TempoSegment {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            date: DateSpan::new(start, end),
            selected: false,
            silent: false,
            committed: None,
        }
    }

    /// Average performed tempo across the segment (skyline height).
    pub fn mean_bpm(&self, table: &LookupTable, pulses_per_quarter: u32, beat_length: f64) -> Option<f64> {
        if let Some(committed) = &self.committed {
            return Some(committed.bpm);
        }
        let (start, end) = (self.date.start as f64, self.date.end as f64);
        let seconds = table.tick_to_seconds(end) - table.tick_to_seconds(start);
        mean_bpm(end - start, seconds, pulses_per_quarter, beat_length)
    }
}

/// One segment between each pair of consecutive anchored ticks.
///
/// Segments touching a tick of `silent_onsets` are flagged silent.
pub fn extract_segments(table: &LookupTable, silent_onsets: &[TimePair]) -> Vec<TempoSegment> {
    let is_silent = |tick: u64| silent_onsets.iter().any(|(t, _)| t.round() as u64 == tick);
    let ticks: Vec<u64> = table
        .ticks()
        .filter(|t| *t >= 0.0)
        .map(|t| t.round() as u64)
        .collect();
    ticks
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| TempoSegment {
            silent: is_silent(w[0]) || is_silent(w[1]),
            ..TempoSegment::new(w[0], w[1])
        })
        .collect()
}

/// Committed tempo instructions of `scope` as segments. Each runs until the
/// next instruction; the last one until `end`.
pub fn segments_from_document(mpm: &Mpm, scope: Scope, end: u64) -> Vec<TempoSegment> {
    let Some(map) = mpm.map(scope) else {
        return Vec::new();
    };
    let starts: Vec<u64> = map.tempo.iter().map(|t| t.date.max(0.0).round() as u64).collect();
    map.tempo
        .iter()
        .zip(&starts)
        .enumerate()
        .filter_map(|(i, (tempo, &start))| {
            let stop = starts.get(i + 1).copied().unwrap_or(end);
            (stop > start).then(|| TempoSegment {
                committed: Some(CommittedTempo {
                    end_date: stop,
                    bpm: tempo.bpm,
                    transition_to: tempo.transition_to,
                    mean_tempo_at: tempo.mean_tempo_at,
                    beat_length: tempo.beat_length,
                }),
                ..TempoSegment::new(start, stop)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{mpm::insert_sorted, Tempo};
    use crate::timemap::build_lookup_table;

    #[test]
    fn test_extract_consecutive_segments() {
        let table = build_lookup_table(&[(0.0, 0.0), (720.0, 0.5), (1440.0, 1.0)], &[(2160.0, 2.0)]).unwrap();
        let segments = extract_segments(&table, &[(2160.0, 2.0)]);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].date, DateSpan::new(0, 720));
        assert!(!segments[1].silent);
        assert!(segments[2].silent);
    }

    #[test]
    fn test_mean_bpm_from_performance() {
        let table = build_lookup_table(&[(0.0, 0.0), (1440.0, 1.0)], &[]).unwrap();
        let segment = TempoSegment::new(0, 1440);
        // Two quarters in one second
        assert!((segment.mean_bpm(&table, 720, 0.25).unwrap() - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_segments_from_document() {
        let mut mpm = Mpm::default();
        for (id, date, bpm) in [("a", 0.0, 60.0), ("b", 1440.0, 80.0)] {
            insert_sorted(
                &mut mpm.global.tempo,
                Tempo {
                    id: id.to_string(),
                    date,
                    bpm,
                    transition_to: None,
                    mean_tempo_at: None,
                    beat_length: 0.25,
                },
            );
        }
        let segments = segments_from_document(&mpm, Scope::Global, 2880);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].date, DateSpan::new(0, 1440));
        assert_eq!(segments[1].committed.as_ref().map(|c| c.end_date), Some(2880));
        assert!(segments_from_document(&mpm, Scope::Part(3), 2880).is_empty());
    }
}
