//! Greedy interval coloring: assign overlapping spans to separate tracks

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    /// Builds an interval, swapping reversed bounds.
    pub fn new(start: f64, end: f64) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    /// Track of each input interval, by input position
    pub tracks: Vec<usize>,
    pub track_count: usize,
}

/// Heap entry: a track that becomes free at `end`.
#[derive(Debug, Clone, Copy)]
struct Busy {
    end: f64,
    track: usize,
}

impl PartialEq for Busy {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Busy {}

impl PartialOrd for Busy {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Busy {
    fn cmp(&self, other: &Self) -> Ordering {
        self.end.total_cmp(&other.end).then(self.track.cmp(&other.track))
    }
}

/// Assign every interval a track so that no two intervals on one track
/// overlap, using the minimum number of tracks.
///
/// Intervals are swept by start (longer first on ties). A track is reused
/// when its last interval ends at least `padding` before the next start.
pub fn layout_intervals(intervals: &[Interval], padding: f64) -> Layout {
    let mut order: Vec<usize> = (0..intervals.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&intervals[a], &intervals[b]);
        a.start
            .total_cmp(&b.start)
            .then_with(|| b.duration().total_cmp(&a.duration()))
    });

    let mut tracks = vec![0; intervals.len()];
    let mut busy: BinaryHeap<Reverse<Busy>> = BinaryHeap::new();
    let mut track_count = 0;

    for i in order {
        let interval = intervals[i];
        let reusable = busy
            .peek()
            .filter(|Reverse(free)| free.end + padding <= interval.start)
            .map(|Reverse(free)| free.track);
        let track = match reusable {
            Some(track) => {
                busy.pop();
                track
            }
            None => {
                track_count += 1;
                track_count - 1
            }
        };
        tracks[i] = track;
        busy.push(Reverse(Busy {
            end: interval.end,
            track,
        }));
    }

    Layout { tracks, track_count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn iv(start: f64, end: f64) -> Interval {
        Interval::new(start, end)
    }

    #[test]
    fn test_mutually_overlapping_need_three_tracks() {
        let layout = layout_intervals(&[iv(0.0, 10.0), iv(2.0, 12.0), iv(4.0, 14.0)], 0.0);
        assert_eq!(layout.track_count, 3);
        let mut tracks = layout.tracks.clone();
        tracks.sort();
        assert_eq!(tracks, vec![0, 1, 2]);
    }

    #[test]
    fn test_disjoint_intervals_share_a_track() {
        let layout = layout_intervals(&[iv(0.0, 10.0), iv(20.0, 30.0)], 0.0);
        assert_eq!(layout.track_count, 1);
        assert_eq!(layout.tracks, vec![0, 0]);
    }

    #[test]
    fn test_padding_prevents_reuse() {
        let intervals = [iv(0.0, 10.0), iv(12.0, 20.0)];
        assert_eq!(layout_intervals(&intervals, 1.0).track_count, 1);
        assert_eq!(layout_intervals(&intervals, 5.0).track_count, 2);
    }

    #[test]
    fn test_longer_interval_placed_first_on_tie() {
        let layout = layout_intervals(&[iv(0.0, 5.0), iv(0.0, 50.0)], 0.0);
        assert_eq!(layout.tracks, vec![1, 0]);
    }

    #[test]
    fn test_zero_width_and_reversed() {
        let layout = layout_intervals(&[iv(10.0, 0.0), iv(10.0, 10.0)], 0.0);
        assert_eq!(layout.track_count, 1);
        assert_eq!(layout_intervals(&[], 0.0).track_count, 0);
    }

    fn max_overlap(intervals: &[Interval]) -> usize {
        // Intervals touching at an endpoint may share a track
        intervals
            .iter()
            .map(|p| intervals.iter().filter(|q| q.start <= p.start && p.start < q.end).count())
            .max()
            .unwrap_or(0)
    }

    proptest! {
        #[test]
        fn test_track_count_is_clique_size(raw in prop::collection::vec((0u32..100, 1u32..30), 0..20)) {
            let intervals: Vec<Interval> = raw
                .iter()
                .map(|(s, d)| iv(*s as f64, (*s + *d) as f64))
                .collect();
            let layout = layout_intervals(&intervals, 0.0);
            prop_assert_eq!(layout.track_count, max_overlap(&intervals));

            for (i, a) in intervals.iter().enumerate() {
                for (j, b) in intervals.iter().enumerate().skip(i + 1) {
                    if layout.tracks[i] == layout.tracks[j] {
                        prop_assert!(a.end <= b.start || b.end <= a.start);
                    }
                }
            }
        }
    }
}
