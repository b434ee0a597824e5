//! Lookup table construction and interpolation

use serde::{Deserialize, Serialize};

/// One correspondence point: `(tick, seconds)`.
pub type TimePair = (f64, f64);

/// Sorted, deduplicated tick/seconds correspondence points.
///
/// Immutable once built. Rebuild it whenever the note set or the silent
/// onsets change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupTable {
    pairs: Vec<TimePair>,
}

/// Build a lookup table from note-derived `pairs` and additional `extra`
/// anchors (silent onsets).
///
/// Returns `None` when the merged set is empty. Duplicate ticks collapse to the
/// first occurrence; since `pairs` are considered before `extra`, an anchor
/// never overrides a performed note on the same tick.
///
/// # Example
/// ```rust
/// use mpm_editor::timemap::build_lookup_table;
///
/// let table = build_lookup_table(&[(0.0, 0.0), (720.0, 2.0)], &[(360.0, 1.0), (720.0, 99.0)]).unwrap();
/// assert_eq!(table.pairs(), &[(0.0, 0.0), (360.0, 1.0), (720.0, 2.0)]);
/// ```
pub fn build_lookup_table(pairs: &[TimePair], extra: &[TimePair]) -> Option<LookupTable> {
    let mut merged: Vec<TimePair> = pairs
        .iter()
        .chain(extra.iter())
        .copied()
        .filter(|(tick, seconds)| tick.is_finite() && seconds.is_finite())
        .collect();
    if merged.is_empty() {
        return None;
    }

    // Stable: equal ticks keep their input order, so the first one survives dedup
    merged.sort_by(|a, b| a.0.total_cmp(&b.0));
    merged.dedup_by(|later, earlier| later.0 == earlier.0);

    Some(LookupTable { pairs: merged })
}

impl LookupTable {
    pub fn pairs(&self) -> &[TimePair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Recorded ticks in ascending order.
    pub fn ticks(&self) -> impl Iterator<Item = f64> + '_ {
        self.pairs.iter().map(|(tick, _)| *tick)
    }

    /// Whether `tick` is itself a table key (a performed onset or an anchor).
    pub fn has_tick(&self, tick: f64) -> bool {
        self.pairs
            .binary_search_by(|(t, _)| t.total_cmp(&tick))
            .is_ok()
    }

    /// Convert a symbolic date to physical seconds.
    ///
    /// - empty table: `0`
    /// - single pair: that pair's seconds
    /// - at or before the first key / at or after the last key: linear
    ///   extrapolation with the first / last segment's slope
    /// - otherwise: linear interpolation between the bracketing keys
    pub fn tick_to_seconds(&self, tick: f64) -> f64 {
        interpolate(&self.pairs, tick, |p| p.0, |p| p.1)
    }

    /// Convert physical seconds to a symbolic date; the inverse of
    /// [`tick_to_seconds`](Self::tick_to_seconds).
    ///
    /// The search runs over the seconds column, so the result is only
    /// meaningful when seconds increase with ticks.
    pub fn seconds_to_tick(&self, seconds: f64) -> f64 {
        interpolate(&self.pairs, seconds, |p| p.1, |p| p.0)
    }

    /// Local slope (seconds per tick) of the segment that starts at or before
    /// `tick`, clamped to the first/last segment outside the range.
    pub fn seconds_per_tick_at(&self, tick: f64) -> Option<f64> {
        if self.pairs.len() < 2 {
            return None;
        }
        let idx = self
            .pairs
            .partition_point(|(t, _)| *t <= tick)
            .clamp(1, self.pairs.len() - 1);
        let (t0, s0) = self.pairs[idx - 1];
        let (t1, s1) = self.pairs[idx];
        Some((s1 - s0) / (t1 - t0))
    }
}

/// Shared interpolation kernel: `key` is the searched column, `value` the
/// returned one. Both directions use identical extrapolation rules so that the
/// two conversions are exact inverses.
fn interpolate<K, V>(pairs: &[TimePair], x: f64, key: K, value: V) -> f64
where
    K: Fn(&TimePair) -> f64,
    V: Fn(&TimePair) -> f64,
{
    match pairs.len() {
        0 => return 0.0,
        1 => return value(&pairs[0]),
        _ => {}
    }

    let last = pairs.len() - 1;
    let (lo, hi) = if x <= key(&pairs[0]) {
        (0, 1)
    } else if x >= key(&pairs[last]) {
        (last - 1, last)
    } else {
        // First index whose key is greater than x; never 0 or len here
        let idx = pairs.partition_point(|p| key(p) <= x);
        (idx - 1, idx)
    };

    let (k0, v0) = (key(&pairs[lo]), value(&pairs[lo]));
    let (k1, v1) = (key(&pairs[hi]), value(&pairs[hi]));

    if x == k0 {
        return v0;
    }
    if x == k1 {
        return v1;
    }
    if k1 == k0 {
        // Flat segment in the searched column: no inverse exists, stay on the key
        return v0;
    }

    v0 + (x - k0) * (v1 - v0) / (k1 - k0)
}
