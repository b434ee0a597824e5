//! Logarithmic tempo curves and their approximation from performed onsets
//!
//! A tempo instruction running from `bpm` to `transition_to` over
//! `[from, to)` follows
//!
//! ```text
//! tempo(x) = bpm + (transition_to - bpm) * u^p      u = (x - from) / (to - from)
//! p = ln(0.5) / ln(mean_tempo_at)
//! ```
//!
//! so the curve passes the mean of both tempi at `u = mean_tempo_at`.
//! `mean_tempo_at = 0.5` is a linear ramp.

use serde::{Deserialize, Serialize};

use crate::document::Tempo;
use crate::timemap::LookupTable;

/// Integration steps for curved spans (must be even).
const SIMPSON_STEPS: usize = 256;
const BISECTION_ROUNDS: usize = 80;
const MIN_MEAN_TEMPO_AT: f64 = 0.05;
const MAX_MEAN_TEMPO_AT: f64 = 0.95;
const MIN_BPM: f64 = 1.0;
const MAX_BPM: f64 = 2000.0;
/// Tempi closer than this are treated as equal.
const BPM_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoCurve {
    pub from: f64,
    pub to: f64,
    pub bpm: f64,
    pub transition_to: Option<f64>,
    pub mean_tempo_at: f64,
    /// Beat unit in whole notes
    pub beat_length: f64,
}

impl TempoCurve {
    pub fn constant(from: f64, to: f64, bpm: f64, beat_length: f64) -> Self {
        Self {
            from,
            to,
            bpm,
            transition_to: None,
            mean_tempo_at: 0.5,
            beat_length,
        }
    }

    pub fn end_bpm(&self) -> f64 {
        self.transition_to.unwrap_or(self.bpm)
    }

    fn exponent(&self) -> f64 {
        0.5f64.ln() / self.mean_tempo_at.ln()
    }

    pub fn bpm_at(&self, date: f64) -> f64 {
        let Some(target) = self.transition_to else {
            return self.bpm;
        };
        if self.to <= self.from {
            return self.bpm;
        }
        let u = ((date - self.from) / (self.to - self.from)).clamp(0.0, 1.0);
        self.bpm + (target - self.bpm) * u.powf(self.exponent())
    }

    /// Seconds elapsed between `from` and `date` (clamped to the span).
    pub fn seconds_until(&self, date: f64, pulses_per_quarter: u32) -> f64 {
        let ticks_per_beat = pulses_per_quarter as f64 * 4.0 * self.beat_length;
        let end = date.clamp(self.from, self.to.max(self.from));
        let width = end - self.from;
        if width <= 0.0 {
            return 0.0;
        }
        let seconds_per_tick = |x: f64| 60.0 / (self.bpm_at(x) * ticks_per_beat);

        if self.transition_to.is_none() {
            return width * seconds_per_tick(self.from);
        }

        let h = width / SIMPSON_STEPS as f64;
        let mut sum = seconds_per_tick(self.from) + seconds_per_tick(end);
        for i in 1..SIMPSON_STEPS {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            sum += weight * seconds_per_tick(self.from + i as f64 * h);
        }
        sum * h / 3.0
    }

    /// Duration of the whole span in seconds.
    pub fn seconds(&self, pulses_per_quarter: u32) -> f64 {
        self.seconds_until(self.to, pulses_per_quarter)
    }

    pub fn to_instruction(&self, id: impl Into<String>) -> Tempo {
        Tempo {
            id: id.into(),
            date: self.from,
            bpm: self.bpm,
            transition_to: self.transition_to,
            mean_tempo_at: self.transition_to.map(|_| self.mean_tempo_at),
            beat_length: self.beat_length,
        }
    }
}

/// Average tempo (bpm) needed to cover `ticks` in `seconds`.
pub fn mean_bpm(ticks: f64, seconds: f64, pulses_per_quarter: u32, beat_length: f64) -> Option<f64> {
    let beats = ticks / (pulses_per_quarter as f64 * 4.0 * beat_length);
    let bpm = beats * 60.0 / seconds;
    (bpm.is_finite() && bpm > 0.0).then_some(bpm)
}

/// Fit a tempo curve to the performed timing of `[from, to)`.
///
/// The start tempo is `start_bpm` when given (chained segments continue from
/// the previous instruction), otherwise the tempo of the first inter-onset
/// interval inside the span. The end tempo is the tempo of the last interval.
/// The curve shape (`mean_tempo_at`) is then solved so the curve takes exactly
/// as long as the performance; when no shape can, the end tempo is solved on
/// a linear ramp instead.
///
/// Returns `None` for empty spans or spans the performance does not move
/// forward through.
pub fn approximate(
    table: &LookupTable,
    from: f64,
    to: f64,
    pulses_per_quarter: u32,
    beat_length: f64,
    start_bpm: Option<f64>,
) -> Option<TempoCurve> {
    if to <= from || pulses_per_quarter == 0 || beat_length <= 0.0 {
        return None;
    }
    let seconds_at = |tick: f64| table.tick_to_seconds(tick);
    let target = seconds_at(to) - seconds_at(from);
    let mean = mean_bpm(to - from, target, pulses_per_quarter, beat_length)?;

    let interior: Vec<f64> = table.ticks().filter(|t| *t > from && *t < to).collect();
    let (start_estimate, end_estimate) = match (interior.first(), interior.last()) {
        (Some(&first), Some(&last)) => (
            mean_bpm(first - from, seconds_at(first) - seconds_at(from), pulses_per_quarter, beat_length)
                .unwrap_or(mean),
            mean_bpm(to - last, seconds_at(to) - seconds_at(last), pulses_per_quarter, beat_length)
                .unwrap_or(mean),
        ),
        _ => (mean, mean),
    };

    let forced = start_bpm.filter(|b| b.is_finite() && *b > 0.0);
    let start = forced.unwrap_or(start_estimate);
    let end = end_estimate;

    if (start - end).abs() < BPM_EPSILON && (start - mean).abs() < BPM_EPSILON {
        // A continued segment must start exactly where its predecessor ended
        let bpm = if forced.is_some() { start } else { mean };
        return Some(TempoCurve::constant(from, to, bpm, beat_length));
    }

    let curve = |end: f64, mean_tempo_at: f64| TempoCurve {
        from,
        to,
        bpm: start,
        transition_to: Some(end),
        mean_tempo_at,
        beat_length,
    };

    if (start - end).abs() >= BPM_EPSILON {
        let low = curve(end, MIN_MEAN_TEMPO_AT).seconds(pulses_per_quarter);
        let high = curve(end, MAX_MEAN_TEMPO_AT).seconds(pulses_per_quarter);
        if target >= low.min(high) && target <= low.max(high) {
            let mean_tempo_at = bisect(MIN_MEAN_TEMPO_AT, MAX_MEAN_TEMPO_AT, |m| {
                curve(end, m).seconds(pulses_per_quarter) - target
            });
            return Some(curve(end, mean_tempo_at));
        }
    }

    // Shape alone cannot match the duration: solve the end tempo on a linear ramp
    let end = bisect(MIN_BPM, MAX_BPM, |b| curve(b, 0.5).seconds(pulses_per_quarter) - target);
    Some(curve(end, 0.5))
}

/// Root of a monotonic function on `[lo, hi]` (clamped to the bounds).
fn bisect(mut lo: f64, mut hi: f64, f: impl Fn(f64) -> f64) -> f64 {
    let f_lo = f(lo);
    let f_hi = f(hi);
    if f_lo.signum() == f_hi.signum() {
        return if f_lo.abs() < f_hi.abs() { lo } else { hi };
    }
    let rising = f_hi > f_lo;
    for _ in 0..BISECTION_ROUNDS {
        let mid = (lo + hi) / 2.0;
        let value = f(mid);
        if value == 0.0 {
            return mid;
        }
        if (value < 0.0) == rising {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) / 2.0
}
