//! Document edits performed by each operation
//!
//! Every edit sees the cumulative result of all earlier transformers, which is
//! what makes `continue` chaining and replay order meaningful. Element ids are
//! derived from the transformer id so that replaying the same history always
//! yields the same document.

use std::collections::BTreeSet;

use tracing::debug;

use super::options::{
    AccentuationOptions, ArticulationOptions, DynamicsOptions, Operation, OrnamentOptions,
    PedalOptions, RubatoOptions, TempoOptions,
};
use crate::document::mpm::insert_sorted;
use crate::document::{
    Accentuation, Articulation, Document, Dynamics, Movement, Ornament, Rubato, Tempo,
};
use crate::tempo::curve::approximate;

pub const SUSTAIN_CONTROLLER: &str = "sustain";

/// Hands out `{prefix}_{n}` ids for the elements of one transformer.
struct IdSource<'a> {
    prefix: &'a str,
    next: usize,
    created: BTreeSet<String>,
}

impl<'a> IdSource<'a> {
    fn new(prefix: &'a str) -> Self {
        Self {
            prefix,
            next: 0,
            created: BTreeSet::new(),
        }
    }

    fn next(&mut self) -> String {
        let id = format!("{}_{}", self.prefix, self.next);
        self.next += 1;
        self.created.insert(id.clone());
        id
    }
}

/// Apply `operation` to `document`, naming new elements after `id_prefix`.
/// Returns the ids of the elements created.
pub fn apply(operation: &Operation, document: &mut Document, id_prefix: &str) -> BTreeSet<String> {
    let mut ids = IdSource::new(id_prefix);
    match operation {
        Operation::Tempo(o) => {
            apply_tempo(o, document, &mut ids);
        }
        Operation::Dynamics(o) => apply_dynamics(o, document, &mut ids),
        Operation::Rubato(o) => apply_rubato(o, document, &mut ids),
        Operation::Pedal(o) => apply_pedal(o, document, &mut ids),
        Operation::Accentuation(o) => apply_accentuation(o, document, &mut ids),
        Operation::Articulation(o) => apply_articulation(o, document, &mut ids),
        Operation::Ornament(o) => apply_ornament(o, document, &mut ids),
    }
    ids.created
}

/// Insert the tempo instruction for a segment and return a copy of it.
///
/// Used directly by the chained preview, which needs the instruction it just
/// wrote into its scratch document.
pub fn apply_tempo_instruction(options: &TempoOptions, document: &mut Document, id: &str) -> Option<Tempo> {
    let mut ids = IdSource::new(id);
    apply_tempo(options, document, &mut ids)
}

fn apply_tempo(o: &TempoOptions, document: &mut Document, ids: &mut IdSource) -> Option<Tempo> {
    let Some(table) = document.lookup_table(o.scope, &o.silent_onsets) else {
        debug!(from = o.from, to = o.to, "no performed onsets, tempo skipped");
        return None;
    };
    let (from, to) = (o.from as f64, o.to as f64);

    let start_bpm = if o.continue_previous {
        document
            .mpm
            .map(o.scope)
            .and_then(|map| map.tempo_before(from))
            .map(Tempo::end_bpm)
    } else {
        None
    };

    let Some(curve) = approximate(&table, from, to, document.pulses_per_quarter(), o.beat_length, start_bpm) else {
        debug!(from, to, "tempo span cannot be approximated");
        return None;
    };

    let instruction = curve.to_instruction(ids.next());
    let map = document.mpm.map_mut(o.scope);
    map.tempo.retain(|t| t.date < from || t.date >= to);
    insert_sorted(&mut map.tempo, instruction.clone());
    Some(instruction)
}

fn apply_dynamics(o: &DynamicsOptions, document: &mut Document, ids: &mut IdSource) {
    let map = document.mpm.map_mut(o.scope);
    let dates: Vec<f64> = std::iter::once(o.date).chain(o.end_date).collect();
    map.dynamics.retain(|d| !dates.contains(&d.date));

    insert_sorted(
        &mut map.dynamics,
        Dynamics {
            id: ids.next(),
            date: o.date,
            volume: o.volume,
            transition_to: o.transition_to,
        },
    );
    if let (Some(end), Some(volume)) = (o.end_date, o.transition_to) {
        insert_sorted(
            &mut map.dynamics,
            Dynamics {
                id: ids.next(),
                date: end,
                volume,
                transition_to: None,
            },
        );
    }
}

fn apply_rubato(o: &RubatoOptions, document: &mut Document, ids: &mut IdSource) {
    if o.to <= o.from {
        return;
    }
    let map = document.mpm.map_mut(o.scope);
    map.rubato.retain(|r| r.date != o.from);
    insert_sorted(
        &mut map.rubato,
        Rubato {
            id: ids.next(),
            date: o.from,
            frame_length: o.to - o.from,
            intensity: o.intensity,
            late_start: o.late_start,
            early_end: o.early_end,
        },
    );
}

fn apply_pedal(o: &PedalOptions, document: &mut Document, ids: &mut IdSource) {
    if o.to <= o.from {
        return;
    }
    let map = document.mpm.map_mut(o.scope);
    map.movement
        .retain(|m| m.controller != SUSTAIN_CONTROLLER || (m.date != o.from && m.date != o.to));
    for (date, position) in [(o.from, 1.0), (o.to, 0.0)] {
        insert_sorted(
            &mut map.movement,
            Movement {
                id: ids.next(),
                date,
                controller: SUSTAIN_CONTROLLER.to_string(),
                position,
            },
        );
    }
}

fn apply_accentuation(o: &AccentuationOptions, document: &mut Document, ids: &mut IdSource) {
    if o.to <= o.from {
        return;
    }
    let map = document.mpm.map_mut(o.scope);
    map.accentuation.retain(|a| a.date < o.from || a.date >= o.to);
    insert_sorted(
        &mut map.accentuation,
        Accentuation {
            id: ids.next(),
            date: o.from,
            name_ref: o.pattern.clone(),
            scale: o.scale,
            length: o.to - o.from,
        },
    );
}

fn apply_articulation(o: &ArticulationOptions, document: &mut Document, ids: &mut IdSource) {
    for note_id in &o.note_ids {
        // Stale ids (notes removed by an earlier edit) are skipped
        let Some(note) = document.msm.note(note_id).filter(|n| o.scope.covers_part(n.part)) else {
            debug!(note_id = %note_id, "articulation target not found");
            continue;
        };
        let date = note.date as f64;
        let map = document.mpm.map_mut(o.scope);
        map.articulation.retain(|a| a.note_id != *note_id);
        insert_sorted(
            &mut map.articulation,
            Articulation {
                id: ids.next(),
                date,
                note_id: note_id.clone(),
                relative_duration: o.relative_duration,
                relative_velocity: o.relative_velocity,
            },
        );
    }
}

fn apply_ornament(o: &OrnamentOptions, document: &mut Document, ids: &mut IdSource) {
    let note_ids: Vec<String> = o
        .note_ids
        .iter()
        .filter(|id| document.msm.note(id).is_some())
        .cloned()
        .collect();
    let map = document.mpm.map_mut(o.scope);
    insert_sorted(
        &mut map.ornamentation,
        Ornament {
            id: ids.next(),
            date: o.date,
            name_ref: o.name.clone(),
            note_ids,
        },
    );
}
