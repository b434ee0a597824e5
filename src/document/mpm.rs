//! Music performance markup (MPM): dated performance instructions

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::xml::XmlOut;
use super::Scope;
use crate::error::Result;

pub const MPM_NAMESPACE: &str = "http://www.cemfi.de/mpm/ns/1.0";

/// Common accessors of every dated instruction.
pub trait Instruction {
    fn id(&self) -> &str;
    fn date(&self) -> f64;
}

macro_rules! instruction {
    ($($ty:ty),* $(,)?) => {
        $(impl Instruction for $ty {
            fn id(&self) -> &str {
                &self.id
            }

            fn date(&self) -> f64 {
                self.date
            }
        })*
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tempo {
    pub id: String,
    pub date: f64,
    pub bpm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_tempo_at: Option<f64>,
    /// Beat unit in whole notes (0.25 = quarter)
    pub beat_length: f64,
}

impl Tempo {
    /// Tempo reached at the end of this instruction's span.
    pub fn end_bpm(&self) -> f64 {
        self.transition_to.unwrap_or(self.bpm)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dynamics {
    pub id: String,
    pub date: f64,
    pub volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_to: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rubato {
    pub id: String,
    pub date: f64,
    pub frame_length: f64,
    pub intensity: f64,
    pub late_start: f64,
    pub early_end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Articulation {
    pub id: String,
    pub date: f64,
    pub note_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_velocity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ornament {
    pub id: String,
    pub date: f64,
    pub name_ref: String,
    #[serde(default)]
    pub note_ids: Vec<String>,
}

/// Controller movement; sustain pedalling is `controller = "sustain"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: String,
    pub date: f64,
    pub controller: String,
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accentuation {
    pub id: String,
    pub date: f64,
    pub name_ref: String,
    pub scale: f64,
    /// Span of the pattern in ticks
    pub length: f64,
}

instruction!(Tempo, Dynamics, Rubato, Articulation, Ornament, Movement, Accentuation);

/// The dated maps of one scope (global or a single part).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dated {
    pub tempo: Vec<Tempo>,
    pub dynamics: Vec<Dynamics>,
    pub rubato: Vec<Rubato>,
    pub articulation: Vec<Articulation>,
    pub ornamentation: Vec<Ornament>,
    pub movement: Vec<Movement>,
    pub accentuation: Vec<Accentuation>,
}

/// Insert keeping the list ordered by date; equal dates keep insertion order.
pub fn insert_sorted<T: Instruction>(list: &mut Vec<T>, item: T) {
    let idx = list.partition_point(|x| x.date() <= item.date());
    list.insert(idx, item);
}

impl Dated {
    pub fn is_empty(&self) -> bool {
        self.tempo.is_empty()
            && self.dynamics.is_empty()
            && self.rubato.is_empty()
            && self.articulation.is_empty()
            && self.ornamentation.is_empty()
            && self.movement.is_empty()
            && self.accentuation.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        fn ids_of<T: Instruction>(list: &[T]) -> impl Iterator<Item = &str> + '_ {
            list.iter().map(|i| i.id())
        }
        ids_of(&self.tempo)
            .chain(ids_of(&self.dynamics))
            .chain(ids_of(&self.rubato))
            .chain(ids_of(&self.articulation))
            .chain(ids_of(&self.ornamentation))
            .chain(ids_of(&self.movement))
            .chain(ids_of(&self.accentuation))
    }

    /// Last tempo instruction dated strictly before `date`.
    pub fn tempo_before(&self, date: f64) -> Option<&Tempo> {
        self.tempo.iter().rev().find(|t| t.date < date)
    }

    fn write(&self, out: &mut XmlOut) -> Result<()> {
        out.open("dated", &[])?;

        if !self.tempo.is_empty() {
            out.open("tempoMap", &[])?;
            for t in &self.tempo {
                let mut attrs = vec![
                    ("xml:id", t.id.clone()),
                    ("date", t.date.to_string()),
                    ("bpm", t.bpm.to_string()),
                ];
                if let Some(to) = t.transition_to {
                    attrs.push(("transition.to", to.to_string()));
                }
                if let Some(at) = t.mean_tempo_at {
                    attrs.push(("meanTempoAt", at.to_string()));
                }
                attrs.push(("beatLength", t.beat_length.to_string()));
                out.empty("tempo", &attrs)?;
            }
            out.close("tempoMap")?;
        }

        if !self.dynamics.is_empty() {
            out.open("dynamicsMap", &[])?;
            for d in &self.dynamics {
                let mut attrs = vec![
                    ("xml:id", d.id.clone()),
                    ("date", d.date.to_string()),
                    ("volume", d.volume.to_string()),
                ];
                if let Some(to) = d.transition_to {
                    attrs.push(("transition.to", to.to_string()));
                }
                out.empty("dynamics", &attrs)?;
            }
            out.close("dynamicsMap")?;
        }

        if !self.rubato.is_empty() {
            out.open("rubatoMap", &[])?;
            for r in &self.rubato {
                out.empty(
                    "rubato",
                    &[
                        ("xml:id", r.id.clone()),
                        ("date", r.date.to_string()),
                        ("frameLength", r.frame_length.to_string()),
                        ("intensity", r.intensity.to_string()),
                        ("lateStart", r.late_start.to_string()),
                        ("earlyEnd", r.early_end.to_string()),
                    ],
                )?;
            }
            out.close("rubatoMap")?;
        }

        if !self.articulation.is_empty() {
            out.open("articulationMap", &[])?;
            for a in &self.articulation {
                let mut attrs = vec![
                    ("xml:id", a.id.clone()),
                    ("date", a.date.to_string()),
                    ("noteid", format!("#{}", a.note_id)),
                ];
                if let Some(duration) = a.relative_duration {
                    attrs.push(("relativeDuration", duration.to_string()));
                }
                if let Some(velocity) = a.relative_velocity {
                    attrs.push(("relativeVelocity", velocity.to_string()));
                }
                out.empty("articulation", &attrs)?;
            }
            out.close("articulationMap")?;
        }

        if !self.ornamentation.is_empty() {
            out.open("ornamentationMap", &[])?;
            for o in &self.ornamentation {
                let mut attrs = vec![
                    ("xml:id", o.id.clone()),
                    ("date", o.date.to_string()),
                    ("name.ref", o.name_ref.clone()),
                ];
                if !o.note_ids.is_empty() {
                    let order: Vec<String> = o.note_ids.iter().map(|id| format!("#{}", id)).collect();
                    attrs.push(("noteOrder", order.join(" ")));
                }
                out.empty("ornament", &attrs)?;
            }
            out.close("ornamentationMap")?;
        }

        if !self.movement.is_empty() {
            out.open("movementMap", &[])?;
            for m in &self.movement {
                out.empty(
                    "movement",
                    &[
                        ("xml:id", m.id.clone()),
                        ("date", m.date.to_string()),
                        ("controller", m.controller.clone()),
                        ("position", m.position.to_string()),
                    ],
                )?;
            }
            out.close("movementMap")?;
        }

        if !self.accentuation.is_empty() {
            out.open("metricalAccentuationMap", &[])?;
            for a in &self.accentuation {
                out.empty(
                    "accentuationPattern",
                    &[
                        ("xml:id", a.id.clone()),
                        ("date", a.date.to_string()),
                        ("name.ref", a.name_ref.clone()),
                        ("scale", a.scale.to_string()),
                        ("length", a.length.to_string()),
                    ],
                )?;
            }
            out.close("metricalAccentuationMap")?;
        }

        out.close("dated")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mpm {
    pub global: Dated,
    pub parts: BTreeMap<u32, Dated>,
}

impl Mpm {
    pub fn map(&self, scope: Scope) -> Option<&Dated> {
        match scope {
            Scope::Global => Some(&self.global),
            Scope::Part(n) => self.parts.get(&n),
        }
    }

    /// Dated maps of `scope`, creating an empty part on first use.
    pub fn map_mut(&mut self, scope: Scope) -> &mut Dated {
        match scope {
            Scope::Global => &mut self.global,
            Scope::Part(n) => self.parts.entry(n).or_default(),
        }
    }

    pub fn element_ids(&self) -> BTreeSet<String> {
        self.global
            .ids()
            .chain(self.parts.values().flat_map(|d| d.ids()))
            .map(str::to_string)
            .collect()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.global.ids().any(|i| i == id) || self.parts.values().any(|d| d.ids().any(|i| i == id))
    }

    /// Serialize to MPM XML. Output depends only on the instruction lists, so
    /// equal documents always produce identical bytes.
    pub fn to_xml(&self, pulses_per_quarter: u32) -> Result<String> {
        let mut out = XmlOut::new()?;
        out.open("mpm", &[("xmlns", MPM_NAMESPACE.to_string())])?;
        out.open(
            "performance",
            &[
                ("name", "performance".to_string()),
                ("pulsesPerQuarter", pulses_per_quarter.to_string()),
            ],
        )?;

        out.open("global", &[])?;
        self.global.write(&mut out)?;
        out.close("global")?;

        for (number, dated) in &self.parts {
            out.open(
                "part",
                &[
                    ("name", format!("part {}", number)),
                    ("number", number.to_string()),
                    ("midi.channel", number.saturating_sub(1).min(15).to_string()),
                    ("midi.port", "0".to_string()),
                ],
            )?;
            dated.write(&mut out)?;
            out.close("part")?;
        }

        out.close("performance")?;
        out.close("mpm")?;
        out.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempo(id: &str, date: f64, bpm: f64) -> Tempo {
        Tempo {
            id: id.to_string(),
            date,
            bpm,
            transition_to: None,
            mean_tempo_at: None,
            beat_length: 0.25,
        }
    }

    #[test]
    fn test_insert_sorted_keeps_insertion_order_on_ties() {
        let mut list = Vec::new();
        insert_sorted(&mut list, tempo("b", 720.0, 60.0));
        insert_sorted(&mut list, tempo("a", 0.0, 60.0));
        insert_sorted(&mut list, tempo("c", 720.0, 70.0));
        let ids: Vec<&str> = list.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_tempo_before() {
        let mut dated = Dated::default();
        insert_sorted(&mut dated.tempo, tempo("a", 0.0, 60.0));
        insert_sorted(&mut dated.tempo, tempo("b", 720.0, 80.0));
        assert_eq!(dated.tempo_before(720.0).unwrap().id, "a");
        assert_eq!(dated.tempo_before(721.0).unwrap().id, "b");
        assert!(dated.tempo_before(0.0).is_none());
    }

    #[test]
    fn test_map_mut_creates_part() {
        let mut mpm = Mpm::default();
        mpm.map_mut(Scope::Part(3)).tempo.push(tempo("t", 0.0, 90.0));
        assert!(mpm.map(Scope::Part(3)).is_some());
        assert!(mpm.contains_id("t"));
        assert!(!mpm.contains_id("x"));
        assert_eq!(mpm.element_ids().len(), 1);
    }

    #[test]
    fn test_to_xml_structure() {
        let mut mpm = Mpm::default();
        let mut t = tempo("t1", 0.0, 72.5);
        t.transition_to = Some(80.0);
        t.mean_tempo_at = Some(0.4);
        mpm.global.tempo.push(t);
        mpm.map_mut(Scope::Part(1)).articulation.push(Articulation {
            id: "a1".to_string(),
            date: 720.0,
            note_id: "n3".to_string(),
            relative_duration: Some(0.5),
            relative_velocity: None,
        });
        let xml = mpm.to_xml(720).unwrap();
        assert!(xml.contains(r#"<tempo xml:id="t1" date="0" bpm="72.5" transition.to="80" meanTempoAt="0.4" beatLength="0.25"/>"#));
        assert!(xml.contains(r##"noteid="#n3""##));
        assert!(xml.contains(r#"pulsesPerQuarter="720""#));
        assert!(!xml.contains("dynamicsMap"));
    }
}
