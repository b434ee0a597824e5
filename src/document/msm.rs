//! Musical sequence markup (MSM): the symbolic note list with performed timing

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::xml::{attributes, parse_f64, parse_ticks, XmlOut};
use super::Scope;
use crate::error::Result;
use crate::timemap::TimePair;

pub const DEFAULT_PULSES_PER_QUARTER: u32 = 720;

/// A single note with its notated position and, once enriched from the MEI
/// recording data, its performed timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsmNote {
    pub id: String,
    pub part: u32,
    /// Notated date in ticks
    pub date: u64,
    /// Notated duration in ticks
    pub duration: u64,
    pub pitch: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    /// Performed onset in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onset: Option<f64>,
    /// Performed release in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsmPart {
    pub number: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Msm {
    pub title: String,
    pub pulses_per_quarter: u32,
    pub parts: Vec<MsmPart>,
    pub notes: Vec<MsmNote>,
}

impl Default for Msm {
    fn default() -> Self {
        Self {
            title: String::new(),
            pulses_per_quarter: DEFAULT_PULSES_PER_QUARTER,
            parts: Vec::new(),
            notes: Vec::new(),
        }
    }
}

impl Msm {
    /// Parse MSM as returned by the conversion backend.
    pub fn parse(xml: &str) -> Result<Self> {
        Self::parse_with_resolution(xml, DEFAULT_PULSES_PER_QUARTER)
    }

    /// Parse MSM, using `fallback_ppq` when the document declares no
    /// `pulsesPerQuarter`.
    ///
    /// Notes missing `xml:id`, `date` or `midi.pitch` are skipped with a
    /// warning rather than failing the whole import.
    pub fn parse_with_resolution(xml: &str, fallback_ppq: u32) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut msm = Msm {
            pulses_per_quarter: fallback_ppq,
            ..Msm::default()
        };
        let mut current_part: u32 = 0;
        let mut skipped = 0usize;

        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                    b"msm" => {
                        let attrs = attributes(&e)?;
                        if let Some(title) = attrs.get("title") {
                            msm.title = title.clone();
                        }
                        if let Some(ppq) = parse_ticks(&attrs, "pulsesPerQuarter").filter(|p| *p > 0) {
                            msm.pulses_per_quarter = ppq as u32;
                        }
                    }
                    b"part" => {
                        let attrs = attributes(&e)?;
                        current_part = parse_ticks(&attrs, "number").unwrap_or(msm.parts.len() as u64 + 1) as u32;
                        msm.parts.push(MsmPart {
                            number: current_part,
                            name: attrs.get("name").cloned().unwrap_or_default(),
                        });
                    }
                    b"note" => {
                        let attrs = attributes(&e)?;
                        let id = attrs.get("xml:id").cloned();
                        let date = parse_ticks(&attrs, "date");
                        let pitch = parse_f64(&attrs, "midi.pitch").map(|p| p.round().clamp(0.0, 127.0) as u8);
                        match (id, date, pitch) {
                            (Some(id), Some(date), Some(pitch)) => msm.notes.push(MsmNote {
                                id,
                                part: current_part,
                                date,
                                duration: parse_ticks(&attrs, "duration").unwrap_or(0),
                                pitch,
                                velocity: parse_f64(&attrs, "velocity"),
                                onset: parse_f64(&attrs, "onset"),
                                offset: parse_f64(&attrs, "offset"),
                            }),
                            _ => skipped += 1,
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if skipped > 0 {
            warn!(skipped, "skipped MSM notes missing xml:id, date or midi.pitch");
        }
        Ok(msm)
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut out = XmlOut::new()?;
        out.open(
            "msm",
            &[
                ("title", self.title.clone()),
                ("pulsesPerQuarter", self.pulses_per_quarter.to_string()),
            ],
        )?;

        for part in self.part_numbers() {
            let name = self
                .parts
                .iter()
                .find(|p| p.number == part)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            out.open("part", &[("name", name), ("number", part.to_string())])?;
            out.open("dated", &[])?;
            out.open("score", &[])?;
            for note in self.notes.iter().filter(|n| n.part == part) {
                let mut attrs = vec![
                    ("xml:id", note.id.clone()),
                    ("date", note.date.to_string()),
                    ("duration", note.duration.to_string()),
                    ("midi.pitch", note.pitch.to_string()),
                ];
                if let Some(velocity) = note.velocity {
                    attrs.push(("velocity", velocity.to_string()));
                }
                if let Some(onset) = note.onset {
                    attrs.push(("onset", onset.to_string()));
                }
                if let Some(offset) = note.offset {
                    attrs.push(("offset", offset.to_string()));
                }
                out.empty("note", &attrs)?;
            }
            out.close("score")?;
            out.close("dated")?;
            out.close("part")?;
        }

        out.close("msm")?;
        out.finish()
    }

    /// Declared parts plus any part number only referenced by notes, ascending.
    pub fn part_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self
            .parts
            .iter()
            .map(|p| p.number)
            .chain(self.notes.iter().map(|n| n.part))
            .collect();
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }

    pub fn note(&self, id: &str) -> Option<&MsmNote> {
        self.notes.iter().find(|n| n.id == id)
    }

    pub fn notes_in(&self, scope: Scope) -> impl Iterator<Item = &MsmNote> + '_ {
        self.notes.iter().filter(move |n| scope.covers_part(n.part))
    }

    /// `(date, onset)` pairs of every performed note in scope, in document order.
    pub fn time_pairs(&self, scope: Scope) -> Vec<TimePair> {
        self.notes_in(scope)
            .filter_map(|n| n.onset.map(|onset| (n.date as f64, onset)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<msm title="Etude" pulsesPerQuarter="480">
  <part name="Piano" number="1">
    <dated>
      <score>
        <note xml:id="n1" date="0.0" duration="480" midi.pitch="60"/>
        <note xml:id="n2" date="480" duration="480" midi.pitch="62" onset="0.52" velocity="70"/>
        <note date="960" duration="480" midi.pitch="64"/>
      </score>
    </dated>
  </part>
  <part name="Violin" number="2">
    <dated>
      <score>
        <note xml:id="v1" date="0" duration="960" midi.pitch="76" onset="0.01"/>
      </score>
    </dated>
  </part>
</msm>"#;

    #[test]
    fn test_parse_sample() {
        let msm = Msm::parse(SAMPLE).unwrap();
        assert_eq!(msm.title, "Etude");
        assert_eq!(msm.pulses_per_quarter, 480);
        assert_eq!(msm.parts.len(), 2);
        // Third piano note has no xml:id and is skipped
        assert_eq!(msm.notes.len(), 3);
        assert_eq!(msm.note("n2").unwrap().onset, Some(0.52));
        assert_eq!(msm.note("n2").unwrap().velocity, Some(70.0));
        assert_eq!(msm.note("v1").unwrap().part, 2);
    }

    #[test]
    fn test_fallback_resolution() {
        let msm = Msm::parse_with_resolution("<msm><part number=\"1\"/></msm>", 960).unwrap();
        assert_eq!(msm.pulses_per_quarter, 960);
    }

    #[test]
    fn test_time_pairs_by_scope() {
        let msm = Msm::parse(SAMPLE).unwrap();
        assert_eq!(msm.time_pairs(Scope::Global), vec![(480.0, 0.52), (0.0, 0.01)]);
        assert_eq!(msm.time_pairs(Scope::Part(2)), vec![(0.0, 0.01)]);
    }

    #[test]
    fn test_xml_survives_reparse() {
        let msm = Msm::parse(SAMPLE).unwrap();
        let xml = msm.to_xml().unwrap();
        assert_eq!(Msm::parse(&xml).unwrap(), msm);
    }
}
