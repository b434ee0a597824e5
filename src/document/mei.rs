//! Performance timing carried by an MEI transcription and its transfer onto MSM notes
//!
//! The recording section of the MEI lists `<when>` elements pointing at notes:
//!
//! ```xml
//! <recording>
//!   <when xml:id="w1" absolute="1520.5" data="#n1 #n2"/>
//!   <when xml:id="w2" absolute="1900" data="#n1" type="offset"/>
//! </recording>
//! ```
//!
//! `absolute` is in milliseconds. A `when` without `type` (or with
//! `type="onset"`) marks onsets. Note velocities come from `note/@vel`.

use std::collections::{BTreeMap, HashMap};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

use super::msm::Msm;
use super::xml::{attributes, parse_f64, strip_ref};
use crate::error::{EditorError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceTimings {
    /// Note id -> onset seconds
    pub onsets: BTreeMap<String, f64>,
    /// Note id -> release seconds
    pub offsets: BTreeMap<String, f64>,
    /// Note id -> MIDI velocity
    pub velocities: BTreeMap<String, f64>,
}

impl PerformanceTimings {
    /// Extract timings from MEI. Elements missing attributes are skipped.
    pub fn parse(mei: &str) -> Result<Self> {
        let mut reader = Reader::from_str(mei);
        reader.trim_text(true);

        let mut timings = PerformanceTimings::default();
        let mut skipped = 0usize;

        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                    b"when" => {
                        let attrs = attributes(&e)?;
                        let (Some(ms), Some(data)) = (parse_f64(&attrs, "absolute"), attrs.get("data")) else {
                            skipped += 1;
                            continue;
                        };
                        let seconds = ms / 1000.0;
                        let target = match attrs.get("type").map(String::as_str) {
                            Some("offset") => &mut timings.offsets,
                            _ => &mut timings.onsets,
                        };
                        for reference in data.split_whitespace() {
                            target.entry(strip_ref(reference).to_string()).or_insert(seconds);
                        }
                    }
                    b"note" => {
                        let attrs = attributes(&e)?;
                        if let (Some(id), Some(vel)) = (attrs.get("xml:id"), parse_f64(&attrs, "vel")) {
                            timings.velocities.insert(id.clone(), vel);
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if skipped > 0 {
            warn!(skipped, "skipped <when> elements without absolute or data");
        }
        Ok(timings)
    }
}

/// Copy performed timing onto matching MSM notes and resolve duplicate onsets.
///
/// Two notes of the same part sharing date and pitch are one performed event
/// transcribed twice. The longer one is kept; any performance data it lacks is
/// taken over from the discarded note. Returns the number of notes removed.
pub fn enrich(msm: &mut Msm, timings: &PerformanceTimings) -> usize {
    for note in &mut msm.notes {
        if let Some(onset) = timings.onsets.get(&note.id) {
            note.onset = Some(*onset);
        }
        if let Some(offset) = timings.offsets.get(&note.id) {
            note.offset = Some(*offset);
        }
        if let Some(velocity) = timings.velocities.get(&note.id) {
            note.velocity = Some(*velocity);
        }
    }

    let mut survivors: HashMap<(u32, u64, u8), usize> = HashMap::new();
    let mut discard = vec![false; msm.notes.len()];

    for idx in 0..msm.notes.len() {
        let key = (msm.notes[idx].part, msm.notes[idx].date, msm.notes[idx].pitch);
        let Some(&kept) = survivors.get(&key) else {
            survivors.insert(key, idx);
            continue;
        };

        // Keep the longer note; on equal duration the earlier one stays
        let (winner, loser) = if msm.notes[idx].duration > msm.notes[kept].duration {
            (idx, kept)
        } else {
            (kept, idx)
        };
        warn!(
            kept = %msm.notes[winner].id,
            dropped = %msm.notes[loser].id,
            date = msm.notes[winner].date,
            "duplicate note onset"
        );

        let dropped = msm.notes[loser].clone();
        let survivor = &mut msm.notes[winner];
        survivor.onset = survivor.onset.or(dropped.onset);
        survivor.offset = survivor.offset.or(dropped.offset);
        survivor.velocity = survivor.velocity.or(dropped.velocity);

        discard[loser] = true;
        survivors.insert(key, winner);
    }

    let before = msm.notes.len();
    let mut idx = 0;
    msm.notes.retain(|_| {
        let keep = !discard[idx];
        idx += 1;
        keep
    });
    let removed = before - msm.notes.len();
    debug!(removed, notes = msm.notes.len(), "enriched MSM with performance timings");
    removed
}

/// `type` of the `<dir>` elements written for transformers.
pub const ANNOTATION_TYPE: &str = "transformer";

/// A performance annotation placed in the measure of its start note.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: String,
    /// Note the `<dir>` is attached to (`startid`)
    pub start_note: String,
    /// Performance elements the annotation stands for
    pub corresp: Vec<String>,
    pub label: String,
    pub text: String,
}

/// Rewrite `mei` with `annotations` as `<dir type="transformer">` elements.
///
/// Annotations written by an earlier export are removed first, so annotating
/// twice yields the same document. Annotations whose start note is not in any
/// measure are dropped.
pub fn annotate(mei: &str, annotations: &[Annotation]) -> Result<String> {
    let measures = note_measures(mei)?;
    let mut by_measure: BTreeMap<usize, Vec<&Annotation>> = BTreeMap::new();
    for annotation in annotations {
        match measures.get(&annotation.start_note) {
            Some(&measure) => by_measure.entry(measure).or_default().push(annotation),
            None => debug!(note = %annotation.start_note, "annotation anchor not found"),
        }
    }

    let mut reader = Reader::from_str(mei);
    let mut writer = Writer::new(Vec::new());
    let mut measure_count = 0usize;
    let mut current: Option<usize> = None;
    let mut skip_depth = 0usize;

    loop {
        let event = reader.read_event()?;
        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }
        let annotation_dir = match &event {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"dir" => is_annotation(e)?,
            _ => false,
        };
        if annotation_dir {
            if matches!(event, Event::Start(_)) {
                skip_depth = 1;
            }
            continue;
        }
        match &event {
            Event::Start(e) if e.name().as_ref() == b"measure" => {
                current = Some(measure_count);
                measure_count += 1;
            }
            Event::Empty(e) if e.name().as_ref() == b"measure" => measure_count += 1,
            Event::End(e) if e.name().as_ref() == b"measure" => {
                for annotation in current.and_then(|m| by_measure.get(&m)).into_iter().flatten() {
                    write_dir(&mut writer, annotation)?;
                }
                current = None;
            }
            Event::Eof => break,
            _ => {}
        }
        writer.write_event(event)?;
    }

    String::from_utf8(writer.into_inner()).map_err(|e| EditorError::InvalidDocument(e.to_string()))
}

/// `mei` without transformer annotations.
pub fn strip_annotations(mei: &str) -> Result<String> {
    annotate(mei, &[])
}

fn is_annotation(element: &BytesStart) -> Result<bool> {
    Ok(attributes(element)?.get("type").map(String::as_str) == Some(ANNOTATION_TYPE))
}

/// Note id -> index of the measure containing it.
fn note_measures(mei: &str) -> Result<HashMap<String, usize>> {
    let mut reader = Reader::from_str(mei);
    let mut measures = HashMap::new();
    let mut measure_count = 0usize;
    let mut current: Option<usize> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == b"measure" => {
                current = Some(measure_count);
                measure_count += 1;
            }
            Event::Empty(e) if e.name().as_ref() == b"measure" => measure_count += 1,
            Event::End(e) if e.name().as_ref() == b"measure" => current = None,
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"note" => {
                if let (Some(measure), Some(id)) = (current, attributes(&e)?.remove("xml:id")) {
                    measures.insert(id, measure);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(measures)
}

fn write_dir(writer: &mut Writer<Vec<u8>>, annotation: &Annotation) -> Result<()> {
    let start_id = format!("#{}", annotation.start_note);
    let corresp = annotation
        .corresp
        .iter()
        .map(|id| format!("#{}", id))
        .collect::<Vec<_>>()
        .join(" ");
    let mut dir = BytesStart::new("dir");
    dir.push_attribute(("xml:id", annotation.id.as_str()));
    dir.push_attribute(("type", ANNOTATION_TYPE));
    dir.push_attribute(("label", annotation.label.as_str()));
    dir.push_attribute(("startid", start_id.as_str()));
    if !corresp.is_empty() {
        dir.push_attribute(("corresp", corresp.as_str()));
    }
    writer.write_event(Event::Start(dir))?;
    writer.write_event(Event::Text(BytesText::new(&annotation.text)))?;
    writer.write_event(Event::End(BytesEnd::new("dir")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::msm::MsmNote;

    fn note(id: &str, date: u64, duration: u64, pitch: u8) -> MsmNote {
        MsmNote {
            id: id.to_string(),
            part: 1,
            date,
            duration,
            pitch,
            velocity: None,
            onset: None,
            offset: None,
        }
    }

    const MEI: &str = r##"<mei>
  <music><body><mdiv><score><section><measure>
    <staff><layer>
      <note xml:id="n1" pname="c" oct="4" vel="64"/>
      <note xml:id="n2" pname="d" oct="4"/>
      <note xml:id="n3" pname="d" oct="4" vel="50"/>
    </layer></staff>
  </measure></section></score></mdiv></body></music>
  <performance><recording>
    <when xml:id="w1" absolute="0" data="#n1"/>
    <when xml:id="w2" absolute="500" data="#n2 #n3"/>
    <when xml:id="w3" absolute="480" data="#n1" type="offset"/>
    <when xml:id="w4" data="#n3"/>
  </recording></performance>
</mei>"##;

    #[test]
    fn test_parse_timings() {
        let timings = PerformanceTimings::parse(MEI).unwrap();
        assert_eq!(timings.onsets.get("n1"), Some(&0.0));
        assert_eq!(timings.onsets.get("n3"), Some(&0.5));
        assert_eq!(timings.offsets.get("n1"), Some(&0.48));
        assert_eq!(timings.velocities.get("n1"), Some(&64.0));
        assert!(timings.velocities.get("n2").is_none());
    }

    #[test]
    fn test_enrich_copies_timing() {
        let mut msm = Msm::default();
        msm.notes = vec![note("n1", 0, 720, 60), note("missing", 720, 720, 67)];
        let timings = PerformanceTimings::parse(MEI).unwrap();
        assert_eq!(enrich(&mut msm, &timings), 0);
        assert_eq!(msm.notes[0].onset, Some(0.0));
        assert_eq!(msm.notes[0].offset, Some(0.48));
        assert_eq!(msm.notes[1].onset, None);
    }

    #[test]
    fn test_duplicate_onset_keeps_longer_note() {
        let mut msm = Msm::default();
        msm.notes = vec![note("n2", 720, 360, 62), note("n3", 720, 720, 62)];
        let mut timings = PerformanceTimings::default();
        timings.onsets.insert("n2".to_string(), 0.5);
        timings.velocities.insert("n2".to_string(), 70.0);

        assert_eq!(enrich(&mut msm, &timings), 1);
        assert_eq!(msm.notes.len(), 1);
        let survivor = &msm.notes[0];
        assert_eq!(survivor.id, "n3");
        // Performance data moved over from the discarded note
        assert_eq!(survivor.onset, Some(0.5));
        assert_eq!(survivor.velocity, Some(70.0));
    }

    #[test]
    fn test_different_parts_are_not_duplicates() {
        let mut msm = Msm::default();
        let mut other = note("v1", 0, 720, 60);
        other.part = 2;
        msm.notes = vec![note("n1", 0, 720, 60), other];
        assert_eq!(enrich(&mut msm, &PerformanceTimings::default()), 0);
        assert_eq!(msm.notes.len(), 2);
    }

    #[test]
    fn test_annotate_places_dir_in_measure_of_start_note() {
        let annotation = Annotation {
            id: "dir_t1".to_string(),
            start_note: "n2".to_string(),
            corresp: vec!["t1_0".to_string(), "t1_1".to_string()],
            label: "InsertPedal".to_string(),
            text: "pedal & more".to_string(),
        };
        let annotated = annotate(MEI, &[annotation]).unwrap();
        let dir = annotated.find("<dir ").unwrap();
        assert!(dir < annotated.find("</measure>").unwrap());
        assert!(annotated.contains(r##"corresp="#t1_0 #t1_1""##));
        assert!(annotated.contains("pedal &amp; more"));

        // Re-annotating replaces, stripping restores the input
        assert_eq!(annotate(&annotated, &[]).unwrap(), MEI);
        assert_eq!(strip_annotations(&annotated).unwrap(), MEI);
    }

    #[test]
    fn test_annotate_drops_unknown_anchor() {
        let annotation = Annotation {
            id: "dir_t9".to_string(),
            start_note: "gone".to_string(),
            corresp: Vec::new(),
            label: "InsertRubato".to_string(),
            text: String::new(),
        };
        assert_eq!(annotate(MEI, &[annotation]).unwrap(), MEI);
    }
}
