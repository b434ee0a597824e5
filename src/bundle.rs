//! Import and export of saved work
//!
//! A bundle is a zip archive with three entries:
//! - `performance.mpm` - the MPM produced by the history
//! - `transcription.mei` - the MEI with one `<dir>` per transformer
//! - `info.json` - base snapshot, history, argumentations and desk state
//!
//! The history is the source of truth. On import the document is rebuilt by
//! replaying `info.json` onto its base snapshot; `performance.mpm` is only
//! compared against the result. A bare `.json` file is an `info.json` alone.

use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::argumentation::Argumentation;
use crate::document::mei::{annotate, strip_annotations, Annotation};
use crate::document::mpm::MPM_NAMESPACE;
use crate::document::{Document, Scope};
use crate::error::{EditorError, Result};
use crate::tempo::TempoDesk;
use crate::timemap::TimePair;
use crate::transformer::{Target, Transformer, TransformerStack};

pub const MPM_ENTRY: &str = "performance.mpm";
pub const MEI_ENTRY: &str = "transcription.mei";
pub const INFO_ENTRY: &str = "info.json";
pub const INFO_TYPE: &str = "EditorState";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

fn default_context() -> String {
    MPM_NAMESPACE.to_string()
}

fn default_type() -> String {
    INFO_TYPE.to_string()
}

/// Contents of `info.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    #[serde(rename = "@context", default = "default_context")]
    pub context: String,
    #[serde(rename = "@type", default = "default_type")]
    pub kind: String,
    /// Imported snapshot the history replays onto
    pub base: Document,
    #[serde(default)]
    pub transformers: Vec<Transformer>,
    #[serde(default)]
    pub argumentations: Vec<Argumentation>,
    #[serde(default)]
    pub silent_onsets: Vec<TimePair>,
    #[serde(default)]
    pub tempo: TempoDesk,
}

impl Info {
    pub fn new(stack: &TransformerStack, silent_onsets: &[TimePair], tempo: &TempoDesk) -> Self {
        Self {
            context: default_context(),
            kind: default_type(),
            base: stack.base().clone(),
            transformers: stack.transformers().to_vec(),
            argumentations: stack.argumentations().cloned().collect(),
            silent_onsets: silent_onsets.to_vec(),
            tempo: tempo.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub mpm: Option<String>,
    pub mei: Option<String>,
    pub info: Info,
}

impl Bundle {
    /// Snapshot the session state; `mei` is the plain transcription.
    pub fn export(
        stack: &TransformerStack,
        mei: Option<&str>,
        silent_onsets: &[TimePair],
        tempo: &TempoDesk,
    ) -> Result<Self> {
        let mei = match mei {
            Some(mei) => Some(annotate(mei, &annotations(stack))?),
            None => None,
        };
        Ok(Self {
            mpm: Some(stack.document().mpm_xml()?),
            mei,
            info: Info::new(stack, silent_onsets, tempo),
        })
    }

    pub fn write_zip<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        if let Some(mpm) = &self.mpm {
            zip.start_file(MPM_ENTRY, options)?;
            zip.write_all(mpm.as_bytes())?;
        }
        if let Some(mei) = &self.mei {
            zip.start_file(MEI_ENTRY, options)?;
            zip.write_all(mei.as_bytes())?;
        }
        zip.start_file(INFO_ENTRY, options)?;
        zip.write_all(serde_json::to_string_pretty(&self.info)?.as_bytes())?;
        Ok(zip.finish()?)
    }

    pub fn to_zip_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.write_zip(Cursor::new(Vec::new()))?.into_inner())
    }

    pub fn read_zip<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let info = read_entry(&mut archive, INFO_ENTRY)?
            .ok_or_else(|| EditorError::InvalidBundle(format!("missing {}", INFO_ENTRY)))?;
        Ok(Self {
            mpm: read_entry(&mut archive, MPM_ENTRY)?,
            mei: read_entry(&mut archive, MEI_ENTRY)?,
            info: serde_json::from_str(&info)?,
        })
    }

    /// A bundle made of `info.json` alone.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self {
            mpm: None,
            mei: None,
            info: serde_json::from_str(json)?,
        })
    }

    /// Zip archive or bare JSON, told apart by content.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(ZIP_MAGIC) {
            return Self::read_zip(Cursor::new(bytes));
        }
        let json = std::str::from_utf8(bytes).map_err(|e| EditorError::InvalidBundle(e.to_string()))?;
        Self::from_json(json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bundle = Self::from_bytes(&fs::read(path)?)?;
        info!(
            path = %path.display(),
            transformers = bundle.info.transformers.len(),
            "loaded bundle"
        );
        Ok(bundle)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            fs::write(path, serde_json::to_string_pretty(&self.info)?)?;
        } else {
            fs::write(path, self.to_zip_bytes()?)?;
        }
        debug!(path = %path.display(), "saved bundle");
        Ok(())
    }

    /// Rebuild the history and its document from `info.json`.
    pub fn restore(&self) -> Result<TransformerStack> {
        let stack = TransformerStack::restore(
            self.info.base.clone(),
            self.info.transformers.clone(),
            self.info.argumentations.clone(),
        );
        if let Some(saved) = &self.mpm {
            if *saved != stack.document().mpm_xml()? {
                warn!("{} differs from the replayed history; using the replay", MPM_ENTRY);
            }
        }
        Ok(stack)
    }

    /// The transcription without the exported annotations.
    pub fn transcription(&self) -> Result<Option<String>> {
        self.mei.as_deref().map(strip_annotations).transpose()
    }
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(Some(content))
}

/// One `<dir>` per transformer, attached to the first note it concerns.
pub fn annotations(stack: &TransformerStack) -> Vec<Annotation> {
    stack
        .transformers()
        .iter()
        .filter_map(|t| {
            let start_note = anchor_note(stack.document(), t)?;
            let text = stack
                .argumentation(&t.argumentation)
                .map(|a| a.note.clone())
                .filter(|note| !note.is_empty())
                .unwrap_or_else(|| t.name().to_string());
            Some(Annotation {
                id: format!("dir_{}", t.id),
                start_note,
                corresp: t.created.iter().cloned().collect(),
                label: t.name().to_string(),
                text,
            })
        })
        .collect()
}

fn anchor_note(document: &Document, transformer: &Transformer) -> Option<String> {
    let scope: Scope = transformer.operation.scope();
    match transformer.operation.target() {
        Target::Notes { note_ids } => note_ids.into_iter().find(|id| document.msm.note(id).is_some()),
        target => {
            let (start, _) = target.span()?;
            document
                .msm
                .notes_in(scope)
                .filter(|n| n.date as f64 >= start)
                .min_by_key(|n| n.date)
                .map(|n| n.id.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argumentation::Motivation;
    use crate::document::{Msm, MsmNote};
    use crate::tempo::{Skyline, TempoSegment};
    use crate::transformer::{Operation, PedalOptions, TempoOptions};

    const MEI: &str = r#"<mei><music><body><mdiv><score><section>
<measure n="1"><staff><layer><note xml:id="n0"/><note xml:id="n1"/></layer></staff></measure>
<measure n="2"><staff><layer><note xml:id="n2"/><note xml:id="n3"/></layer></staff></measure>
</section></score></mdiv></body></music></mei>"#;

    fn stack() -> TransformerStack {
        let notes = (0..4)
            .map(|i| MsmNote {
                id: format!("n{}", i),
                part: 1,
                date: i * 720,
                duration: 720,
                pitch: 60,
                velocity: Some(60.0),
                onset: Some(i as f64 * 0.55),
                offset: None,
            })
            .collect();
        let mut stack = TransformerStack::new(Document::new(Msm {
            notes,
            ..Msm::default()
        }));
        stack.append(Operation::Tempo(TempoOptions {
            scope: Scope::Global,
            from: 0,
            to: 2160,
            beat_length: 0.25,
            continue_previous: false,
            silent_onsets: Vec::new(),
        }));
        let mut argumentation = stack.new_argumentation().with_motivation(Motivation::Move);
        argumentation.note = "lift before the cadence".to_string();
        stack.append_with(
            Operation::Pedal(PedalOptions {
                scope: Scope::Part(1),
                from: 1440.0,
                to: 2160.0,
            }),
            argumentation,
        );
        stack
    }

    fn tempo_desk() -> TempoDesk {
        TempoDesk {
            skyline: Skyline::new(vec![TempoSegment::new(0, 720), TempoSegment::new(720, 2160)]),
            ..TempoDesk::default()
        }
    }

    #[test]
    fn test_zip_restores_identical_document() {
        let stack = stack();
        let bundle = Bundle::export(&stack, Some(MEI), &[(100.0, 0.1)], &tempo_desk()).unwrap();
        let bytes = bundle.to_zip_bytes().unwrap();
        assert!(bytes.starts_with(ZIP_MAGIC));

        let loaded = Bundle::from_bytes(&bytes).unwrap();
        assert_eq!(loaded, bundle);
        let restored = loaded.restore().unwrap();
        assert_eq!(restored.document(), stack.document());
        assert_eq!(restored.argumentations().count(), 2);
        assert_eq!(loaded.info.silent_onsets, vec![(100.0, 0.1)]);
        assert_eq!(loaded.info.tempo.skyline.segments().len(), 2);
        assert_eq!(loaded.transcription().unwrap().as_deref(), Some(MEI));
    }

    #[test]
    fn test_exported_mei_carries_annotations() {
        let bundle = Bundle::export(&stack(), Some(MEI), &[], &TempoDesk::default()).unwrap();
        let mei = bundle.mei.unwrap();
        // Pedal starts at n2, which lives in the second measure
        let second = mei.find(r#"<measure n="2">"#).unwrap();
        let pedal = mei.find("lift before the cadence").unwrap();
        assert!(pedal > second);
        assert!(mei.contains(r#"label="ApproximateLogarithmicTempo""#));
    }

    #[test]
    fn test_bare_json_import() {
        let stack = stack();
        let info = Info::new(&stack, &[], &TempoDesk::default());
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"@type\":\"EditorState\""));

        let bundle = Bundle::from_bytes(json.as_bytes()).unwrap();
        assert!(bundle.mpm.is_none());
        assert_eq!(bundle.restore().unwrap().document(), stack.document());
    }

    #[test]
    fn test_missing_info_is_invalid() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(MPM_ENTRY, SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<mpm/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        assert!(matches!(Bundle::from_bytes(&bytes), Err(EditorError::InvalidBundle(_))));
    }

    #[test]
    fn test_save_and_load_files() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = Bundle::export(&stack(), Some(MEI), &[], &TempoDesk::default()).unwrap();

        let zip_path = dir.path().join("work.zip");
        bundle.save(&zip_path).unwrap();
        assert_eq!(Bundle::load(&zip_path).unwrap(), bundle);

        let json_path = dir.path().join("info.json");
        bundle.save(&json_path).unwrap();
        let loaded = Bundle::load(&json_path).unwrap();
        assert_eq!(loaded.info, bundle.info);
        assert!(loaded.mei.is_none());
    }
}
