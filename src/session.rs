//! Editor session: the state shared by every desk, and the read-only viewer
//!
//! The session owns the transformer history, the scroll registry, the tempo
//! desk and the silent onsets. The lookup table is cached here and rebuilt
//! only when the notes or the silent onsets change.

use tracing::{debug, error, info};

use crate::argumentation::{
    group_intervals, layout_intervals, Argumentation, ArgumentationGroup, DragDropContext, DragEvent,
    Interval, Point,
};
use crate::backend::{PerformRequest, RenderBackend};
use crate::bundle::Bundle;
use crate::config::Config;
use crate::document::mei::strip_annotations;
use crate::document::{enrich, Document, Msm, PerformanceTimings, Scope, Tempo};
use crate::error::Result;
use crate::scroll::ScrollSync;
use crate::tempo::{extract_segments, SplitOutcome, TempoDesk};
use crate::timemap::{LookupTable, TimePair};
use crate::transformer::{TransformerId, TransformerStack};

/// Which surface a URL path selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Editor,
    Viewer,
}

impl Route {
    pub fn from_path(path: &str) -> Self {
        match path.trim_end_matches('/') {
            "/editor" => Route::Editor,
            _ => Route::Viewer,
        }
    }
}

/// One argumentation group as drawn on the argumentation canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedGroup {
    pub group: ArgumentationGroup,
    pub span: Interval,
    pub track: usize,
}

pub struct Session {
    config: Config,
    stack: TransformerStack,
    scroll: ScrollSync,
    silent_onsets: Vec<TimePair>,
    table: Option<LookupTable>,
    tempo: TempoDesk,
    drag: DragDropContext<TransformerId>,
    mei: Option<String>,
    playing: Option<Vec<u8>>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let scroll = ScrollSync::new(&config.scroll);
        Self {
            config,
            stack: TransformerStack::new(Document::default()),
            scroll,
            silent_onsets: Vec::new(),
            table: None,
            tempo: TempoDesk::default(),
            drag: DragDropContext::new(),
            mei: None,
            playing: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn history(&self) -> &TransformerStack {
        &self.stack
    }

    /// The single funnel for document edits.
    pub fn history_mut(&mut self) -> &mut TransformerStack {
        &mut self.stack
    }

    pub fn document(&self) -> &Document {
        self.stack.document()
    }

    pub fn mei(&self) -> Option<&str> {
        self.mei.as_deref()
    }

    pub fn scroll(&mut self) -> &mut ScrollSync {
        &mut self.scroll
    }

    pub fn tempo(&self) -> &TempoDesk {
        &self.tempo
    }

    pub fn tempo_mut(&mut self) -> &mut TempoDesk {
        &mut self.tempo
    }

    pub fn drag(&mut self) -> &mut DragDropContext<TransformerId> {
        &mut self.drag
    }

    pub fn lookup_table(&self) -> Option<&LookupTable> {
        self.table.as_ref()
    }

    pub fn silent_onsets(&self) -> &[TimePair] {
        &self.silent_onsets
    }

    /// Start over from a transcription: convert it through the backend, copy
    /// the performed timing onto the notes and reset history.
    ///
    /// On failure nothing in the session changes.
    pub fn import_mei(&mut self, backend: &dyn RenderBackend, mei: &str) -> Result<()> {
        let msm_text = backend.convert_mei(mei).inspect_err(|e| {
            error!(error = %e, "MEI conversion failed");
        })?;
        let mut msm = Msm::parse_with_resolution(&msm_text, self.config.pulses_per_quarter)?;
        let timings = PerformanceTimings::parse(mei)?;
        enrich(&mut msm, &timings);

        info!(notes = msm.notes.len(), parts = msm.parts.len(), "imported transcription");
        self.install(TransformerStack::new(Document::new(msm)), Some(mei.to_string()), Vec::new(), None);
        Ok(())
    }

    /// Continue previously exported work.
    pub fn import_bundle(&mut self, bundle: &Bundle) -> Result<()> {
        let stack = bundle.restore()?;
        let mei = bundle.transcription()?;
        self.install(
            stack,
            mei,
            bundle.info.silent_onsets.clone(),
            Some(bundle.info.tempo.clone()),
        );
        Ok(())
    }

    pub fn export_bundle(&self) -> Result<Bundle> {
        Bundle::export(&self.stack, self.mei.as_deref(), &self.silent_onsets, &self.tempo)
    }

    fn install(
        &mut self,
        stack: TransformerStack,
        mei: Option<String>,
        silent_onsets: Vec<TimePair>,
        tempo: Option<TempoDesk>,
    ) {
        self.stack = stack;
        self.mei = mei;
        self.silent_onsets = silent_onsets;
        self.playing = None;
        self.refresh_lookup_table();
        self.tempo = tempo.unwrap_or_else(|| {
            let mut desk = TempoDesk::default();
            if let Some(table) = &self.table {
                desk.skyline.set_segments(extract_segments(table, &self.silent_onsets));
            }
            desk
        });
    }

    fn refresh_lookup_table(&mut self) {
        self.table = self.stack.base().lookup_table(Scope::Global, &self.silent_onsets);
        self.scroll.set_lookup_table(self.table.clone());
        debug!(anchors = self.table.as_ref().map_or(0, LookupTable::len), "rebuilt lookup table");
    }

    /// Anchor a tick without a played note. Replaces an anchor at the same tick.
    pub fn add_silent_onset(&mut self, onset: TimePair) {
        self.silent_onsets.retain(|(tick, _)| *tick != onset.0);
        self.silent_onsets.push(onset);
        self.refresh_lookup_table();
    }

    pub fn remove_silent_onset(&mut self, tick: f64) -> bool {
        let before = self.silent_onsets.len();
        self.silent_onsets.retain(|(t, _)| *t != tick);
        let removed = self.silent_onsets.len() != before;
        if removed {
            self.refresh_lookup_table();
        }
        removed
    }

    /// Split the skyline at `tick`, recording a silent onset when the new
    /// boundary has no played note.
    pub fn split_segment(&mut self, tick: u64, physical_onset: Option<f64>) -> Result<SplitOutcome> {
        let outcome = self.tempo.skyline.split_at(tick, self.table.as_ref(), physical_onset)?;
        if let SplitOutcome::Silent(onset) = outcome {
            self.add_silent_onset(onset);
        }
        Ok(outcome)
    }

    /// Stage the skyline segment starting at `start` onto the tempo chain.
    pub fn stage_segment(&mut self, start: u64) -> bool {
        let Some(segment) = self.tempo.skyline.segments().iter().find(|s| s.date.start == start).cloned() else {
            return false;
        };
        self.tempo.chain.stage(&segment, self.config.beat_length);
        true
    }

    pub fn preview_tempo(&self) -> Result<Vec<Tempo>> {
        self.tempo.chain.preview(self.stack.document(), &self.silent_onsets)
    }

    /// Commit the staged chain ("Insert").
    pub fn insert_tempo(&mut self, argumentation: Option<Argumentation>) -> Result<Vec<TransformerId>> {
        self.tempo
            .chain
            .insert(&mut self.stack, &self.silent_onsets, argumentation)
    }

    /// Argumentation groups with their spans and tracks.
    pub fn argumentation_layout(&self) -> Vec<PlacedGroup> {
        let groups = group_intervals(self.stack.transformers());
        let spans: Vec<Interval> = groups.iter().map(|(_, span)| *span).collect();
        let layout = layout_intervals(&spans, self.config.layout_padding);
        groups
            .into_iter()
            .zip(layout.tracks)
            .map(|((group, span), track)| PlacedGroup { group, span, track })
            .collect()
    }

    /// Release a dragged transformer card. Dropping onto an argumentation
    /// moves the transformer into that group. A drop that merges nothing
    /// (unknown transformer or argumentation) is not reported.
    pub fn release_drag(&mut self, screen: Point) -> Vec<DragEvent<TransformerId>> {
        let mut events = self.drag.drop(screen);
        events.retain(|event| match event {
            DragEvent::Drop { target, item } => {
                let merged = self.stack.merge_into(item, target);
                if !merged {
                    debug!(transformer = %item, argumentation = %target, "drop merged nothing");
                }
                merged
            }
            _ => true,
        });
        events
    }

    /// Render the current document for playback. A new request stops the
    /// current playback first; on failure nothing plays.
    pub fn play(&mut self, backend: &dyn RenderBackend, mpm_ids: Option<Vec<String>>) -> Result<&[u8]> {
        self.playing = None;
        let request = PerformRequest {
            mpm_ids,
            ..PerformRequest::new(self.stack.document().mpm_xml()?, self.mei.clone().unwrap_or_default())
        };
        let midi = backend.perform(&request).inspect_err(|e| {
            error!(error = %e, "performance rendering failed");
        })?;
        Ok(self.playing.insert(midi).as_slice())
    }

    pub fn stop(&mut self) {
        self.playing = None;
    }

    pub fn now_playing(&self) -> Option<&[u8]> {
        self.playing.as_deref()
    }
}

/// Read-only playback view built from the two static assets
/// `/transcription.mei` and `/info.json`.
#[derive(Debug, Clone)]
pub struct Viewer {
    stack: TransformerStack,
    mei: String,
}

impl Viewer {
    pub fn from_assets(mei: &str, info_json: &str) -> Result<Self> {
        let bundle = Bundle::from_json(info_json)?;
        Ok(Self {
            stack: bundle.restore()?,
            mei: strip_annotations(mei)?,
        })
    }

    pub fn document(&self) -> &Document {
        self.stack.document()
    }

    pub fn history(&self) -> &TransformerStack {
        &self.stack
    }

    pub fn play(&self, backend: &dyn RenderBackend) -> Result<Vec<u8>> {
        let request = PerformRequest::new(self.stack.document().mpm_xml()?, self.mei.clone());
        backend.perform(&request).inspect_err(|e| {
            error!(error = %e, "performance rendering failed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::argumentation::{Geometry, Shape};
    use crate::error::EditorError;
    use crate::transformer::{Operation, PedalOptions};

    const MSM: &str = r#"<msm title="etude" pulsesPerQuarter="720">
  <part number="1" name="piano"><dated><score>
    <note xml:id="n1" date="0" duration="720" midi.pitch="60"/>
    <note xml:id="n2" date="720" duration="720" midi.pitch="62"/>
    <note xml:id="n3" date="1440" duration="720" midi.pitch="64"/>
    <note xml:id="n4" date="2160" duration="720" midi.pitch="65"/>
    <note xml:id="n5" date="2880" duration="720" midi.pitch="67"/>
  </score></dated></part>
</msm>"#;

    const MEI: &str = r##"<mei><music><body><mdiv><score><section>
<measure n="1"><staff><layer><note xml:id="n1"/><note xml:id="n2"/><note xml:id="n3"/><note xml:id="n4"/></layer></staff></measure>
<measure n="2"><staff><layer><note xml:id="n5"/></layer></staff></measure>
</section></score></mdiv></body></music>
<performance><recording>
<when absolute="0" data="#n1"/><when absolute="500" data="#n2"/><when absolute="1100" data="#n3"/>
<when absolute="1800" data="#n4"/><when absolute="2600" data="#n5"/>
</recording></performance></mei>"##;

    #[derive(Default)]
    struct FakeBackend {
        fail: bool,
        performed: RefCell<Vec<PerformRequest>>,
    }

    impl RenderBackend for FakeBackend {
        fn convert_mei(&self, _mei: &str) -> Result<String> {
            if self.fail {
                return Err(EditorError::Backend {
                    status: 503,
                    text: "unavailable".to_string(),
                });
            }
            Ok(MSM.to_string())
        }

        fn render_midi(&self, _mpm: &str) -> Result<Vec<u8>> {
            Ok(b"MThd".to_vec())
        }

        fn perform(&self, request: &PerformRequest) -> Result<Vec<u8>> {
            self.performed.borrow_mut().push(request.clone());
            if self.fail {
                return Err(EditorError::Backend {
                    status: 500,
                    text: "render failed".to_string(),
                });
            }
            Ok(b"MThd".to_vec())
        }
    }

    fn session() -> Session {
        let mut session = Session::new(Config::default());
        session.import_mei(&FakeBackend::default(), MEI).unwrap();
        session
    }

    #[test]
    fn test_routes() {
        assert_eq!(Route::from_path("/editor"), Route::Editor);
        assert_eq!(Route::from_path("/editor/"), Route::Editor);
        assert_eq!(Route::from_path("/"), Route::Viewer);
        assert_eq!(Route::from_path("/editors"), Route::Viewer);
    }

    #[test]
    fn test_import_builds_table_and_skyline() {
        let session = session();
        assert_eq!(session.document().msm.notes.len(), 5);
        assert_eq!(session.document().msm.notes[2].onset, Some(1.1));
        let table = session.lookup_table().unwrap();
        assert_eq!(table.tick_to_seconds(2160.0), 1.8);
        assert_eq!(session.tempo().skyline.segments().len(), 4);
    }

    #[test]
    fn test_failed_import_changes_nothing() {
        let mut session = session();
        let before = session.document().clone();
        let failing = FakeBackend {
            fail: true,
            ..FakeBackend::default()
        };
        assert!(matches!(session.import_mei(&failing, "<mei/>"), Err(EditorError::Backend { .. })));
        assert_eq!(session.document(), &before);
        assert!(session.lookup_table().is_some());
    }

    #[test]
    fn test_split_records_silent_onset() {
        let mut session = session();
        session.tempo_mut().skyline.enter_split_mode();
        let outcome = session.split_segment(1800, Some(1.45)).unwrap();
        assert_eq!(outcome, SplitOutcome::Silent((1800.0, 1.45)));
        assert_eq!(session.silent_onsets(), &[(1800.0, 1.45)]);
        assert_eq!(session.lookup_table().unwrap().tick_to_seconds(1800.0), 1.45);

        assert!(session.remove_silent_onset(1800.0));
        assert!(!session.lookup_table().unwrap().has_tick(1800.0));
    }

    #[test]
    fn test_chain_preview_then_insert() {
        let mut session = session();
        assert!(session.stage_segment(0));
        assert!(session.stage_segment(720));
        assert!(!session.stage_segment(5));

        let preview = session.preview_tempo().unwrap();
        assert_eq!(preview[1].bpm, preview[0].end_bpm());
        assert!(session.document().mpm.global.tempo.is_empty());

        let ids = session.insert_tempo(None).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(session.document().mpm.global.tempo.len(), 2);
        assert_eq!(session.argumentation_layout().len(), 1);
    }

    #[test]
    fn test_drop_card_merges_argumentation() {
        let mut session = session();
        let pedal = |from, to| {
            Operation::Pedal(PedalOptions {
                scope: Scope::Global,
                from,
                to,
            })
        };
        let t1 = session.history_mut().append(pedal(0.0, 720.0));
        let t2 = session.history_mut().append(pedal(360.0, 1440.0));
        let target = session.history().get(&t2).unwrap().argumentation.clone();
        assert_eq!(session.argumentation_layout().iter().map(|g| g.track).max(), Some(1));

        session.drag().register_target(
            target.clone(),
            Geometry::filled(Shape::Rect {
                x: 0.0,
                y: 0.0,
                width: 50.0,
                height: 20.0,
            }),
        );
        session.drag().begin_drag(t1.clone(), Point::new(200.0, 200.0));
        let events = session.release_drag(Point::new(10.0, 10.0));
        assert!(matches!(events.last(), Some(DragEvent::Drop { .. })));
        assert_eq!(session.history().get(&t1).unwrap().argumentation, target);

        let layout = session.argumentation_layout();
        assert_eq!(layout.len(), 1);
        assert_eq!(layout[0].span, Interval::new(0.0, 1440.0));
    }

    #[test]
    fn test_drop_on_unknown_argumentation_is_not_reported() {
        let mut session = session();
        let t1 = session.history_mut().append(Operation::Pedal(PedalOptions {
            scope: Scope::Global,
            from: 0.0,
            to: 720.0,
        }));
        let before = session.history().get(&t1).unwrap().argumentation.clone();

        session.drag().register_target(
            "a99".to_string(),
            Geometry::filled(Shape::Rect {
                x: 0.0,
                y: 0.0,
                width: 50.0,
                height: 20.0,
            }),
        );
        session.drag().begin_drag(t1.clone(), Point::new(200.0, 200.0));
        let events = session.release_drag(Point::new(10.0, 10.0));

        assert!(!events.iter().any(|e| matches!(e, DragEvent::Drop { .. })));
        assert_eq!(session.history().get(&t1).unwrap().argumentation, before);
        assert!(!session.drag().is_dragging());
    }

    #[test]
    fn test_play_replaces_previous_and_clears_on_failure() {
        let mut session = session();
        let backend = FakeBackend::default();
        assert_eq!(session.play(&backend, None).unwrap(), b"MThd");
        assert!(session.now_playing().is_some());
        assert!(backend.performed.borrow()[0].mei.contains("<mei>"));

        let failing = FakeBackend {
            fail: true,
            ..FakeBackend::default()
        };
        assert!(session.play(&failing, Some(vec!["x".to_string()])).is_err());
        assert!(session.now_playing().is_none());
        assert_eq!(failing.performed.borrow()[0].mpm_ids, Some(vec!["x".to_string()]));
    }

    #[test]
    fn test_bundle_round_trip_through_session() {
        let mut session = session();
        session.add_silent_onset((3000.0, 2.7));
        session.history_mut().append(Operation::Pedal(PedalOptions {
            scope: Scope::Part(1),
            from: 720.0,
            to: 2880.0,
        }));
        let bundle = session.export_bundle().unwrap();

        let mut restored = Session::new(Config::default());
        restored.import_bundle(&bundle).unwrap();
        assert_eq!(restored.document(), session.document());
        assert_eq!(restored.mei(), Some(MEI));
        assert_eq!(restored.silent_onsets(), session.silent_onsets());
        assert_eq!(restored.tempo(), session.tempo());
    }

    #[test]
    fn test_viewer_from_assets() {
        let mut session = session();
        session.history_mut().append(Operation::Pedal(PedalOptions {
            scope: Scope::Global,
            from: 0.0,
            to: 720.0,
        }));
        let info = serde_json::to_string(&session.export_bundle().unwrap().info).unwrap();

        let viewer = Viewer::from_assets(MEI, &info).unwrap();
        assert_eq!(viewer.document(), session.document());
        assert_eq!(viewer.history().len(), 1);
        assert_eq!(viewer.play(&FakeBackend::default()).unwrap(), b"MThd");
    }
}
