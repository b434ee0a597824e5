//! Scroll registry: keeps every registered pane on the same musical position

use tracing::{debug, trace};

use super::handle::{Domain, ScrollBehavior, ScrollHandle};
use crate::config::ScrollConfig;
use crate::timemap::LookupTable;

/// What the registry did with a scroll event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollEvent {
    /// The offset matched one the registry set itself; nothing propagates
    Echo,
    /// A sync pass is pending for the next frame
    Scheduled,
    /// The id is not registered
    Unknown,
}

struct Pane {
    id: String,
    handle: Box<dyn ScrollHandle>,
    domain: Domain,
    /// Pixels per domain unit (per tick or per second)
    stretch: f64,
    /// Last write issued by the registry, awaiting its echo events
    expected: Option<Expected>,
}

/// A programmatic write in flight. Instant writes start at their target;
/// smooth writes pass through every offset between `start` and `target`.
#[derive(Debug, Clone, Copy)]
struct Expected {
    start: f64,
    target: f64,
}

impl Expected {
    fn instant(target: f64) -> Self {
        Self { start: target, target }
    }

    fn arrived(&self, offset: f64, tolerance: f64) -> bool {
        (offset - self.target).abs() <= tolerance
    }

    fn in_flight(&self, offset: f64, tolerance: f64) -> bool {
        let (lo, hi) = if self.start <= self.target {
            (self.start, self.target)
        } else {
            (self.target, self.start)
        };
        offset >= lo - tolerance && offset <= hi + tolerance
    }
}

/// Registry of scroll-linked panes.
///
/// Owned by the session shell and handed to whatever hosts the panes. The
/// host forwards native scroll events to [`on_scroll`](Self::on_scroll) and,
/// whenever that reports [`ScrollEvent::Scheduled`], calls
/// [`run_frame`](Self::run_frame) on its next animation frame. Rapid events
/// between two frames collapse into one pass driven by the latest source.
pub struct ScrollSync {
    panes: Vec<Pane>,
    table: Option<LookupTable>,
    pending_source: Option<String>,
    echo_tolerance: f64,
    sync_tolerance: f64,
}

impl ScrollSync {
    pub fn new(config: &ScrollConfig) -> Self {
        Self {
            panes: Vec::new(),
            table: None,
            pending_source: None,
            echo_tolerance: config.echo_tolerance,
            sync_tolerance: config.sync_tolerance,
        }
    }

    /// Replace the tick/second mapping used for cross-domain sync.
    ///
    /// With `None` cross-domain sync silently does nothing (no notes loaded yet).
    pub fn set_lookup_table(&mut self, table: Option<LookupTable>) {
        self.table = table;
    }

    pub fn len(&self) -> usize {
        self.panes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    /// Register a pane. A pane registered under an existing id replaces it.
    ///
    /// If another pane of the same domain is already registered, the new pane
    /// is snapped to that peer's offset so it starts in sync.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        handle: Box<dyn ScrollHandle>,
        domain: Domain,
        stretch: f64,
    ) {
        let id = id.into();
        self.unregister(&id);

        let mut pane = Pane {
            id,
            handle,
            domain,
            stretch,
            expected: None,
        };

        if let Some(peer) = self.panes.iter().find(|p| p.domain == domain) {
            let offset = peer.handle.scroll_offset();
            if (pane.handle.scroll_offset() - offset).abs() > self.echo_tolerance {
                pane.expected = Some(Expected::instant(offset));
                pane.handle.set_scroll_offset(offset, ScrollBehavior::Instant);
            }
        }

        debug!(id = %pane.id, ?domain, "registered scroll pane");
        self.panes.push(pane);
    }

    /// Remove a pane and hand its handle back to the caller.
    pub fn unregister(&mut self, id: &str) -> Option<Box<dyn ScrollHandle>> {
        let idx = self.index_of(id)?;
        if self.pending_source.as_deref() == Some(id) {
            self.pending_source = None;
        }
        Some(self.panes.remove(idx).handle)
    }

    /// Update a pane's zoom (pixels per tick or per second).
    pub fn set_stretch(&mut self, id: &str, stretch: f64) {
        if let Some(idx) = self.index_of(id) {
            self.panes[idx].stretch = stretch;
        }
    }

    /// Handle a native scroll event fired by pane `id`.
    ///
    /// Events on the path of a smooth write in flight are echoes; the write is
    /// settled once the pane arrives. An offset off that path is a user grab
    /// and drops the expectation.
    pub fn on_scroll(&mut self, id: &str) -> ScrollEvent {
        let Some(idx) = self.index_of(id) else {
            return ScrollEvent::Unknown;
        };

        let tolerance = self.echo_tolerance;
        let pane = &mut self.panes[idx];
        let offset = pane.handle.scroll_offset();
        if let Some(expected) = pane.expected {
            if expected.arrived(offset, tolerance) {
                pane.expected = None;
                trace!(id, offset, "suppressed scroll echo");
                return ScrollEvent::Echo;
            }
            if expected.in_flight(offset, tolerance) {
                trace!(id, offset, target = expected.target, "suppressed scroll echo in flight");
                return ScrollEvent::Echo;
            }
            pane.expected = None;
        }

        self.pending_source = Some(pane.id.clone());
        ScrollEvent::Scheduled
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pending_source.is_some()
    }

    /// Run the pending sync pass, if any. Returns the number of panes moved.
    pub fn run_frame(&mut self) -> usize {
        let Some(source_id) = self.pending_source.take() else {
            return 0;
        };
        let Some(source_idx) = self.index_of(&source_id) else {
            return 0;
        };

        let source_offset = self.panes[source_idx].handle.scroll_offset();
        let source_domain = self.panes[source_idx].domain;
        let source_stretch = self.panes[source_idx].stretch;

        let mut moved = 0;
        for idx in 0..self.panes.len() {
            if idx == source_idx {
                continue;
            }
            let target = {
                let pane = &self.panes[idx];
                if pane.domain == source_domain {
                    Some(source_offset)
                } else {
                    self.convert(source_offset / source_stretch, source_domain)
                        .map(|unit| (unit * pane.stretch).max(0.0))
                }
            };
            let Some(target) = target.filter(|t| t.is_finite()) else {
                continue;
            };

            let pane = &mut self.panes[idx];
            if (pane.handle.scroll_offset() - target).abs() > self.sync_tolerance {
                pane.expected = Some(Expected::instant(target));
                pane.handle.set_scroll_offset(target, ScrollBehavior::Instant);
                moved += 1;
            }
        }

        debug!(source = %source_id, moved, "scroll sync pass");
        moved
    }

    /// Center every pane on `tick`, animating the scroll.
    pub fn scroll_to_date(&mut self, tick: f64) {
        for idx in 0..self.panes.len() {
            let unit = match self.panes[idx].domain {
                Domain::Symbolic => Some(tick),
                Domain::Physical => self.convert(tick, Domain::Symbolic),
            };
            let Some(unit) = unit else {
                continue;
            };

            let pane = &mut self.panes[idx];
            let target = (unit * pane.stretch - pane.handle.viewport_extent() / 2.0).max(0.0);
            if !target.is_finite() {
                continue;
            }
            pane.expected = Some(Expected {
                start: pane.handle.scroll_offset(),
                target,
            });
            pane.handle.set_scroll_offset(target, ScrollBehavior::Smooth);
        }
        // Panes are now positioned explicitly; a stale pending pass would undo that
        self.pending_source = None;
    }

    /// Convert a value from `from` into the other domain.
    fn convert(&self, value: f64, from: Domain) -> Option<f64> {
        let table = self.table.as_ref()?;
        Some(match from {
            Domain::Symbolic => table.tick_to_seconds(value),
            Domain::Physical => table.seconds_to_tick(value),
        })
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.panes.iter().position(|p| p.id == id)
    }
}
