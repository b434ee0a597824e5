//! Imperative scroll handles and time domains

use serde::{Deserialize, Serialize};

/// Time domain a scrollable pane is laid out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Horizontal axis measured in ticks
    Symbolic,
    /// Horizontal axis measured in seconds
    Physical,
}

/// How a programmatic scroll should be carried out by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollBehavior {
    /// Jump immediately (used while following another pane)
    Instant,
    /// Animate towards the target (used for "scroll to date")
    Smooth,
}

/// Escape hatch onto a pane's native scroll position.
///
/// The registry writes offsets through this handle directly instead of going
/// through component state, so heavy timelines are not re-rendered on every
/// scroll tick. Offsets are in pixels from the left edge of the content.
pub trait ScrollHandle {
    fn scroll_offset(&self) -> f64;

    fn set_scroll_offset(&mut self, offset: f64, behavior: ScrollBehavior);

    /// Visible width of the pane, used to center on a date.
    fn viewport_extent(&self) -> f64;
}
