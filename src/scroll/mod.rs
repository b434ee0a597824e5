//! # Scroll Synchronisation Module
//!
//! Keeps several independently zoomed timeline panes (tempo, dynamics,
//! articulation, ...) scrolled to the same musical position.
//!
//! ## Purpose
//! Each pane is laid out either in ticks (symbolic) or in seconds (physical)
//! and has its own zoom. When the user scrolls one pane, the registry computes
//! the matching offset for every other pane:
//! - same domain: the raw pixel offset is copied
//! - other domain: offset / zoom, converted through the [`LookupTable`], times
//!   the peer's zoom
//!
//! Offsets are written through [`ScrollHandle`] directly, bypassing any
//! component state. Every programmatic write is remembered as "expected" so
//! the echo scroll event it triggers is swallowed instead of bouncing back.
//!
//! ## Frame Coalescing
//! [`ScrollSync::on_scroll`] only records the latest source pane; the host
//! runs [`ScrollSync::run_frame`] once per animation frame.
//!
//! ## Example
//! ```rust
//! use mpm_editor::config::ScrollConfig;
//! use mpm_editor::scroll::{ScrollEvent, ScrollSync};
//!
//! let mut sync = ScrollSync::new(&ScrollConfig::default());
//! assert_eq!(sync.on_scroll("tempo"), ScrollEvent::Unknown);
//! assert_eq!(sync.run_frame(), 0);
//! ```
//!
//! [`LookupTable`]: crate::timemap::LookupTable

mod handle;
mod registry;


pub use handle::{Domain, ScrollBehavior, ScrollHandle};
pub use registry::{ScrollEvent, ScrollSync};
