//! # Time Mapping Module
//!
//! Bidirectional conversion between symbolic time (ticks) and physical time
//! (seconds) for a performed score.
//!
//! ## Purpose
//! Every performed note contributes one correspondence point: its notated date
//! and its performed onset. User-supplied silent onsets add anchors on ticks
//! where no note sounds (rests, fermatas). The points form a piecewise-linear
//! map that the scroll synchronisation and the tempo desk both read.
//!
//! ## Sub-modules
//! - `table` - [`LookupTable`] construction and lookups
//!
//! ## Rules
//! - Ticks are strictly increasing after a build; duplicate ticks keep the
//!   first occurrence, and note-derived pairs win over extra anchors.
//! - Lookups return the recorded value exactly at a table key.
//! - Outside the table range both directions extrapolate with the slope of the
//!   nearest segment.
//!
//! ## Example
//! ```rust
//! use mpm_editor::timemap::build_lookup_table;
//!
//! let table = build_lookup_table(&[(0.0, 0.0), (720.0, 0.5)], &[]).unwrap();
//! assert_eq!(table.tick_to_seconds(360.0), 0.25);
//! assert_eq!(table.seconds_to_tick(1.0), 1440.0);
//! ```

mod table;


pub use table::{build_lookup_table, LookupTable, TimePair};
