//! # Argumentation Module
//!
//! Justification records for edits and the interactions built on them.
//!
//! Group membership is never stored: every view re-derives it from the
//! `argumentation` id each transformer carries, so merging two groups is a
//! single reassignment on the transformer being dragged.
//!
//! ## Sub-modules
//! - `model` - argumentation, conclusion, certainty and motivation
//! - `grouping` - partition by id, merge, group spans
//! - `layout` - minimal track assignment for overlapping group spans
//! - `dnd` - pointer drag and drop with SVG hit-testing

pub mod dnd;
pub mod grouping;
pub mod layout;
pub mod model;

pub use dnd::{DragDropContext, DragEvent, Geometry, Matrix, Point, Shape};
pub use grouping::{group_by_argumentation, group_intervals, ArgumentationGroup};
pub use layout::{layout_intervals, Interval, Layout};
pub use model::{Argumentation, ArgumentationId, Certainty, Conclusion, Motivation};
