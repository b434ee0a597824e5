//! Core of an MEI/MPM performance annotation editor.
//!
//! A transcription is converted once into a base [`Document`]. Every edit is a
//! [`Transformer`] recorded in a [`TransformerStack`], and the current document
//! is always the base with the history replayed onto it.

pub mod argumentation;
pub mod backend;
pub mod bundle;
pub mod config;
pub mod document;
pub mod error;
pub mod logging;
pub mod scroll;
pub mod session;
pub mod tempo;
pub mod timemap;
pub mod transformer;

pub use argumentation::{Argumentation, ArgumentationGroup};
pub use backend::{HttpBackend, PerformRequest, RenderBackend};
pub use bundle::Bundle;
pub use config::Config;
pub use document::{Document, Mpm, Msm, Scope};
pub use error::*;
pub use session::{Route, Session, Viewer};
pub use timemap::{build_lookup_table, LookupTable};
pub use transformer::{rebuild_document, Operation, Transformer, TransformerStack};

/// Replay a saved bundle and serialize the resulting MPM.
pub fn replay_bundle(bundle: &Bundle) -> Result<String> {
    bundle.restore()?.document().mpm_xml()
}
