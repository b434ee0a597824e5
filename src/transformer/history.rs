//! Ordered transformer history replayed onto an immutable base document

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::apply::apply;
use super::options::Operation;
use crate::argumentation::grouping;
use crate::argumentation::{Argumentation, ArgumentationId};
use crate::document::Document;

pub type TransformerId = String;

/// One replayable edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformer {
    pub id: TransformerId,
    #[serde(flatten)]
    pub operation: Operation,
    /// Elements this transformer produced in the replayed document
    #[serde(default)]
    pub created: BTreeSet<String>,
    pub argumentation: ArgumentationId,
}

impl Transformer {
    pub fn new(id: impl Into<TransformerId>, operation: Operation, argumentation: impl Into<ArgumentationId>) -> Self {
        Self {
            id: id.into(),
            operation,
            created: BTreeSet::new(),
            argumentation: argumentation.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.operation.name()
    }

    /// Run the edit against `document`; returns the created element ids.
    pub fn apply(&self, document: &mut Document) -> BTreeSet<String> {
        apply(&self.operation, document, &self.id)
    }
}

/// Result of a full replay.
#[derive(Debug, Clone, PartialEq)]
pub struct Replay {
    pub document: Document,
    /// `created` of each transformer, in history order
    pub created: Vec<BTreeSet<String>>,
}

/// Replay `transformers` in order onto a copy of `base`.
///
/// This is the only undo mechanism: removing an edit means replaying the rest.
pub fn rebuild_document(base: &Document, transformers: &[Transformer]) -> Replay {
    let mut document = base.clone();
    let created = transformers
        .iter()
        .map(|t| t.apply(&mut document))
        .collect();
    debug!(transformers = transformers.len(), "rebuilt document from base");
    Replay { document, created }
}

/// The edit history together with the live document it produces.
///
/// All document mutation goes through [`append`](Self::append),
/// [`remove`](Self::remove), [`remove_active`](Self::remove_active) and
/// [`reset`](Self::reset). Focus and the active set are selection only.
#[derive(Debug, Clone)]
pub struct TransformerStack {
    base: Document,
    document: Document,
    transformers: Vec<Transformer>,
    argumentations: BTreeMap<ArgumentationId, Argumentation>,
    focused: Option<TransformerId>,
    active: BTreeSet<TransformerId>,
    next_id: u64,
}

impl TransformerStack {
    pub fn new(base: Document) -> Self {
        Self {
            document: base.clone(),
            base,
            transformers: Vec::new(),
            argumentations: BTreeMap::new(),
            focused: None,
            active: BTreeSet::new(),
            next_id: 1,
        }
    }

    /// Restore a saved history; the live document is rebuilt by replay.
    pub fn restore(
        base: Document,
        transformers: Vec<Transformer>,
        argumentations: Vec<Argumentation>,
    ) -> Self {
        let mut stack = Self::new(base);
        stack.argumentations = argumentations.into_iter().map(|a| (a.id.clone(), a)).collect();
        stack.next_id = transformers
            .iter()
            .map(|t| t.id.as_str())
            .chain(stack.argumentations.keys().map(String::as_str))
            .filter_map(|id| id.get(1..).and_then(|n| n.parse::<u64>().ok()))
            .max()
            .map_or(1, |n| n + 1);
        for t in &transformers {
            if !stack.argumentations.contains_key(&t.argumentation) {
                warn!(transformer = %t.id, argumentation = %t.argumentation, "restored transformer without argumentation record");
                stack
                    .argumentations
                    .insert(t.argumentation.clone(), Argumentation::new(t.argumentation.clone()));
            }
        }
        stack.reset(transformers);
        stack
    }

    pub fn base(&self) -> &Document {
        &self.base
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn transformers(&self) -> &[Transformer] {
        &self.transformers
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Transformer> {
        self.transformers.iter().find(|t| t.id == id)
    }

    fn next_id(&mut self, prefix: char) -> String {
        let id = format!("{}{}", prefix, self.next_id);
        self.next_id += 1;
        id
    }

    /// A fresh argumentation record with a unique id (not yet registered).
    pub fn new_argumentation(&mut self) -> Argumentation {
        let id = self.next_id('a');
        Argumentation::new(id)
    }

    /// Append an edit under a new, empty argumentation.
    pub fn append(&mut self, operation: Operation) -> TransformerId {
        let argumentation = self.new_argumentation();
        self.append_with(operation, argumentation)
    }

    /// Append an edit justified by `argumentation`. An argumentation whose id
    /// is already known is shared rather than duplicated.
    pub fn append_with(&mut self, operation: Operation, argumentation: Argumentation) -> TransformerId {
        let id = self.next_id('t');
        let argumentation_id = argumentation.id.clone();
        self.argumentations.entry(argumentation_id.clone()).or_insert(argumentation);

        let mut transformer = Transformer::new(id.clone(), operation, argumentation_id);
        transformer.created = transformer.apply(&mut self.document);
        debug!(id = %id, name = transformer.name(), created = transformer.created.len(), "appended transformer");
        self.transformers.push(transformer);
        id
    }

    /// Remove one transformer and rebuild the document from the base.
    /// Unknown ids are ignored.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.transformers.len();
        let remaining: Vec<Transformer> = self.transformers.iter().filter(|t| t.id != id).cloned().collect();
        if remaining.len() == before {
            debug!(id, "remove: transformer not found");
            return false;
        }
        self.reset(remaining);
        true
    }

    /// Remove every active transformer in one replay.
    pub fn remove_active(&mut self) -> usize {
        if self.active.is_empty() {
            return 0;
        }
        let before = self.transformers.len();
        let remaining: Vec<Transformer> = self
            .transformers
            .iter()
            .filter(|t| !self.active.contains(&t.id))
            .cloned()
            .collect();
        let removed = before - remaining.len();
        self.reset(remaining);
        removed
    }

    /// Install `transformers` as the full history and replay it.
    pub fn reset(&mut self, transformers: Vec<Transformer>) {
        self.transformers = transformers;
        self.replay();
    }

    /// Replay the current history from the base document.
    pub fn replay(&mut self) {
        let replay = rebuild_document(&self.base, &self.transformers);
        for (t, created) in self.transformers.iter_mut().zip(replay.created) {
            t.created = created;
        }
        self.document = replay.document;

        let ids: BTreeSet<&str> = self.transformers.iter().map(|t| t.id.as_str()).collect();
        self.active.retain(|id| ids.contains(id.as_str()));
        if self.focused.as_deref().is_some_and(|f| !ids.contains(f)) {
            self.focused = None;
        }
        self.prune_argumentations();
    }

    /// Swap the entry with the same id. The document is not touched; call
    /// [`replay`](Self::replay) when the new options affect it.
    pub fn replace(&mut self, transformer: Transformer) -> bool {
        match self.transformers.iter_mut().find(|t| t.id == transformer.id) {
            Some(slot) => {
                *slot = transformer;
                true
            }
            None => false,
        }
    }

    pub fn focused(&self) -> Option<&Transformer> {
        self.focused.as_deref().and_then(|id| self.get(id))
    }

    pub fn focus(&mut self, id: &str) {
        if self.get(id).is_some() {
            self.focused = Some(id.to_string());
        }
    }

    /// Modifier-click: add to or remove from the active set.
    pub fn toggle_active(&mut self, id: &str) {
        if self.get(id).is_none() {
            return;
        }
        if !self.active.remove(id) {
            self.active.insert(id.to_string());
        }
    }

    /// Plain click: focus the transformer and make it the only active one.
    pub fn select(&mut self, id: &str) {
        if self.get(id).is_none() {
            return;
        }
        self.focused = Some(id.to_string());
        self.active.clear();
        self.active.insert(id.to_string());
    }

    pub fn clear_selection(&mut self) {
        self.focused = None;
        self.active.clear();
    }

    pub fn active(&self) -> &BTreeSet<TransformerId> {
        &self.active
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains(id)
    }

    /// Elements created by all active transformers, for highlighting.
    pub fn active_elements(&self) -> BTreeSet<String> {
        self.transformers
            .iter()
            .filter(|t| self.active.contains(&t.id))
            .flat_map(|t| t.created.iter().cloned())
            .collect()
    }

    /// The transformer that produced a visible element, if any.
    pub fn creator_of(&self, element_id: &str) -> Option<&Transformer> {
        self.transformers.iter().find(|t| t.created.contains(element_id))
    }

    pub fn argumentation(&self, id: &str) -> Option<&Argumentation> {
        self.argumentations.get(id)
    }

    pub fn argumentations(&self) -> impl Iterator<Item = &Argumentation> + '_ {
        self.argumentations.values()
    }

    /// Insert or overwrite an argumentation record (e.g. after editing its note).
    pub fn upsert_argumentation(&mut self, argumentation: Argumentation) {
        self.argumentations.insert(argumentation.id.clone(), argumentation);
    }

    /// Move one transformer into the group of `target`. Metadata only: the
    /// document is not replayed.
    pub fn merge_into(&mut self, transformer_id: &str, target: &str) -> bool {
        if !self.argumentations.contains_key(target) {
            debug!(target, "merge: unknown argumentation");
            return false;
        }
        let merged = grouping::merge_into(&mut self.transformers, transformer_id, target);
        if merged {
            self.prune_argumentations();
        }
        merged
    }

    /// Drop argumentation records no transformer refers to any more.
    fn prune_argumentations(&mut self) {
        let used: BTreeSet<&str> = self.transformers.iter().map(|t| t.argumentation.as_str()).collect();
        self.argumentations.retain(|id, _| used.contains(id.as_str()));
    }
}
