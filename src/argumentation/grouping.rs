//! Derived grouping of transformers by argumentation id

use std::collections::BTreeMap;

use tracing::debug;

use super::layout::Interval;
use super::model::ArgumentationId;
use crate::transformer::{Transformer, TransformerId};

/// Transformers sharing one argumentation, in history order.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentationGroup {
    pub argumentation_id: ArgumentationId,
    pub members: Vec<TransformerId>,
}

/// Partition `transformers` by argumentation. Groups come in order of their
/// first member's position in the history.
pub fn group_by_argumentation(transformers: &[Transformer]) -> Vec<ArgumentationGroup> {
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut groups: Vec<ArgumentationGroup> = Vec::new();
    for t in transformers {
        match index.get(t.argumentation.as_str()) {
            Some(&i) => groups[i].members.push(t.id.clone()),
            None => {
                index.insert(&t.argumentation, groups.len());
                groups.push(ArgumentationGroup {
                    argumentation_id: t.argumentation.clone(),
                    members: vec![t.id.clone()],
                });
            }
        }
    }
    groups
}

/// Point one transformer at `target`. Returns false for an unknown
/// transformer id.
pub fn merge_into(transformers: &mut [Transformer], transformer_id: &str, target: &str) -> bool {
    let Some(t) = transformers.iter_mut().find(|t| t.id == transformer_id) else {
        debug!(transformer_id, "merge: transformer not found");
        return false;
    };
    debug!(transformer_id, from = %t.argumentation, to = target, "merging into argumentation");
    t.argumentation = target.to_string();
    true
}

/// Displayed span of a group: min start and max end over its members'
/// targets. Note-set targets do not contribute; `None` when nothing does.
pub fn group_span(group: &ArgumentationGroup, transformers: &[Transformer]) -> Option<Interval> {
    group
        .members
        .iter()
        .filter_map(|id| transformers.iter().find(|t| &t.id == id))
        .filter_map(|t| t.operation.target().span())
        .map(|(start, end)| Interval::new(start, end))
        .reduce(|a, b| Interval::new(a.start.min(b.start), a.end.max(b.end)))
}

/// Every group together with its span, skipping groups without one.
pub fn group_intervals(transformers: &[Transformer]) -> Vec<(ArgumentationGroup, Interval)> {
    group_by_argumentation(transformers)
        .into_iter()
        .filter_map(|g| group_span(&g, transformers).map(|span| (g, span)))
        .collect()
}
