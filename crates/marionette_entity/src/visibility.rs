//! # Visibility Reconciler
//!
//! Diffs the provider's node sets against committed renderables.
//!
//! Both provider lists are sorted, so visibility is a single two-pointer
//! merge: `all` drives the walk, a cursor advances through `visible`.
//!
//! ```text
//! all      n1  n2  n3  n4
//! visible      n2      n4
//!              ^cursor
//! ```
//!
//! A renderable whose flag differs from the merged result is toggled and
//! its instance added to or removed from its LOD bucket.

use std::collections::HashSet;

use marionette_core::{Handle, NodeId};

use crate::lod::LodTable;
use crate::renderable::{Renderable, RenderableSet};

/// What one reconcile pass changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisibilityReport {
    /// Visible renderables, in node order.
    pub visible: Vec<Handle<Renderable>>,
    /// Renderables that became visible.
    pub shown: usize,
    /// Renderables that became hidden.
    pub hidden: usize,
    /// Visible nodes missing from the all-nodes list.
    pub unknown_visible: usize,
}

/// Applies `visible` (a sorted subset of the sorted `all`) to `set`.
pub fn reconcile(
    set: &mut RenderableSet,
    lod: &mut LodTable,
    all: &[NodeId],
    visible: &[NodeId],
) -> VisibilityReport {
    debug_assert!(all.windows(2).all(|w| w[0] <= w[1]), "all nodes unsorted");
    debug_assert!(visible.windows(2).all(|w| w[0] <= w[1]), "visible nodes unsorted");

    let mut report = VisibilityReport {
        visible: Vec::with_capacity(visible.len()),
        ..VisibilityReport::default()
    };
    let mut cursor = 0;

    for &node in all {
        while cursor < visible.len() && visible[cursor] < node {
            report.unknown_visible += 1;
            cursor += 1;
        }
        let is_visible = cursor < visible.len() && visible[cursor] == node;
        if is_visible {
            cursor += 1;
        }

        let owned = set.for_mesh_node(node).len();
        for slot in 0..owned {
            let handle = set.for_mesh_node(node)[slot];
            let Some(renderable) = set.get_mut(handle) else {
                continue;
            };
            if renderable.visible != is_visible {
                renderable.visible = is_visible;
                if is_visible {
                    lod.add_instance(
                        renderable.lod_bucket,
                        renderable.instance_id,
                        renderable.cost,
                    );
                    report.shown += 1;
                } else {
                    lod.remove_instance(renderable.lod_bucket, renderable.instance_id);
                    report.hidden += 1;
                }
            }
            if is_visible {
                report.visible.push(handle);
            }
        }
    }
    report.unknown_visible += visible.len() - cursor;

    if report.unknown_visible > 0 {
        tracing::debug!(
            "{} visible nodes are not in the all-nodes set",
            report.unknown_visible
        );
    }
    report
}

/// Disposes one renderable, taking it out of LOD accounting first.
pub fn dispose(set: &mut RenderableSet, lod: &mut LodTable, handle: Handle<Renderable>) -> bool {
    match set.remove(handle) {
        Some(renderable) => {
            if renderable.visible {
                lod.remove_instance(renderable.lod_bucket, renderable.instance_id);
            }
            true
        }
        None => false,
    }
}

/// Tears down every committed renderable whose node left `all` or that the
/// new render state no longer describes.
///
/// Returns the number of renderables disposed.
pub fn remove_stale(
    set: &mut RenderableSet,
    lod: &mut LodTable,
    all: &[NodeId],
    kept: &HashSet<Handle<Renderable>>,
) -> usize {
    let stale: Vec<Handle<Renderable>> = set
        .iter()
        .filter(|(handle, renderable)| {
            !kept.contains(handle) || all.binary_search(&renderable.mesh_node_id).is_err()
        })
        .map(|(handle, _)| handle)
        .collect();

    let mut removed = 0;
    for handle in stale {
        if dispose(set, lod, handle) {
            removed += 1;
        }
    }
    removed
}
