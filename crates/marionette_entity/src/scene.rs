//! Committed scene state of one entity.
//!
//! Only a pipeline commit or teardown writes here.

use marionette_core::{Handle, NodeId, VersionTracker};

use crate::lod::LodTable;
use crate::renderable::{Renderable, RenderableSet};
use crate::skeleton::Skeleton;

/// Everything an entity has built and published as current.
#[derive(Debug, Default)]
pub struct SceneState {
    /// Current/target version bookkeeping.
    pub tracker: VersionTracker,
    /// Committed skeleton.
    pub skeleton: Skeleton,
    /// Committed renderables.
    pub renderables: RenderableSet,
    /// Per-LOD visible cost.
    pub lod: LodTable,
    /// Visible renderables in node order, for the frame update.
    pub visible: Vec<Handle<Renderable>>,
}

impl SceneState {
    /// Creates an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mesh nodes of the visible working list, in order.
    #[must_use]
    pub fn visible_nodes(&self) -> Vec<NodeId> {
        self.visible
            .iter()
            .filter_map(|h| self.renderables.get(*h))
            .map(|r| r.mesh_node_id)
            .collect()
    }

    /// Releases everything: renderables, LOD accounting, then the skeleton
    /// (deepest joints first). Returns the joint destruction order.
    pub fn clear(&mut self) -> Vec<NodeId> {
        self.visible.clear();
        self.renderables.clear();
        self.lod.clear();
        let order = self.skeleton.clear();
        self.tracker.reset();
        order
    }
}
