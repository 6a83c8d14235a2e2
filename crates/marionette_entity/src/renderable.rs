//! # Renderables
//!
//! The entity-owned scene proxy wrapping one primitive instance. The backing
//! asset is shared; only the wrapper (mapping, skinning origin, visibility)
//! belongs to the entity.
//!
//! Every committed renderable is reachable two ways:
//!
//! ```text
//! mesh node id  -> [renderable, ...]   (scene-graph view)
//! instance id   -> renderable          (render-instance view)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use marionette_core::{Handle, InstanceId, NodeId, PrimitiveId, ProxyPool, Transform};
use marionette_provider::{PrimitiveAsset, PrimitiveCost};

/// An entity-owned proxy for one primitive instance.
#[derive(Debug)]
pub struct Renderable {
    /// Owning mesh node.
    pub mesh_node_id: NodeId,
    /// Backing asset id.
    pub primitive_id: PrimitiveId,
    /// Render instance handle.
    pub instance_id: InstanceId,
    /// Shared asset, held for as long as this renderable lives.
    pub asset: Arc<PrimitiveAsset>,
    /// Entity nodes for each asset joint, in asset joint order.
    pub joint_nodes: Vec<NodeId>,
    /// Skeleton joint index for each asset joint.
    pub joint_indices: Vec<u32>,
    /// Origin the skinned mesh is expressed relative to.
    pub skinning_origin: Transform,
    /// LOD bucket the instance is accounted under.
    pub lod_bucket: u8,
    /// Per-instance render cost.
    pub cost: PrimitiveCost,
    /// Whether the instance is currently shown and accounted.
    pub visible: bool,
}

impl Renderable {
    /// Creates a hidden renderable for a loaded asset.
    ///
    /// Returns `None` if the asset has no data.
    #[must_use]
    pub fn new(
        mesh_node_id: NodeId,
        instance_id: InstanceId,
        asset: Arc<PrimitiveAsset>,
        joint_nodes: Vec<NodeId>,
        joint_indices: Vec<u32>,
    ) -> Option<Self> {
        let data = asset.data()?;
        let lod_bucket = data.lod_flags.bucket().unwrap_or(0);
        let cost = data.cost;
        Some(Self {
            mesh_node_id,
            primitive_id: asset.id(),
            instance_id,
            joint_nodes,
            joint_indices,
            skinning_origin: Transform::IDENTITY,
            lod_bucket,
            cost,
            visible: false,
            asset,
        })
    }

    /// Checks whether the mesh is skinned to the skeleton.
    #[must_use]
    pub fn is_skinned(&self) -> bool {
        !self.joint_nodes.is_empty()
    }
}

/// Committed renderables of one entity with both lookup indices.
#[derive(Debug, Default)]
pub struct RenderableSet {
    pool: ProxyPool<Renderable>,
    by_mesh_node: HashMap<NodeId, Vec<Handle<Renderable>>>,
    by_instance: HashMap<InstanceId, Handle<Renderable>>,
}

impl RenderableSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a renderable under its mesh node and instance id.
    pub fn insert(&mut self, renderable: Renderable) -> Handle<Renderable> {
        let node = renderable.mesh_node_id;
        let instance = renderable.instance_id;
        let handle = self.pool.insert(renderable);
        self.by_mesh_node.entry(node).or_default().push(handle);
        if let Some(replaced) = self.by_instance.insert(instance, handle) {
            tracing::warn!(
                "{} registered twice; lookup now resolves to the newer renderable",
                instance
            );
            debug_assert!(replaced != handle);
        }
        handle
    }

    /// Unregisters and returns a renderable.
    pub fn remove(&mut self, handle: Handle<Renderable>) -> Option<Renderable> {
        let renderable = self.pool.remove(handle)?;
        if let Some(handles) = self.by_mesh_node.get_mut(&renderable.mesh_node_id) {
            handles.retain(|h| *h != handle);
            if handles.is_empty() {
                self.by_mesh_node.remove(&renderable.mesh_node_id);
            }
        }
        if self.by_instance.get(&renderable.instance_id) == Some(&handle) {
            self.by_instance.remove(&renderable.instance_id);
        }
        Some(renderable)
    }

    /// Looks up a renderable by handle.
    #[must_use]
    pub fn get(&self, handle: Handle<Renderable>) -> Option<&Renderable> {
        self.pool.get(handle)
    }

    /// Looks up a renderable mutably by handle.
    pub fn get_mut(&mut self, handle: Handle<Renderable>) -> Option<&mut Renderable> {
        self.pool.get_mut(handle)
    }

    /// Renderables owned by `node`.
    #[must_use]
    pub fn for_mesh_node(&self, node: NodeId) -> &[Handle<Renderable>] {
        self.by_mesh_node.get(&node).map_or(&[], Vec::as_slice)
    }

    /// Renderable for a render instance.
    #[must_use]
    pub fn for_instance(&self, instance: InstanceId) -> Option<Handle<Renderable>> {
        self.by_instance.get(&instance).copied()
    }

    /// Finds the renderable for a (mesh node, asset) pair.
    #[must_use]
    pub fn find(&self, node: NodeId, primitive: PrimitiveId) -> Option<Handle<Renderable>> {
        self.for_mesh_node(node)
            .iter()
            .copied()
            .find(|h| self.pool.get(*h).is_some_and(|r| r.primitive_id == primitive))
    }

    /// Iterates over every committed renderable.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<Renderable>, &Renderable)> {
        self.pool.iter()
    }

    /// Number of committed renderables.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.pool.len()
    }

    /// Checks if nothing is committed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Disposes every renderable, releasing their asset references.
    pub fn clear(&mut self) {
        self.by_mesh_node.clear();
        self.by_instance.clear();
        self.pool.clear();
    }
}
