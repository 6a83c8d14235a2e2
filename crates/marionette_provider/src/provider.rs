//! # Avatar Provider Trait
//!
//! Snapshot types and the query surface of the native avatar provider.
//! A provider is passed explicitly to every tick; there is no global
//! instance, so independent sessions and tests can coexist.

use std::sync::Arc;

use marionette_core::{
    EntityHandle, InstanceId, JointType, NodeId, PrimitiveId, Transform, VersionToken,
    VersionTriple,
};

use crate::assets::PrimitiveAsset;
use crate::error::ProviderResult;

/// One joint of a published pose.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseJoint {
    /// Provider node id for this joint.
    pub node_id: NodeId,
    /// Index of the parent joint in the same array, `-1` for roots.
    pub parent_index: i32,
    /// Debug name.
    pub name: String,
    /// Local bind transform.
    pub local: Transform,
}

impl PoseJoint {
    /// Creates a joint with an identity local transform.
    #[must_use]
    pub fn new(node_id: NodeId, parent_index: i32, name: impl Into<String>) -> Self {
        Self {
            node_id,
            parent_index,
            name: name.into(),
            local: Transform::IDENTITY,
        }
    }
}

/// A flat joint array keyed to one hierarchy version.
///
/// Parents are not guaranteed to precede their children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoseSnapshot {
    /// Hierarchy version this pose describes.
    pub hierarchy: VersionToken,
    /// Joints, indexed by joint index.
    pub joints: Vec<PoseJoint>,
}

/// Which content produced a render state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ContentTier {
    /// The placeholder/default avatar.
    #[default]
    Default,
    /// Low-detail fast-load content.
    FastLoad,
    /// The user's own avatar.
    User,
}

/// The provider's published render state for one entity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderStateSnapshot {
    /// Version triple this state carries.
    pub versions: VersionTriple,
    /// Every mesh node, sorted ascending.
    pub all_mesh_nodes: Vec<NodeId>,
    /// Visible mesh nodes, sorted ascending, a subset of `all_mesh_nodes`.
    pub visible_mesh_nodes: Vec<NodeId>,
    /// Number of primitives queryable by index.
    pub primitive_count: u32,
    /// Content that produced this state.
    pub tier: ContentTier,
}

/// Per-primitive render descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimitiveRenderState {
    /// Mesh node owning the primitive.
    pub mesh_node_id: NodeId,
    /// Backing shared asset.
    pub primitive_id: PrimitiveId,
    /// Render instance handle.
    pub instance_id: InstanceId,
    /// Entity node for each of the asset's joints, in asset joint order.
    pub joint_pose_mapping: Vec<NodeId>,
    /// Origin the skinned mesh is expressed relative to.
    pub skinning_origin: Transform,
}

/// Everything the synchronization core consumes from the native SDK.
pub trait AvatarProvider {
    /// Cheap poll of the published version triple.
    ///
    /// # Errors
    ///
    /// `NotReady` before the provider has published anything.
    fn published_versions(&self, entity: EntityHandle) -> ProviderResult<VersionTriple>;

    /// Returns the current pose and its hierarchy version.
    ///
    /// # Errors
    ///
    /// `NotReady` while the pose is being produced, `Failed` otherwise.
    fn query_pose(&self, entity: EntityHandle) -> ProviderResult<PoseSnapshot>;

    /// Returns the full published render state.
    ///
    /// # Errors
    ///
    /// `NotReady` when unavailable, `Failed` otherwise.
    fn query_render_state(&self, entity: EntityHandle) -> ProviderResult<RenderStateSnapshot>;

    /// Returns the descriptor of primitive `index` of the render state.
    ///
    /// # Errors
    ///
    /// `PrimitiveIndexOutOfRange` or `Failed`.
    fn query_primitive_render_state(
        &self,
        entity: EntityHandle,
        index: u32,
    ) -> ProviderResult<PrimitiveRenderState>;

    /// Number of provider operations still outstanding for `entity`.
    fn pending_count(&self, entity: EntityHandle) -> u32;

    /// Resolves a well-known joint to its node in the current hierarchy.
    fn node_for_joint_type(&self, entity: EntityHandle, joint: JointType) -> Option<NodeId>;

    /// Looks up a shared primitive asset.
    fn asset(&self, id: PrimitiveId) -> Option<Arc<PrimitiveAsset>>;
}
