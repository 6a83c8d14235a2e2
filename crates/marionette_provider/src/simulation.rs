//! # Scripted Provider
//!
//! An in-memory [`AvatarProvider`] whose published state is driven by the
//! caller. Tests, benches and the headless simulator use it in place of the
//! native SDK.
//!
//! Every publish bumps the relevant version tokens the way the native
//! provider does:
//!
//! | Call | hierarchy | all_nodes | visible_nodes |
//! |------|-----------|-----------|---------------|
//! | `publish_skeleton` | bumped | - | - |
//! | `publish_render` | - | bumped | bumped |
//! | `set_visible` | - | - | bumped |
//!
//! Failures can be injected per query to exercise error paths.

use std::collections::HashMap;
use std::sync::Arc;

use marionette_core::{
    EntityHandle, JointType, NodeId, PrimitiveId, VersionToken, VersionTriple,
};
use parking_lot::Mutex;

use crate::assets::{AssetRegistry, PrimitiveAsset};
use crate::error::{ProviderError, ProviderResult};
use crate::provider::{
    AvatarProvider, ContentTier, PoseJoint, PoseSnapshot, PrimitiveRenderState,
    RenderStateSnapshot,
};

/// Render content handed to [`ScriptedProvider::publish_render`].
#[derive(Clone, Debug, Default)]
pub struct RenderPublish {
    /// Every mesh node. Sorted on publish.
    pub all_mesh_nodes: Vec<NodeId>,
    /// Visible mesh nodes. Sorted on publish.
    pub visible_mesh_nodes: Vec<NodeId>,
    /// Per-primitive descriptors, queryable by index.
    pub primitives: Vec<PrimitiveRenderState>,
    /// Content tier that produced this state.
    pub tier: ContentTier,
}

#[derive(Debug, Default)]
struct ScriptedEntity {
    versions: VersionTriple,
    joints: Vec<PoseJoint>,
    render: RenderPublish,
    pending: u32,
    joint_types: HashMap<JointType, NodeId>,
    pose_error: Option<ProviderError>,
    render_error: Option<ProviderError>,
    primitive_errors: HashMap<u32, ProviderError>,
}

/// Caller-driven avatar provider.
///
/// # Thread Safety
///
/// All state sits behind a mutex so a loader thread can publish alongside
/// the simulation thread.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    entities: Mutex<HashMap<EntityHandle, ScriptedEntity>>,
    assets: AssetRegistry,
}

impl ScriptedProvider {
    /// Creates a provider with no entities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `entity` known. Nothing is published yet.
    pub fn register_entity(&self, entity: EntityHandle) {
        self.entities.lock().entry(entity).or_default();
    }

    /// Forgets `entity` and everything published for it.
    pub fn remove_entity(&self, entity: EntityHandle) {
        self.entities.lock().remove(&entity);
    }

    /// Publishes a new skeleton and returns its hierarchy version.
    pub fn publish_skeleton(&self, entity: EntityHandle, joints: Vec<PoseJoint>) -> VersionToken {
        let mut entities = self.entities.lock();
        let state = entities.entry(entity).or_default();
        state.joints = joints;
        state.versions.hierarchy = state.versions.hierarchy.next();
        tracing::trace!("{} published hierarchy {}", entity, state.versions.hierarchy);
        state.versions.hierarchy
    }

    /// Publishes new render content and returns the resulting triple.
    pub fn publish_render(&self, entity: EntityHandle, mut render: RenderPublish) -> VersionTriple {
        render.all_mesh_nodes.sort_unstable();
        render.visible_mesh_nodes.sort_unstable();

        let mut entities = self.entities.lock();
        let state = entities.entry(entity).or_default();
        state.render = render;
        state.versions.all_nodes = state.versions.all_nodes.next();
        state.versions.visible_nodes = state.versions.visible_nodes.next();
        state.versions
    }

    /// Replaces the visible subset and returns the resulting triple.
    pub fn set_visible(&self, entity: EntityHandle, mut visible: Vec<NodeId>) -> VersionTriple {
        visible.sort_unstable();

        let mut entities = self.entities.lock();
        let state = entities.entry(entity).or_default();
        state.render.visible_mesh_nodes = visible;
        state.versions.visible_nodes = state.versions.visible_nodes.next();
        state.versions
    }

    /// Sets the number of outstanding provider operations for `entity`.
    pub fn set_pending(&self, entity: EntityHandle, pending: u32) {
        self.entities.lock().entry(entity).or_default().pending = pending;
    }

    /// Maps a well-known joint to a node.
    pub fn set_joint_type(&self, entity: EntityHandle, joint: JointType, node: NodeId) {
        self.entities
            .lock()
            .entry(entity)
            .or_default()
            .joint_types
            .insert(joint, node);
    }

    /// Makes pose queries fail with `error` until cleared with `None`.
    pub fn inject_pose_error(&self, entity: EntityHandle, error: Option<ProviderError>) {
        self.entities.lock().entry(entity).or_default().pose_error = error;
    }

    /// Makes render state queries fail with `error` until cleared with `None`.
    pub fn inject_render_error(&self, entity: EntityHandle, error: Option<ProviderError>) {
        self.entities.lock().entry(entity).or_default().render_error = error;
    }

    /// Makes queries of primitive `index` fail with `error` until cleared.
    pub fn inject_primitive_error(
        &self,
        entity: EntityHandle,
        index: u32,
        error: Option<ProviderError>,
    ) {
        let mut entities = self.entities.lock();
        let errors = &mut entities.entry(entity).or_default().primitive_errors;
        match error {
            Some(error) => {
                errors.insert(index, error);
            }
            None => {
                errors.remove(&index);
            }
        }
    }

    /// The shared asset registry.
    #[must_use]
    pub const fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    /// Registers a built asset and returns the shared handle.
    pub fn register_asset(&self, asset: PrimitiveAsset) -> Arc<PrimitiveAsset> {
        self.assets.insert(asset)
    }

    /// Registers a still-loading asset and returns the shared handle.
    pub fn request_asset(&self, id: PrimitiveId) -> Arc<PrimitiveAsset> {
        self.assets.request(id)
    }

    fn with_entity<R>(
        &self,
        entity: EntityHandle,
        f: impl FnOnce(&ScriptedEntity) -> ProviderResult<R>,
    ) -> ProviderResult<R> {
        let entities = self.entities.lock();
        let state = entities
            .get(&entity)
            .ok_or(ProviderError::UnknownEntity(entity))?;
        f(state)
    }
}

impl AvatarProvider for ScriptedProvider {
    fn published_versions(&self, entity: EntityHandle) -> ProviderResult<VersionTriple> {
        self.with_entity(entity, |state| {
            if state.versions.hierarchy.is_valid() {
                Ok(state.versions)
            } else {
                Err(ProviderError::NotReady)
            }
        })
    }

    fn query_pose(&self, entity: EntityHandle) -> ProviderResult<PoseSnapshot> {
        self.with_entity(entity, |state| {
            if let Some(error) = &state.pose_error {
                return Err(error.clone());
            }
            if !state.versions.hierarchy.is_valid() {
                return Err(ProviderError::NotReady);
            }
            Ok(PoseSnapshot {
                hierarchy: state.versions.hierarchy,
                joints: state.joints.clone(),
            })
        })
    }

    fn query_render_state(&self, entity: EntityHandle) -> ProviderResult<RenderStateSnapshot> {
        self.with_entity(entity, |state| {
            if let Some(error) = &state.render_error {
                return Err(error.clone());
            }
            if !state.versions.all_nodes.is_valid() {
                return Err(ProviderError::NotReady);
            }
            Ok(RenderStateSnapshot {
                versions: state.versions,
                all_mesh_nodes: state.render.all_mesh_nodes.clone(),
                visible_mesh_nodes: state.render.visible_mesh_nodes.clone(),
                primitive_count: u32::try_from(state.render.primitives.len())
                    .unwrap_or(u32::MAX),
                tier: state.render.tier,
            })
        })
    }

    fn query_primitive_render_state(
        &self,
        entity: EntityHandle,
        index: u32,
    ) -> ProviderResult<PrimitiveRenderState> {
        self.with_entity(entity, |state| {
            if let Some(error) = state.primitive_errors.get(&index) {
                return Err(error.clone());
            }
            let count = u32::try_from(state.render.primitives.len()).unwrap_or(u32::MAX);
            state
                .render
                .primitives
                .get(index as usize)
                .cloned()
                .ok_or(ProviderError::PrimitiveIndexOutOfRange { index, count })
        })
    }

    fn pending_count(&self, entity: EntityHandle) -> u32 {
        self.entities
            .lock()
            .get(&entity)
            .map_or(0, |state| state.pending)
    }

    fn node_for_joint_type(&self, entity: EntityHandle, joint: JointType) -> Option<NodeId> {
        self.entities
            .lock()
            .get(&entity)
            .and_then(|state| state.joint_types.get(&joint).copied())
    }

    fn asset(&self, id: PrimitiveId) -> Option<Arc<PrimitiveAsset>> {
        self.assets.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marionette_core::{InstanceId, Transform};

    fn entity() -> EntityHandle {
        EntityHandle::new(1)
    }

    fn joints() -> Vec<PoseJoint> {
        vec![
            PoseJoint::new(NodeId::new(10), -1, "root"),
            PoseJoint::new(NodeId::new(11), 0, "spine"),
        ]
    }

    #[test]
    fn test_unknown_and_unpublished() {
        let provider = ScriptedProvider::new();
        assert_eq!(
            provider.published_versions(entity()),
            Err(ProviderError::UnknownEntity(entity()))
        );

        provider.register_entity(entity());
        assert_eq!(provider.query_pose(entity()), Err(ProviderError::NotReady));
        assert_eq!(
            provider.query_render_state(entity()),
            Err(ProviderError::NotReady)
        );
    }

    #[test]
    fn test_publish_bumps_versions() {
        let provider = ScriptedProvider::new();
        let h1 = provider.publish_skeleton(entity(), joints());
        let h2 = provider.publish_skeleton(entity(), joints());
        assert!(h2 > h1);

        let triple = provider.publish_render(
            entity(),
            RenderPublish {
                all_mesh_nodes: vec![NodeId::new(3), NodeId::new(1)],
                visible_mesh_nodes: vec![NodeId::new(3)],
                ..RenderPublish::default()
            },
        );
        assert_eq!(triple.hierarchy, h2);
        assert!(triple.all_nodes.is_valid());

        let after = provider.set_visible(entity(), vec![NodeId::new(1)]);
        assert_eq!(after.all_nodes, triple.all_nodes);
        assert!(after.visible_nodes > triple.visible_nodes);

        let state = provider.query_render_state(entity());
        assert_eq!(
            state.map(|s| s.all_mesh_nodes),
            Ok(vec![NodeId::new(1), NodeId::new(3)])
        );
    }

    #[test]
    fn test_primitive_queries() {
        let provider = ScriptedProvider::new();
        provider.publish_render(
            entity(),
            RenderPublish {
                primitives: vec![PrimitiveRenderState {
                    mesh_node_id: NodeId::new(1),
                    primitive_id: PrimitiveId::new(100),
                    instance_id: InstanceId::new(0),
                    joint_pose_mapping: Vec::new(),
                    skinning_origin: Transform::IDENTITY,
                }],
                ..RenderPublish::default()
            },
        );

        assert!(provider.query_primitive_render_state(entity(), 0).is_ok());
        assert_eq!(
            provider.query_primitive_render_state(entity(), 1),
            Err(ProviderError::PrimitiveIndexOutOfRange { index: 1, count: 1 })
        );

        provider.inject_primitive_error(entity(), 0, Some(ProviderError::Failed("io".into())));
        assert!(provider.query_primitive_render_state(entity(), 0).is_err());
        provider.inject_primitive_error(entity(), 0, None);
        assert!(provider.query_primitive_render_state(entity(), 0).is_ok());
    }

    #[test]
    fn test_injected_pose_error() {
        let provider = ScriptedProvider::new();
        provider.publish_skeleton(entity(), joints());
        provider.inject_pose_error(entity(), Some(ProviderError::Failed("decode".into())));
        assert!(matches!(
            provider.query_pose(entity()),
            Err(ProviderError::Failed(_))
        ));
    }

    #[test]
    fn test_pending_and_joint_types() {
        let provider = ScriptedProvider::new();
        assert_eq!(provider.pending_count(entity()), 0);
        provider.set_pending(entity(), 2);
        assert_eq!(provider.pending_count(entity()), 2);

        provider.set_joint_type(entity(), JointType::Head, NodeId::new(42));
        assert_eq!(
            provider.node_for_joint_type(entity(), JointType::Head),
            Some(NodeId::new(42))
        );
        assert_eq!(provider.node_for_joint_type(entity(), JointType::Hips), None);
    }
}
