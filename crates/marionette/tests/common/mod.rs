//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use crossbeam_channel::Receiver;
use marionette_core::{EntityHandle, InstanceId, NodeId, PrimitiveId, Transform};
use marionette_entity::{
    AvatarEntity, ChannelListener, EntityConfig, EntityEvent, FrameBudget, TickStatus,
};
use marionette_provider::{
    AvatarProvider, ContentTier, LodFlags, PoseJoint, PrimitiveAsset, PrimitiveCost,
    PrimitiveData, PrimitiveRenderState, RenderPublish, ScriptedProvider,
};

pub const ENTITY: EntityHandle = EntityHandle::new(1);

pub fn n(raw: u32) -> NodeId {
    NodeId::new(raw)
}

/// Joints as `(node, parent index)` pairs.
pub fn pose(joints: &[(u32, i32)]) -> Vec<PoseJoint> {
    joints
        .iter()
        .map(|&(node, parent)| PoseJoint::new(n(node), parent, format!("joint_{node}")))
        .collect()
}

/// A straight chain over `nodes`.
pub fn chain(nodes: &[u32]) -> Vec<PoseJoint> {
    nodes
        .iter()
        .enumerate()
        .map(|(i, &node)| {
            let parent = i32::try_from(i).unwrap() - 1;
            PoseJoint::new(n(node), parent, format!("joint_{node}"))
        })
        .collect()
}

pub fn data(skin: &[u32], bucket: u8, vertices: u32) -> PrimitiveData {
    PrimitiveData {
        joint_names: skin.iter().map(|j| format!("joint_{j}")).collect(),
        lod_flags: LodFlags::single(bucket),
        cost: PrimitiveCost::new(
            vertices,
            vertices / 3,
            if skin.is_empty() { 0 } else { vertices },
        ),
    }
}

pub fn descriptor(mesh_node: u32, primitive: u64, skin: &[u32]) -> PrimitiveRenderState {
    PrimitiveRenderState {
        mesh_node_id: n(mesh_node),
        primitive_id: PrimitiveId::new(primitive),
        instance_id: InstanceId::new(mesh_node),
        joint_pose_mapping: skin.iter().map(|&j| n(j)).collect(),
        skinning_origin: Transform::IDENTITY,
    }
}

/// Registers a loaded asset and returns its descriptor.
pub fn loaded_mesh(
    provider: &ScriptedProvider,
    mesh_node: u32,
    primitive: u64,
    skin: &[u32],
) -> PrimitiveRenderState {
    let id = PrimitiveId::new(primitive);
    if provider.assets().get(id).is_none() {
        provider.register_asset(PrimitiveAsset::loaded(id, data(skin, 0, 300)));
    }
    descriptor(mesh_node, primitive, skin)
}

/// Registers a still-loading asset and returns its descriptor and handle.
pub fn pending_mesh(
    provider: &ScriptedProvider,
    mesh_node: u32,
    primitive: u64,
) -> (PrimitiveRenderState, Arc<PrimitiveAsset>) {
    let asset = provider.request_asset(PrimitiveId::new(primitive));
    (descriptor(mesh_node, primitive, &[]), asset)
}

/// Every described mesh node visible.
pub fn render_all(primitives: Vec<PrimitiveRenderState>, tier: ContentTier) -> RenderPublish {
    let nodes: Vec<NodeId> = primitives.iter().map(|p| p.mesh_node_id).collect();
    RenderPublish {
        all_mesh_nodes: nodes.clone(),
        visible_mesh_nodes: nodes,
        primitives,
        tier,
    }
}

pub fn provider() -> ScriptedProvider {
    let provider = ScriptedProvider::new();
    provider.register_entity(ENTITY);
    provider
}

/// An initialized entity with a channel listener attached.
pub fn avatar(config: EntityConfig) -> (AvatarEntity, Receiver<(EntityHandle, EntityEvent)>) {
    let mut avatar = AvatarEntity::new(ENTITY, config);
    let (listener, events) = ChannelListener::unbounded();
    avatar.add_listener(listener);
    avatar.initialize();
    (avatar, events)
}

pub fn events(receiver: &Receiver<(EntityHandle, EntityEvent)>) -> Vec<EntityEvent> {
    receiver.try_iter().map(|(_, event)| event).collect()
}

/// Ticks with an unlimited budget until the entity reports `Synced`.
pub fn settle(avatar: &mut AvatarEntity, provider: &dyn AvatarProvider) -> Vec<TickStatus> {
    let mut statuses = Vec::new();
    for _ in 0..64 {
        let status = avatar.tick(provider, &mut FrameBudget::unlimited());
        let synced = status == TickStatus::Synced;
        statuses.push(status);
        if synced {
            return statuses;
        }
    }
    panic!("entity never settled: {statuses:?}");
}

pub fn committed(statuses: &[TickStatus]) -> Vec<&marionette_entity::CommitReport> {
    statuses
        .iter()
        .filter_map(|s| match s {
            TickStatus::Committed(report) => Some(report),
            _ => None,
        })
        .collect()
}
