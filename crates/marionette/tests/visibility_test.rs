//! Visibility reconciliation through full entity rebuilds, with LOD cost
//! accounting checked against independently summed costs.

mod common;

use common::*;
use marionette_core::{InstanceId, NodeId, PrimitiveId, RebuildKind};
use marionette_entity::{EntityConfig, LodCost};
use marionette_provider::{ContentTier, PrimitiveAsset, PrimitiveRenderState, ScriptedProvider};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A mesh with its own asset, LOD bucket and vertex count.
fn mesh(provider: &ScriptedProvider, node: u32, bucket: u8, vertices: u32) -> PrimitiveRenderState {
    let primitive = u64::from(node);
    provider.register_asset(PrimitiveAsset::loaded(
        PrimitiveId::new(primitive),
        data(&[], bucket, vertices),
    ));
    descriptor(node, primitive, &[])
}

fn expected_cost(vertices: &[(u32, u32)], visible: &[NodeId]) -> LodCost {
    let mut cost = LodCost::ZERO;
    for &(node, v) in vertices {
        if visible.contains(&n(node)) {
            cost.vertices += u64::from(v);
            cost.triangles += u64::from(v / 3);
        }
    }
    cost
}

#[test]
fn test_visible_subset_of_all_nodes() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig::default());
    provider.publish_skeleton(ENTITY, chain(&[1]));
    let meshes = (101..=104).map(|node| mesh(&provider, node, 0, 300)).collect();
    provider.publish_render(ENTITY, render_all(meshes, ContentTier::User));
    provider.set_visible(ENTITY, vec![n(104), n(102)]);
    settle(&mut avatar, &provider);

    assert_eq!(avatar.renderables().len(), 4);
    assert_eq!(avatar.scene().visible_nodes(), vec![n(102), n(104)]);
    assert_eq!(avatar.visible().len(), 2);
    assert_eq!(avatar.lod().total_cost().vertices, 600);
    for node in [101, 103] {
        let handle = avatar.renderables().for_mesh_node(n(node))[0];
        assert!(!avatar.renderables().get(handle).expect("committed").visible);
    }
}

#[test]
fn test_visibility_toggles_keep_cost_exact() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig::default());
    let mut rng = StdRng::seed_from_u64(0x1_0D5);

    let vertices: Vec<(u32, u32)> =
        (200..212).map(|node| (node, rng.gen_range(30..5_000))).collect();
    provider.publish_skeleton(ENTITY, chain(&[1]));
    let meshes = vertices
        .iter()
        .map(|&(node, v)| mesh(&provider, node, u8::try_from(node % 4).unwrap(), v))
        .collect();
    provider.publish_render(ENTITY, render_all(meshes, ContentTier::User));
    settle(&mut avatar, &provider);

    let all: Vec<NodeId> = vertices.iter().map(|&(node, _)| n(node)).collect();
    let full = avatar.lod().total_cost();
    assert_eq!(full, expected_cost(&vertices, &all));

    for round in 0..40 {
        let subset: Vec<NodeId> = all.iter().copied().filter(|_| rng.gen_bool(0.5)).collect();
        provider.set_visible(ENTITY, subset.clone());
        let statuses = settle(&mut avatar, &provider);

        let report = committed(&statuses)[0];
        assert_eq!(report.kind, RebuildKind::Visibility);
        assert_eq!((report.built, report.removed), (0, 0), "round {round}");
        assert_eq!(avatar.lod().total_cost(), expected_cost(&vertices, &subset), "round {round}");
        assert_eq!(avatar.scene().visible_nodes(), subset);
    }

    provider.set_visible(ENTITY, all);
    settle(&mut avatar, &provider);
    assert_eq!(avatar.lod().total_cost(), full);
}

#[test]
fn test_lod_range_follows_visible_buckets() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig::default());
    provider.publish_skeleton(ENTITY, chain(&[1]));
    let meshes = vec![mesh(&provider, 301, 1, 100), mesh(&provider, 302, 3, 100)];
    provider.publish_render(ENTITY, render_all(meshes, ContentTier::User));
    settle(&mut avatar, &provider);
    assert_eq!(avatar.lod().range(), Some((1, 3)));
    assert_eq!(avatar.lod().bucket(3).map(|b| b.len()), Some(1));

    provider.set_visible(ENTITY, vec![n(301)]);
    settle(&mut avatar, &provider);
    assert_eq!(avatar.lod().range(), Some((1, 1)));
    assert!(avatar.lod().bucket(3).is_some_and(|b| b.is_empty()));

    provider.set_visible(ENTITY, Vec::new());
    settle(&mut avatar, &provider);
    assert_eq!(avatar.lod().range(), None);
    assert!(avatar.lod().total_cost().is_zero());
    assert_eq!(avatar.renderables().len(), 2);
}

#[test]
fn test_dropped_nodes_leave_lod_accounting() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig::default());
    provider.publish_skeleton(ENTITY, chain(&[1]));
    let a = mesh(&provider, 401, 0, 120);
    let b = mesh(&provider, 402, 2, 900);
    provider.publish_render(ENTITY, render_all(vec![a.clone(), b], ContentTier::User));
    settle(&mut avatar, &provider);
    assert_eq!(avatar.lod().total_cost().vertices, 1_020);

    provider.publish_render(ENTITY, render_all(vec![a], ContentTier::User));
    let statuses = settle(&mut avatar, &provider);
    let report = committed(&statuses)[0];
    assert_eq!((report.removed, report.built, report.visible), (1, 0, 1));

    assert_eq!(avatar.renderables().len(), 1);
    assert_eq!(avatar.lod().total_cost().vertices, 120);
    assert_eq!(avatar.lod().range(), Some((0, 0)));
}

#[test]
fn test_unknown_visible_nodes_ignored() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig::default());
    provider.publish_skeleton(ENTITY, chain(&[1]));
    let shown = mesh(&provider, 501, 0, 60);
    provider.publish_render(ENTITY, render_all(vec![shown], ContentTier::User));
    provider.set_visible(ENTITY, vec![n(501), n(999)]);
    settle(&mut avatar, &provider);

    assert_eq!(avatar.scene().visible_nodes(), vec![n(501)]);
    assert_eq!(avatar.lod().total_cost().vertices, 60);
}

#[test]
fn test_shared_mesh_node_toggles_every_primitive() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig::default());
    provider.publish_skeleton(ENTITY, chain(&[1]));

    // Two primitives drawn by the same mesh node, as separate instances.
    let mut primitives = Vec::new();
    for (primitive, instance) in [(61u64, 6_001u32), (62, 6_002)] {
        let asset = PrimitiveAsset::loaded(PrimitiveId::new(primitive), data(&[], 0, 50));
        provider.register_asset(asset);
        let mut state = descriptor(600, primitive, &[]);
        state.instance_id = InstanceId::new(instance);
        primitives.push(state);
    }
    primitives.push(mesh(&provider, 601, 0, 10));
    provider.publish_render(
        ENTITY,
        marionette_provider::RenderPublish {
            all_mesh_nodes: vec![n(600), n(601)],
            visible_mesh_nodes: vec![n(600), n(601)],
            primitives,
            tier: ContentTier::User,
        },
    );
    settle(&mut avatar, &provider);
    assert_eq!(avatar.renderables().for_mesh_node(n(600)).len(), 2);
    assert_eq!(avatar.visible().len(), 3);
    assert_eq!(avatar.lod().total_cost().vertices, 110);

    provider.set_visible(ENTITY, vec![n(601)]);
    settle(&mut avatar, &provider);
    assert_eq!(avatar.visible().len(), 1);
    assert_eq!(avatar.lod().total_cost().vertices, 10);
    assert_eq!(avatar.lod().bucket(0).map(|b| b.len()), Some(1));
}
