//! Skeleton rebuilds: joint identity, destruction order, joint roles and
//! skinned remapping across hierarchy changes.

mod common;

use std::collections::{HashMap, HashSet};

use common::*;
use marionette_core::{JointType, Transform, VersionToken};
use marionette_entity::skeleton::{JointParent, SkeletonBuild};
use marionette_entity::{EntityConfig, PrimitiveFailurePolicy, Skeleton, TickStatus};
use marionette_provider::{ContentTier, PoseSnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_unchanged_nodes_keep_their_proxy() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig::default());
    provider.publish_skeleton(ENTITY, pose(&[(1, -1), (2, 0), (3, 1), (4, 2)]));
    settle(&mut avatar, &provider);

    let before: HashMap<_, _> = avatar
        .scene()
        .skeleton
        .joints()
        .iter()
        .map(|j| (j.node_id, j.proxy))
        .collect();

    // Reordered, node 4 gone, node 5 new, node 2 reparented under 3.
    provider.publish_skeleton(ENTITY, pose(&[(1, -1), (3, 0), (5, 1), (2, 1)]));
    let statuses = settle(&mut avatar, &provider);
    let diff = committed(&statuses)[0].skeleton.clone().expect("hierarchy commit");
    assert_eq!((diff.carried, diff.created), (3, 1));
    assert_eq!(diff.destroyed, vec![n(4)]);

    let skeleton = &avatar.scene().skeleton;
    for node in [1, 2, 3] {
        let index = skeleton.index_for_node(n(node)).expect("kept node");
        assert_eq!(skeleton.joints()[index].proxy, before[&n(node)], "node {node}");
    }
    let fresh = skeleton.joints()[2].proxy;
    assert_eq!(skeleton.joints()[2].node_id, n(5));
    assert!(!before.values().any(|&h| h == fresh));

    let two = skeleton.proxy(before[&n(2)]).expect("live proxy");
    assert_eq!(two.parent, JointParent::Joint(before[&n(3)]));
    assert_eq!(skeleton.proxy_count(), 4);
    assert_eq!(skeleton.hierarchy(), VersionToken::new(2));
}

#[test]
fn test_removed_descendants_destroyed_first() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig::default());
    provider.publish_skeleton(ENTITY, pose(&[(1, -1), (2, 0), (3, 1), (4, 2), (5, 0)]));
    settle(&mut avatar, &provider);

    provider.publish_skeleton(ENTITY, pose(&[(1, -1), (5, 0)]));
    let statuses = settle(&mut avatar, &provider);
    let diff = committed(&statuses)[0].skeleton.clone().expect("hierarchy commit");
    assert_eq!(diff.destroyed, vec![n(4), n(3), n(2)]);
}

fn random_pose(rng: &mut StdRng, count: usize) -> Vec<i32> {
    (0..count)
        .map(|i| if i == 0 { -1 } else { i32::try_from(rng.gen_range(0..i)).unwrap() })
        .collect()
}

fn commit(
    skeleton: &mut Skeleton,
    version: u32,
    nodes: &[u32],
    parents: &[i32],
) -> Vec<marionette_core::NodeId> {
    let joints = nodes
        .iter()
        .zip(parents)
        .map(|(&node, &parent)| (node, parent))
        .collect::<Vec<_>>();
    let mut build = SkeletonBuild::new(PoseSnapshot {
        hierarchy: VersionToken::new(version),
        joints: pose(&joints),
    })
    .expect("valid pose");
    while !build.advance(skeleton, 3) {}
    build.commit(skeleton, HashMap::new()).destroyed
}

#[test]
fn test_destruction_order_random_trees() {
    let mut rng = StdRng::seed_from_u64(0xDE57);

    for round in 0..50 {
        let count = rng.gen_range(4..32);
        let parents = random_pose(&mut rng, count);
        let nodes: Vec<u32> = (1..=u32::try_from(count).unwrap()).collect();
        let mut skeleton = Skeleton::new();
        commit(&mut skeleton, 1, &nodes, &parents);

        // Keep the root and a random subset; survivors attach to their
        // nearest surviving ancestor.
        let kept: Vec<usize> = (0..count).filter(|&i| i == 0 || rng.gen_bool(0.4)).collect();
        let new_index: HashMap<usize, usize> =
            kept.iter().enumerate().map(|(new, &old)| (old, new)).collect();
        let new_parents: Vec<i32> = kept
            .iter()
            .map(|&old| {
                let mut parent = parents[old];
                while parent >= 0 && !new_index.contains_key(&usize::try_from(parent).unwrap()) {
                    parent = parents[usize::try_from(parent).unwrap()];
                }
                if parent < 0 {
                    -1
                } else {
                    i32::try_from(new_index[&usize::try_from(parent).unwrap()]).unwrap()
                }
            })
            .collect();
        let new_nodes: Vec<u32> = kept.iter().map(|&i| nodes[i]).collect();

        let destroyed = commit(&mut skeleton, 2, &new_nodes, &new_parents);
        let kept_set: HashSet<usize> = kept.iter().copied().collect();
        assert_eq!(destroyed.len(), count - kept.len(), "round {round}");

        let position: HashMap<_, _> =
            destroyed.iter().enumerate().map(|(i, node)| (*node, i)).collect();
        for removed in (0..count).filter(|i| !kept_set.contains(i)) {
            let mut ancestor = parents[removed];
            while ancestor >= 0 {
                let a = usize::try_from(ancestor).unwrap();
                if !kept_set.contains(&a) {
                    assert!(
                        position[&n(nodes[removed])] < position[&n(nodes[a])],
                        "round {round}: {} destroyed after ancestor {}",
                        nodes[removed],
                        nodes[a]
                    );
                }
                ancestor = parents[a];
            }
        }
        assert_eq!(skeleton.proxy_count(), kept.len());
    }
}

#[test]
fn test_critical_joints_resolved_on_commit() {
    let provider = provider();
    provider.set_joint_type(ENTITY, JointType::Head, n(3));
    provider.set_joint_type(ENTITY, JointType::LeftWrist, n(99));
    let (mut avatar, _events) = avatar(EntityConfig::default());
    provider.publish_skeleton(ENTITY, chain(&[1, 2, 3]));
    settle(&mut avatar, &provider);

    assert_eq!(avatar.node_for_type(JointType::Head), Some(n(3)));
    assert_eq!(avatar.skeleton_joint_for_type(JointType::Head).map(|j| j.node_id), Some(n(3)));
    // Resolves outside the skeleton.
    assert_eq!(avatar.node_for_type(JointType::LeftWrist), None);
    // Never resolved by the provider.
    assert_eq!(avatar.node_for_type(JointType::Hips), None);
    // Not a critical joint.
    provider.set_joint_type(ENTITY, JointType::Neck, n(2));
    provider.publish_skeleton(ENTITY, chain(&[1, 2, 3]));
    settle(&mut avatar, &provider);
    assert_eq!(avatar.node_for_type(JointType::Neck), None);
    assert_eq!(avatar.index_for_node(n(3)), Some(2));
    assert_eq!(avatar.skeleton_joint(1).map(|j| j.node_id), Some(n(2)));
}

#[test]
fn test_kept_renderables_remapped_on_hierarchy_change() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig::default());
    provider.publish_skeleton(ENTITY, chain(&[1, 2, 3]));
    provider.publish_render(
        ENTITY,
        render_all(
            vec![loaded_mesh(&provider, 100, 1, &[3, 2]), loaded_mesh(&provider, 101, 2, &[2])],
            ContentTier::User,
        ),
    );
    settle(&mut avatar, &provider);
    let body = avatar.renderables().for_mesh_node(n(100))[0];
    assert_eq!(avatar.renderables().get(body).map(|r| r.joint_indices.clone()), Some(vec![2, 1]));

    provider.publish_skeleton(ENTITY, pose(&[(1, -1), (3, 0), (2, 1)]));
    let statuses = settle(&mut avatar, &provider);
    let report = committed(&statuses)[0];
    assert_eq!((report.built, report.removed, report.skipped), (0, 0, 0));

    assert_eq!(avatar.renderables().for_mesh_node(n(100)), &[body]);
    assert_eq!(avatar.renderables().get(body).map(|r| r.joint_indices.clone()), Some(vec![1, 2]));
}

#[test]
fn test_kept_renderable_follows_reissued_joint_nodes() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig::default());
    provider.publish_skeleton(ENTITY, chain(&[1, 2]));
    let mesh = loaded_mesh(&provider, 100, 1, &[2]);
    provider.publish_render(ENTITY, render_all(vec![mesh], ContentTier::User));
    settle(&mut avatar, &provider);
    let body = avatar.renderables().for_mesh_node(n(100))[0];

    // Joint 2 is replaced by a new node 3; the mesh is re-described against it.
    provider.publish_skeleton(ENTITY, chain(&[1, 3]));
    let mut mesh = loaded_mesh(&provider, 100, 1, &[3]);
    mesh.skinning_origin = Transform::from_position([0.0, 0.5, 0.0]);
    provider.publish_render(ENTITY, render_all(vec![mesh], ContentTier::User));
    let statuses = settle(&mut avatar, &provider);
    let report = committed(&statuses)[0];
    assert_eq!((report.built, report.removed, report.skipped), (0, 0, 0));
    assert_eq!(report.visible, 1);

    assert_eq!(avatar.renderables().for_mesh_node(n(100)), &[body]);
    let renderable = avatar.renderables().get(body).expect("kept");
    assert_eq!(renderable.joint_nodes, vec![n(3)]);
    assert_eq!(renderable.joint_indices, vec![1]);
    assert_eq!(renderable.skinning_origin.position, [0.0, 0.5, 0.0]);
    assert_eq!(avatar.scene().visible_nodes(), vec![n(100)]);
}

#[test]
fn test_vanished_joint_skips_renderable() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig::default());
    provider.publish_skeleton(ENTITY, chain(&[1, 2, 3]));
    provider.publish_render(
        ENTITY,
        render_all(
            vec![loaded_mesh(&provider, 100, 1, &[3]), loaded_mesh(&provider, 101, 2, &[1])],
            ContentTier::User,
        ),
    );
    settle(&mut avatar, &provider);
    let cost_before = avatar.lod().total_cost();

    provider.publish_skeleton(ENTITY, chain(&[1, 2]));
    let statuses = settle(&mut avatar, &provider);
    let report = committed(&statuses)[0];
    assert_eq!((report.skipped, report.removed), (1, 1));

    assert!(avatar.renderables().for_mesh_node(n(100)).is_empty());
    assert_eq!(avatar.renderables().len(), 1);
    assert_eq!(avatar.scene().visible_nodes(), vec![n(101)]);
    assert!(avatar.lod().total_cost().vertices < cost_before.vertices);
}

#[test]
fn test_vanished_joint_fails_entity_under_strict_policy() {
    let provider = provider();
    let (mut avatar, _events) = avatar(EntityConfig {
        failure_policy: PrimitiveFailurePolicy::FailEntity,
        ..EntityConfig::default()
    });
    provider.publish_skeleton(ENTITY, chain(&[1, 2, 3]));
    let mesh = loaded_mesh(&provider, 100, 1, &[3]);
    provider.publish_render(ENTITY, render_all(vec![mesh], ContentTier::User));
    settle(&mut avatar, &provider);

    provider.publish_skeleton(ENTITY, chain(&[1, 2]));
    let statuses = settle(&mut avatar, &provider);
    assert!(matches!(
        statuses[0],
        TickStatus::Failed(marionette_entity::LoadError::JointMapping { .. })
    ));
    assert_eq!(avatar.skeleton_joint_count(), 3);
    assert_eq!(avatar.renderables().len(), 1);
}
