//! # Skeleton Builder
//!
//! Reconciles the provider's flat pose array against the committed skeleton.
//!
//! ## Rebuild
//!
//! ```text
//! 1. node id -> new index map, built in one pass      (SkeletonBuild::new)
//! 2. existing node id  -> carry the joint proxy over  (advance, batched)
//! 3. new node id       -> stage a fresh proxy
//! 4. reparent every joint to its new parent           (commit)
//! 5. destroy stale joints, deepest first
//! 6. swap in node id -> index and joint type -> node maps
//! ```
//!
//! Nothing touches the committed [`Skeleton`] before `commit`. Dropping a
//! [`SkeletonBuild`] releases every staged proxy.

use std::collections::HashMap;

use marionette_core::{Handle, JointType, NodeId, ProxyPool, Transform, VersionToken};
use marionette_provider::{PoseJoint, PoseSnapshot};

use crate::error::{LoadError, LoadResult};

/// Parent of a joint proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JointParent {
    /// The entity's base transform.
    Base,
    /// Another joint.
    Joint(Handle<JointProxy>),
}

/// Scene proxy owned by one joint slot.
#[derive(Clone, Debug, PartialEq)]
pub struct JointProxy {
    /// Debug name.
    pub name: String,
    /// Node the proxy stands for.
    pub node_id: NodeId,
    /// Current parent.
    pub parent: JointParent,
    /// Local transform.
    pub local: Transform,
}

/// One entry of the committed joint array.
#[derive(Clone, Debug, PartialEq)]
pub struct SkeletonJoint {
    /// Debug name.
    pub name: String,
    /// Owned proxy.
    pub proxy: Handle<JointProxy>,
    /// Parent joint index, `-1` for roots.
    pub parent_index: i32,
    /// Provider node id.
    pub node_id: NodeId,
}

/// What a skeleton commit changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SkeletonDiff {
    /// Joints whose proxy was carried over.
    pub carried: usize,
    /// Joints that got a new proxy.
    pub created: usize,
    /// Nodes of destroyed joints, in destruction order.
    pub destroyed: Vec<NodeId>,
}

/// Depth of every joint given its parent indices.
///
/// Roots (and joints with out-of-range parents) have depth 0. Parents need
/// not precede children.
#[must_use]
pub fn joint_depths(parents: &[i32]) -> Vec<u32> {
    let count = parents.len();
    let mut depths: Vec<Option<u32>> = vec![None; count];
    let mut chain = Vec::new();

    for start in 0..count {
        if depths[start].is_some() {
            continue;
        }
        chain.clear();
        let mut base = 0;
        let mut cursor = Some(start);
        while let Some(index) = cursor {
            if let Some(depth) = depths[index] {
                base = depth + 1;
                break;
            }
            // Cycles are a provider bug; stop walking instead of spinning.
            if chain.len() > count {
                break;
            }
            chain.push(index);
            cursor = usize::try_from(parents[index]).ok().filter(|&p| p < count);
        }
        for (offset, &index) in chain.iter().rev().enumerate() {
            depths[index] = Some(base + u32::try_from(offset).unwrap_or(u32::MAX));
        }
    }

    depths.into_iter().map(|d| d.unwrap_or(0)).collect()
}

/// The committed skeleton of one entity.
#[derive(Debug, Default)]
pub struct Skeleton {
    proxies: ProxyPool<JointProxy>,
    joints: Vec<SkeletonJoint>,
    node_to_index: HashMap<NodeId, u32>,
    type_to_node: HashMap<JointType, NodeId>,
    hierarchy: VersionToken,
}

impl Skeleton {
    /// Creates an empty skeleton.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hierarchy version of the committed joints.
    #[must_use]
    pub const fn hierarchy(&self) -> VersionToken {
        self.hierarchy
    }

    /// Number of joints.
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// The joint array.
    #[must_use]
    pub fn joints(&self) -> &[SkeletonJoint] {
        &self.joints
    }

    /// Joint at `index`.
    #[must_use]
    pub fn joint(&self, index: usize) -> Option<&SkeletonJoint> {
        self.joints.get(index)
    }

    /// Joint resolved for a well-known role.
    #[must_use]
    pub fn joint_for_type(&self, joint: JointType) -> Option<&SkeletonJoint> {
        let node = self.node_for_type(joint)?;
        let index = self.index_for_node(node)?;
        self.joints.get(index)
    }

    /// Node resolved for a well-known role.
    #[must_use]
    pub fn node_for_type(&self, joint: JointType) -> Option<NodeId> {
        self.type_to_node.get(&joint).copied()
    }

    /// Joint index of `node`.
    #[must_use]
    pub fn index_for_node(&self, node: NodeId) -> Option<usize> {
        self.node_to_index.get(&node).map(|&i| i as usize)
    }

    /// The node id to joint index map.
    #[must_use]
    pub const fn node_map(&self) -> &HashMap<NodeId, u32> {
        &self.node_to_index
    }

    /// The proxy behind a joint.
    #[must_use]
    pub fn proxy(&self, handle: Handle<JointProxy>) -> Option<&JointProxy> {
        self.proxies.get(handle)
    }

    /// Number of live joint proxies.
    #[must_use]
    pub const fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    /// Destroys every joint, deepest first. Returns the destruction order.
    pub fn clear(&mut self) -> Vec<NodeId> {
        let parents: Vec<i32> = self.joints.iter().map(|j| j.parent_index).collect();
        let all: Vec<usize> = (0..self.joints.len()).collect();
        let order = Self::destroy(&mut self.proxies, &self.joints, &parents, all);
        self.joints.clear();
        self.node_to_index.clear();
        self.type_to_node.clear();
        self.hierarchy = VersionToken::INVALID;
        order
    }

    fn destroy(
        proxies: &mut ProxyPool<JointProxy>,
        joints: &[SkeletonJoint],
        parents: &[i32],
        mut stale: Vec<usize>,
    ) -> Vec<NodeId> {
        let depths = joint_depths(parents);
        stale.sort_by_key(|&index| std::cmp::Reverse(depths[index]));

        let mut order = Vec::with_capacity(stale.len());
        for index in stale {
            let joint = &joints[index];
            if proxies.remove(joint.proxy).is_none() {
                tracing::warn!("Joint proxy for {} already released", joint.node_id);
            }
            order.push(joint.node_id);
        }
        order
    }
}

#[derive(Debug)]
enum StagedJoint {
    Carried(Handle<JointProxy>),
    Created(JointProxy),
}

/// A skeleton rebuild in progress.
#[derive(Debug)]
pub struct SkeletonBuild {
    hierarchy: VersionToken,
    pose: Vec<PoseJoint>,
    node_to_index: HashMap<NodeId, u32>,
    staged: Vec<StagedJoint>,
}

impl SkeletonBuild {
    /// Validates `pose` and indexes its nodes.
    ///
    /// # Errors
    ///
    /// `InvalidParentIndex` for a parent outside the array or a joint
    /// parented to itself, `DuplicateNode` for a repeated node id.
    pub fn new(pose: PoseSnapshot) -> LoadResult<Self> {
        let count = pose.joints.len();
        let mut node_to_index = HashMap::with_capacity(count);

        for (index, joint) in pose.joints.iter().enumerate() {
            let parent = joint.parent_index;
            let parent_ok = parent == -1
                || usize::try_from(parent).is_ok_and(|p| p < count && p != index);
            if !parent_ok {
                return Err(LoadError::InvalidParentIndex {
                    joint: index,
                    parent,
                });
            }
            let slot = u32::try_from(index).unwrap_or(u32::MAX);
            if node_to_index.insert(joint.node_id, slot).is_some() {
                return Err(LoadError::DuplicateNode(joint.node_id));
            }
        }

        Ok(Self {
            hierarchy: pose.hierarchy,
            pose: pose.joints,
            node_to_index,
            staged: Vec::with_capacity(count),
        })
    }

    /// Hierarchy version being built.
    #[must_use]
    pub const fn hierarchy(&self) -> VersionToken {
        self.hierarchy
    }

    /// The node id to joint index map of the new skeleton.
    #[must_use]
    pub const fn node_map(&self) -> &HashMap<NodeId, u32> {
        &self.node_to_index
    }

    /// Checks whether every joint has a proxy staged.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.staged.len() == self.pose.len()
    }

    /// Number of joints staged so far.
    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    /// Stages proxies for up to `batch` more joints.
    ///
    /// Returns `true` once every joint is staged.
    pub fn advance(&mut self, current: &Skeleton, batch: usize) -> bool {
        let start = self.staged.len();
        let end = start.saturating_add(batch.max(1)).min(self.pose.len());
        for joint in &self.pose[start..end] {
            let staged = match current
                .index_for_node(joint.node_id)
                .and_then(|index| current.joint(index))
            {
                Some(existing) => StagedJoint::Carried(existing.proxy),
                None => StagedJoint::Created(JointProxy {
                    name: joint.name.clone(),
                    node_id: joint.node_id,
                    parent: JointParent::Base,
                    local: joint.local,
                }),
            };
            self.staged.push(staged);
        }
        self.is_done()
    }

    /// Publishes the build into `skeleton`.
    ///
    /// `joint_types` maps roles to nodes; entries whose node is not part of
    /// the new skeleton are dropped.
    pub fn commit(
        mut self,
        skeleton: &mut Skeleton,
        mut joint_types: HashMap<JointType, NodeId>,
    ) -> SkeletonDiff {
        debug_assert!(self.is_done(), "committing an unfinished skeleton build");
        // Anything not staged yet is staged now so the commit is whole.
        self.advance(skeleton, usize::MAX);

        let mut diff = SkeletonDiff::default();
        let mut joints = Vec::with_capacity(self.pose.len());
        for (staged, pose) in self.staged.into_iter().zip(&self.pose) {
            let proxy = match staged {
                StagedJoint::Carried(handle) => {
                    diff.carried += 1;
                    handle
                }
                StagedJoint::Created(proxy) => {
                    diff.created += 1;
                    skeleton.proxies.insert(proxy)
                }
            };
            joints.push(SkeletonJoint {
                name: pose.name.clone(),
                proxy,
                parent_index: pose.parent_index,
                node_id: pose.node_id,
            });
        }

        // Reparent before destroying so no survivor points at a dead proxy.
        for (joint, pose) in joints.iter().zip(&self.pose) {
            let parent = usize::try_from(joint.parent_index)
                .ok()
                .and_then(|p| joints.get(p))
                .map_or(JointParent::Base, |p| JointParent::Joint(p.proxy));
            if let Some(proxy) = skeleton.proxies.get_mut(joint.proxy) {
                proxy.parent = parent;
                proxy.name.clone_from(&pose.name);
                proxy.local = pose.local;
            }
        }

        let old_parents: Vec<i32> = skeleton.joints.iter().map(|j| j.parent_index).collect();
        let stale: Vec<usize> = skeleton
            .joints
            .iter()
            .enumerate()
            .filter(|(_, joint)| !self.node_to_index.contains_key(&joint.node_id))
            .map(|(index, _)| index)
            .collect();
        diff.destroyed =
            Skeleton::destroy(&mut skeleton.proxies, &skeleton.joints, &old_parents, stale);

        joint_types.retain(|joint, node| {
            let known = self.node_to_index.contains_key(node);
            if !known {
                tracing::debug!("{:?} resolves to {} outside the skeleton", joint, node);
            }
            known
        });

        skeleton.joints = joints;
        skeleton.node_to_index = self.node_to_index;
        skeleton.type_to_node = joint_types;
        skeleton.hierarchy = self.hierarchy;

        tracing::debug!(
            "Skeleton {} committed: {} carried, {} created, {} destroyed",
            skeleton.hierarchy,
            diff.carried,
            diff.created,
            diff.destroyed.len()
        );
        diff
    }
}
