//! # Primitive Loader
//!
//! Turns the provider's per-primitive descriptors into staged renderables.
//!
//! ## Phases
//!
//! ```text
//! query_batch   descriptor i..i+batch -> already built? keep : queue
//! remap_kept    (hierarchy rebuilds) remap kept renderables from their fresh descriptors
//! load_next     asset loaded?    -> map joints, build, apply skinning origin
//!               asset loading?   -> defer, revisit after the rest
//!               asset cancelled? -> fail the rebuild
//! ```
//!
//! Assets are polled, never awaited. When every queued asset is still
//! loading the loader reports `Blocked` and the pipeline waits a tick.

use std::collections::{HashMap, HashSet, VecDeque};

use marionette_core::{EntityHandle, Handle, NodeId, PrimitiveId, Transform};
use marionette_provider::{AssetStatus, AvatarProvider, PrimitiveRenderState};

use crate::config::PrimitiveFailurePolicy;
use crate::error::{LoadError, LoadResult};
use crate::renderable::{Renderable, RenderableSet};

/// What one loader call achieved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadProgress {
    /// Work was done; more remains.
    Advanced,
    /// The current item's asset is still loading and was deferred.
    Deferred,
    /// Nothing can progress until the provider does.
    Blocked,
    /// The phase is complete.
    Finished,
}

/// Maps a primitive's joint nodes onto skeleton joint indices.
///
/// # Errors
///
/// `JointCountMismatch` if the mapping does not cover the asset's joints,
/// `JointMapping` for a node the skeleton lacks.
pub fn map_joints(
    primitive: PrimitiveId,
    mapping: &[NodeId],
    expected: usize,
    joint_map: &HashMap<NodeId, u32>,
) -> LoadResult<Vec<u32>> {
    if mapping.len() != expected {
        return Err(LoadError::JointCountMismatch {
            primitive,
            expected,
            actual: mapping.len(),
        });
    }
    mapping
        .iter()
        .map(|node| {
            joint_map
                .get(node)
                .copied()
                .ok_or(LoadError::JointMapping {
                    primitive,
                    node: *node,
                })
        })
        .collect()
}

/// New skinning of a kept renderable, resolved against a new skeleton.
#[derive(Clone, Debug, PartialEq)]
pub struct JointRemap {
    /// The kept renderable.
    pub handle: Handle<Renderable>,
    /// Entity nodes for each asset joint, as currently described.
    pub joint_nodes: Vec<NodeId>,
    /// Skeleton joint index for each asset joint.
    pub joint_indices: Vec<u32>,
    /// Current skinning origin.
    pub skinning_origin: Transform,
}

impl JointRemap {
    /// Writes the new skinning into the committed renderable.
    pub fn apply(self, renderable: &mut Renderable) {
        renderable.joint_nodes = self.joint_nodes;
        renderable.joint_indices = self.joint_indices;
        renderable.skinning_origin = self.skinning_origin;
    }
}

/// Everything a finished loader hands to the commit.
#[derive(Debug, Default)]
pub struct PrimitiveCommit {
    /// New renderables, not yet registered.
    pub staged: Vec<Renderable>,
    /// Committed renderables the render state still describes.
    pub kept: HashSet<Handle<Renderable>>,
    /// New skinning for kept renderables.
    pub remaps: Vec<JointRemap>,
    /// Primitives left out under the skip policy.
    pub skipped: usize,
}

/// Staged primitive work of one rebuild.
#[derive(Debug)]
pub struct PrimitiveLoader {
    primitive_count: u32,
    next_index: u32,
    seen: HashSet<(NodeId, PrimitiveId)>,
    described: Vec<(Handle<Renderable>, PrimitiveRenderState)>,
    pending: VecDeque<PrimitiveRenderState>,
    delayed: Vec<PrimitiveRenderState>,
    policy: PrimitiveFailurePolicy,
    timeout_ticks: Option<u32>,
    wait_ticks: u32,
    out: PrimitiveCommit,
}

impl PrimitiveLoader {
    /// Creates a loader for `primitive_count` descriptors.
    #[must_use]
    pub fn new(
        primitive_count: u32,
        policy: PrimitiveFailurePolicy,
        timeout_ticks: Option<u32>,
    ) -> Self {
        Self {
            primitive_count,
            next_index: 0,
            seen: HashSet::new(),
            described: Vec::new(),
            pending: VecDeque::new(),
            delayed: Vec::new(),
            policy,
            timeout_ticks,
            wait_ticks: 0,
            out: PrimitiveCommit::default(),
        }
    }

    /// Queries up to `batch` more descriptors.
    ///
    /// # Errors
    ///
    /// `PrimitiveQuery` when the provider fails a descriptor outright.
    pub fn query_batch(
        &mut self,
        provider: &dyn AvatarProvider,
        entity: EntityHandle,
        existing: &RenderableSet,
        batch: usize,
    ) -> LoadResult<LoadProgress> {
        let batch = u32::try_from(batch.max(1)).unwrap_or(u32::MAX);
        let end = self.next_index.saturating_add(batch).min(self.primitive_count);

        while self.next_index < end {
            let index = self.next_index;
            match provider.query_primitive_render_state(entity, index) {
                Ok(descriptor) => self.admit(descriptor, existing),
                Err(source) if source.is_transient() => return Ok(LoadProgress::Blocked),
                Err(source) => return Err(LoadError::PrimitiveQuery { index, source }),
            }
            self.next_index += 1;
        }

        if self.next_index >= self.primitive_count {
            Ok(LoadProgress::Finished)
        } else {
            Ok(LoadProgress::Advanced)
        }
    }

    fn admit(&mut self, descriptor: PrimitiveRenderState, existing: &RenderableSet) {
        let key = (descriptor.mesh_node_id, descriptor.primitive_id);
        if !self.seen.insert(key) {
            tracing::debug!(
                "{} described twice for {}; keeping the first",
                descriptor.primitive_id,
                descriptor.mesh_node_id
            );
            return;
        }
        match existing.find(key.0, key.1) {
            Some(handle) => {
                self.out.kept.insert(handle);
                self.described.push((handle, descriptor));
            }
            None => self.pending.push_back(descriptor),
        }
    }

    /// Resolves the current joint mapping of every kept skinned renderable
    /// against a new skeleton.
    ///
    /// The mapping comes from this rebuild's descriptor, not from the
    /// renderable, since a hierarchy change may issue new joint node ids.
    ///
    /// # Errors
    ///
    /// A mapping error, when the failure policy is `FailEntity`.
    pub fn remap_kept(
        &mut self,
        existing: &RenderableSet,
        joint_map: &HashMap<NodeId, u32>,
    ) -> LoadResult<()> {
        for (handle, descriptor) in std::mem::take(&mut self.described) {
            let Some(renderable) = existing.get(handle) else {
                continue;
            };
            if !renderable.is_skinned() && descriptor.joint_pose_mapping.is_empty() {
                continue;
            }
            let expected = renderable.asset.data().map_or(0, |data| data.joint_count());
            match map_joints(
                descriptor.primitive_id,
                &descriptor.joint_pose_mapping,
                expected,
                joint_map,
            ) {
                Ok(joint_indices) => self.out.remaps.push(JointRemap {
                    handle,
                    joint_nodes: descriptor.joint_pose_mapping,
                    joint_indices,
                    skinning_origin: descriptor.skinning_origin,
                }),
                Err(error) => {
                    self.tolerate(error)?;
                    self.out.kept.remove(&handle);
                }
            }
        }
        Ok(())
    }

    /// Builds the next queued primitive whose asset is ready.
    ///
    /// # Errors
    ///
    /// `AssetNotFound`, `AssetCancelled`, `AssetTimeout`, or a mapping
    /// error under the `FailEntity` policy.
    pub fn load_next(
        &mut self,
        provider: &dyn AvatarProvider,
        joint_map: &HashMap<NodeId, u32>,
    ) -> LoadResult<LoadProgress> {
        let Some(descriptor) = self.pending.pop_front() else {
            return self.retry_delayed();
        };

        let asset = provider
            .asset(descriptor.primitive_id)
            .ok_or(LoadError::AssetNotFound(descriptor.primitive_id))?;

        match asset.status() {
            AssetStatus::Loading => {
                tracing::trace!("{} still loading; deferring", descriptor.primitive_id);
                self.delayed.push(descriptor);
                return Ok(LoadProgress::Deferred);
            }
            AssetStatus::Cancelled | AssetStatus::Failed => {
                return Err(LoadError::AssetCancelled(descriptor.primitive_id));
            }
            AssetStatus::Loaded => {}
        }

        let expected = asset.data().map_or(0, |data| data.joint_count());
        let indices = match map_joints(
            descriptor.primitive_id,
            &descriptor.joint_pose_mapping,
            expected,
            joint_map,
        ) {
            Ok(indices) => indices,
            Err(error) => {
                self.tolerate(error)?;
                return Ok(LoadProgress::Advanced);
            }
        };

        let mut renderable = Renderable::new(
            descriptor.mesh_node_id,
            descriptor.instance_id,
            asset,
            descriptor.joint_pose_mapping,
            indices,
        )
        .ok_or(LoadError::AssetCancelled(descriptor.primitive_id))?;
        renderable.skinning_origin = descriptor.skinning_origin;
        self.out.staged.push(renderable);

        Ok(if self.pending.is_empty() && self.delayed.is_empty() {
            LoadProgress::Finished
        } else {
            LoadProgress::Advanced
        })
    }

    fn retry_delayed(&mut self) -> LoadResult<LoadProgress> {
        if self.delayed.is_empty() {
            return Ok(LoadProgress::Finished);
        }
        self.pending.extend(self.delayed.drain(..));
        self.wait_ticks += 1;

        if let Some(limit) = self.timeout_ticks {
            if self.wait_ticks > limit {
                let primitive = self
                    .pending
                    .front()
                    .map_or(PrimitiveId::INVALID, |d| d.primitive_id);
                return Err(LoadError::AssetTimeout {
                    primitive,
                    ticks: self.wait_ticks,
                });
            }
        }
        Ok(LoadProgress::Blocked)
    }

    /// Counts a primitive-local error as skipped when the policy allows it.
    fn tolerate(&mut self, error: LoadError) -> LoadResult<()> {
        if !error.is_primitive_local() || self.policy == PrimitiveFailurePolicy::FailEntity {
            return Err(error);
        }
        tracing::warn!("Skipping primitive: {}", error);
        self.out.skipped += 1;
        Ok(())
    }

    /// Ticks spent blocked on loading assets.
    #[must_use]
    pub const fn wait_ticks(&self) -> u32 {
        self.wait_ticks
    }

    /// Renderables built so far.
    #[must_use]
    pub fn staged_count(&self) -> usize {
        self.out.staged.len()
    }

    /// Descriptors waiting on their asset.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len() + self.delayed.len()
    }

    /// Hands over the staged results.
    #[must_use]
    pub fn finish(self) -> PrimitiveCommit {
        debug_assert!(self.pending.is_empty() && self.delayed.is_empty());
        self.out
    }
}
