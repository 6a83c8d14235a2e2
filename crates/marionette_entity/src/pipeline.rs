//! # Rebuild Pipeline
//!
//! The skeleton -> primitives -> visibility sequence as a resumable task.
//!
//! ```text
//! AwaitPending -> QueryPose -> BuildSkeleton ─┐            (hierarchy only)
//!      │                                      v
//!      └────────────────────────────> QueryRenderState
//!                                            │
//!                     QueryPrimitives -> RemapExisting -> LoadPrimitives -> Commit
//!                                        (hierarchy only)
//! ```
//!
//! Every phase before `Commit` only reads the scene and stages into the
//! pipeline. `Commit` is one step, so a commit is never split across ticks.
//! Dropping or cancelling the pipeline discards everything staged.

use std::collections::HashMap;

use marionette_core::{EntityHandle, JointType, NodeId, RebuildKind, VersionTriple};
use marionette_provider::{AvatarProvider, ContentTier, RenderStateSnapshot};

use crate::config::EntityConfig;
use crate::error::LoadError;
use crate::primitive::{LoadProgress, PrimitiveLoader};
use crate::scene::SceneState;
use crate::scheduler::{Step, Task};
use crate::skeleton::{SkeletonBuild, SkeletonDiff};
use crate::visibility;

/// Everything a pipeline step may touch.
pub struct PipelineContext<'a> {
    /// The provider session.
    pub provider: &'a dyn AvatarProvider,
    /// Entity being rebuilt.
    pub entity: EntityHandle,
    /// Entity settings.
    pub config: &'a EntityConfig,
    /// Committed state. Written by the commit step only.
    pub scene: &'a mut SceneState,
}

/// What a completed pipeline committed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitReport {
    /// Kind of rebuild.
    pub kind: RebuildKind,
    /// Versions current after the commit.
    pub versions: VersionTriple,
    /// Skeleton changes, for hierarchy rebuilds.
    pub skeleton: Option<SkeletonDiff>,
    /// Content tier of the committed render state, if one was committed.
    pub tier: Option<ContentTier>,
    /// Renderables built.
    pub built: usize,
    /// Renderables torn down.
    pub removed: usize,
    /// Primitives left out under the skip policy.
    pub skipped: usize,
    /// Renderables in the visible working list.
    pub visible: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    AwaitPending,
    QueryPose,
    BuildSkeleton,
    QueryRenderState,
    QueryPrimitives,
    RemapExisting,
    LoadPrimitives,
    Commit,
    Done,
}

/// One in-flight rebuild of one entity.
#[derive(Debug)]
pub struct RebuildPipeline {
    kind: RebuildKind,
    target: VersionTriple,
    phase: Phase,
    skeleton: Option<SkeletonBuild>,
    render: Option<RenderStateSnapshot>,
    loader: Option<PrimitiveLoader>,
    report: Option<CommitReport>,
    error: Option<LoadError>,
}

impl RebuildPipeline {
    /// Creates a pipeline aiming for `target`.
    #[must_use]
    pub fn new(kind: RebuildKind, target: VersionTriple) -> Self {
        Self {
            kind,
            target,
            phase: Phase::AwaitPending,
            skeleton: None,
            render: None,
            loader: None,
            report: None,
            error: None,
        }
    }

    /// Kind of rebuild.
    #[must_use]
    pub const fn kind(&self) -> RebuildKind {
        self.kind
    }

    /// Versions this rebuild aims for.
    #[must_use]
    pub const fn target(&self) -> VersionTriple {
        self.target
    }

    /// Joints staged so far, for hierarchy rebuilds.
    #[must_use]
    pub fn staged_joints(&self) -> usize {
        self.skeleton.as_ref().map_or(0, SkeletonBuild::staged_count)
    }

    /// Renderables staged so far.
    #[must_use]
    pub fn staged_renderables(&self) -> usize {
        self.loader.as_ref().map_or(0, PrimitiveLoader::staged_count)
    }

    fn fail(&mut self, error: LoadError) -> Step {
        self.error = Some(error);
        Step::Cancel
    }

    fn after_skeleton(&self) -> Phase {
        if self.target.all_nodes.is_valid() || self.target.visible_nodes.is_valid() {
            Phase::QueryRenderState
        } else {
            Phase::Commit
        }
    }

    fn await_pending(&mut self, ctx: &PipelineContext<'_>) -> Step {
        let pending = ctx.provider.pending_count(ctx.entity);
        if pending > 0 {
            tracing::trace!("{} has {} provider operations pending", ctx.entity, pending);
            return Step::Wait;
        }
        self.phase = match self.kind {
            RebuildKind::Hierarchy => Phase::QueryPose,
            RebuildKind::Visibility => Phase::QueryRenderState,
        };
        Step::Continue
    }

    fn query_pose(&mut self, ctx: &PipelineContext<'_>) -> Step {
        let pose = match ctx.provider.query_pose(ctx.entity) {
            Ok(pose) => pose,
            Err(error) if error.is_transient() => return Step::Wait,
            Err(error) => return self.fail(LoadError::PoseQuery(error)),
        };
        if pose.hierarchy != self.target.hierarchy {
            return self.fail(LoadError::HierarchyMismatch {
                expected: self.target.hierarchy,
                actual: pose.hierarchy,
            });
        }
        match SkeletonBuild::new(pose) {
            Ok(build) => {
                self.skeleton = Some(build);
                self.phase = Phase::BuildSkeleton;
                Step::Continue
            }
            Err(error) => self.fail(error),
        }
    }

    fn build_skeleton(&mut self, ctx: &PipelineContext<'_>) -> Step {
        let Some(build) = self.skeleton.as_mut() else {
            self.phase = Phase::QueryPose;
            return Step::Continue;
        };
        if build.advance(&ctx.scene.skeleton, ctx.config.skeleton_batch_size) {
            self.phase = self.after_skeleton();
        }
        Step::Continue
    }

    fn query_render_state(&mut self, ctx: &PipelineContext<'_>) -> Step {
        let render = match ctx.provider.query_render_state(ctx.entity) {
            Ok(render) => render,
            Err(error) if error.is_transient() => return Step::Wait,
            Err(error) => return self.fail(LoadError::RenderStateQuery(error)),
        };
        let expected = match self.kind {
            RebuildKind::Hierarchy => self.target.hierarchy,
            RebuildKind::Visibility => ctx.scene.skeleton.hierarchy(),
        };
        if render.versions.hierarchy != expected {
            return self.fail(LoadError::HierarchyMismatch {
                expected,
                actual: render.versions.hierarchy,
            });
        }

        self.loader = Some(PrimitiveLoader::new(
            render.primitive_count,
            ctx.config.failure_policy,
            ctx.config.asset_wait_timeout_ticks,
        ));
        self.render = Some(render);
        self.phase = Phase::QueryPrimitives;
        Step::Continue
    }

    fn query_primitives(&mut self, ctx: &PipelineContext<'_>) -> Step {
        let Some(loader) = self.loader.as_mut() else {
            self.phase = Phase::QueryRenderState;
            return Step::Continue;
        };
        match loader.query_batch(
            ctx.provider,
            ctx.entity,
            &ctx.scene.renderables,
            ctx.config.primitive_batch_size,
        ) {
            Ok(LoadProgress::Finished) => {
                self.phase = match self.kind {
                    RebuildKind::Hierarchy => Phase::RemapExisting,
                    RebuildKind::Visibility => Phase::LoadPrimitives,
                };
                Step::Continue
            }
            Ok(LoadProgress::Blocked) => Step::Wait,
            Ok(_) => Step::Continue,
            Err(error) => self.fail(error),
        }
    }

    fn remap_existing(&mut self, ctx: &PipelineContext<'_>) -> Step {
        if let (Some(loader), Some(build)) = (self.loader.as_mut(), self.skeleton.as_ref()) {
            if let Err(error) = loader.remap_kept(&ctx.scene.renderables, build.node_map()) {
                return self.fail(error);
            }
        }
        self.phase = Phase::LoadPrimitives;
        Step::Continue
    }

    fn load_primitives(&mut self, ctx: &PipelineContext<'_>) -> Step {
        let Some(loader) = self.loader.as_mut() else {
            self.phase = Phase::Commit;
            return Step::Continue;
        };
        let joint_map = self
            .skeleton
            .as_ref()
            .map_or(ctx.scene.skeleton.node_map(), SkeletonBuild::node_map);

        match loader.load_next(ctx.provider, joint_map) {
            Ok(LoadProgress::Finished) => {
                self.phase = Phase::Commit;
                Step::Continue
            }
            Ok(LoadProgress::Advanced) => Step::Continue,
            Ok(LoadProgress::Deferred) => Step::Delay,
            Ok(LoadProgress::Blocked) => Step::Wait,
            Err(error) => self.fail(error),
        }
    }

    fn resolve_joint_types(ctx: &PipelineContext<'_>) -> HashMap<JointType, NodeId> {
        ctx.config
            .critical_joints
            .iter()
            .filter_map(|&joint| {
                let node = ctx.provider.node_for_joint_type(ctx.entity, joint);
                if node.is_none() {
                    tracing::debug!("{} has no node for {:?}", ctx.entity, joint);
                }
                node.map(|node| (joint, node))
            })
            .collect()
    }

    fn commit(&mut self, ctx: &mut PipelineContext<'_>) -> Step {
        let mut report = CommitReport {
            kind: self.kind,
            versions: ctx.scene.tracker.current(),
            skeleton: None,
            tier: None,
            built: 0,
            removed: 0,
            skipped: 0,
            visible: ctx.scene.visible.len(),
        };

        if let Some(build) = self.skeleton.take() {
            let joint_types = Self::resolve_joint_types(ctx);
            let scene = &mut *ctx.scene;
            let hierarchy = build.hierarchy();
            report.skeleton = Some(build.commit(&mut scene.skeleton, joint_types));
            scene.tracker.commit_hierarchy(hierarchy);
        }

        if let (Some(render), Some(loader)) = (self.render.take(), self.loader.take()) {
            let scene = &mut *ctx.scene;
            let parts = loader.finish();

            report.removed = visibility::remove_stale(
                &mut scene.renderables,
                &mut scene.lod,
                &render.all_mesh_nodes,
                &parts.kept,
            );
            for remap in parts.remaps {
                if let Some(renderable) = scene.renderables.get_mut(remap.handle) {
                    remap.apply(renderable);
                }
            }
            report.built = parts.staged.len();
            for renderable in parts.staged {
                scene.renderables.insert(renderable);
            }
            report.skipped = parts.skipped;

            let merged = visibility::reconcile(
                &mut scene.renderables,
                &mut scene.lod,
                &render.all_mesh_nodes,
                &render.visible_mesh_nodes,
            );
            scene.visible = merged.visible;
            scene.lod.refresh_range();
            scene
                .tracker
                .commit_render(render.versions.all_nodes, render.versions.visible_nodes);

            report.tier = Some(render.tier);
            report.visible = scene.visible.len();
        }

        report.versions = ctx.scene.tracker.current();
        tracing::debug!(
            "{} committed {:?} rebuild at h={} a={} v={}: {} built, {} removed, {} visible",
            ctx.entity,
            self.kind,
            report.versions.hierarchy,
            report.versions.all_nodes,
            report.versions.visible_nodes,
            report.built,
            report.removed,
            report.visible
        );
        self.report = Some(report);
        self.phase = Phase::Done;
        Step::Complete
    }
}

impl Task for RebuildPipeline {
    type Context<'a> = PipelineContext<'a>;
    type Output = CommitReport;
    type Error = LoadError;

    fn step(&mut self, ctx: &mut PipelineContext<'_>) -> Step {
        match self.phase {
            Phase::AwaitPending => self.await_pending(ctx),
            Phase::QueryPose => self.query_pose(ctx),
            Phase::BuildSkeleton => self.build_skeleton(ctx),
            Phase::QueryRenderState => self.query_render_state(ctx),
            Phase::QueryPrimitives => self.query_primitives(ctx),
            Phase::RemapExisting => self.remap_existing(ctx),
            Phase::LoadPrimitives => self.load_primitives(ctx),
            Phase::Commit => self.commit(ctx),
            Phase::Done => Step::Complete,
        }
    }

    fn cancel(&mut self) {
        if self.phase == Phase::Done && self.skeleton.is_none() && self.loader.is_none() {
            return;
        }
        tracing::debug!(
            "{:?} rebuild cancelled; releasing {} staged joints, {} staged renderables",
            self.kind,
            self.staged_joints(),
            self.staged_renderables()
        );
        self.skeleton = None;
        self.render = None;
        self.loader = None;
        self.phase = Phase::Done;
    }

    fn take_output(&mut self) -> Option<CommitReport> {
        self.report.take()
    }

    fn take_error(&mut self) -> Option<LoadError> {
        self.error.take()
    }
}
