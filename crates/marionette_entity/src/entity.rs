//! # Avatar Entity
//!
//! One avatar's synchronization state. Each tick:
//!
//! 1. Ask the provider for its published versions.
//! 2. Let the version tracker decide whether a rebuild is needed. A newer
//!    target preempts the running pipeline.
//! 3. Step the pipeline under the tick's budget.
//! 4. On commit, move the lifecycle forward. On failure, notify listeners
//!    and keep the previous structure.

use marionette_core::{
    EntityHandle, Handle, JointType, NodeId, RebuildKind, SyncDecision, VersionTriple,
};
use marionette_provider::AvatarProvider;

use crate::config::EntityConfig;
use crate::error::LoadError;
use crate::lifecycle::{EntityEvent, EntityListener, Lifecycle, LifecycleState, ListenerSet};
use crate::lod::LodTable;
use crate::pipeline::{CommitReport, PipelineContext, RebuildPipeline};
use crate::renderable::{Renderable, RenderableSet};
use crate::scene::SceneState;
use crate::scheduler::{FrameBudget, RunOutcome, Scheduler, SchedulerStats};
use crate::skeleton::SkeletonJoint;

/// What one [`AvatarEntity::tick`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickStatus {
    /// Not initialized or torn down.
    Inactive,
    /// Local structure matches the provider.
    Synced,
    /// The provider could not report versions yet.
    ProviderNotReady,
    /// A rebuild is in progress and yielded.
    Running,
    /// A rebuild is blocked on the provider.
    Waiting,
    /// A rebuild committed.
    Committed(CommitReport),
    /// A rebuild was abandoned because the provider moved on mid-build.
    Superseded,
    /// A rebuild failed. Previous structure stays current.
    Failed(LoadError),
}

/// A single avatar kept in step with the provider.
#[derive(Debug)]
pub struct AvatarEntity {
    handle: EntityHandle,
    config: EntityConfig,
    lifecycle: Lifecycle,
    scene: SceneState,
    scheduler: Scheduler<RebuildPipeline>,
    listeners: ListenerSet,
    last_error: Option<LoadError>,
}

impl AvatarEntity {
    /// Creates an entity in the `None` state.
    #[must_use]
    pub fn new(handle: EntityHandle, config: EntityConfig) -> Self {
        Self {
            handle,
            config,
            lifecycle: Lifecycle::new(),
            scene: SceneState::new(),
            scheduler: Scheduler::new(),
            listeners: ListenerSet::new(),
            last_error: None,
        }
    }

    /// Moves to `Created` and notifies. No-op unless the entity is `None`.
    pub fn initialize(&mut self) -> bool {
        if self.lifecycle.state().is_live() {
            return false;
        }
        self.lifecycle
            .advance(LifecycleState::Created, self.handle, &mut self.listeners)
            > 0
    }

    /// Registers a listener for lifecycle events.
    pub fn add_listener<L: EntityListener + 'static>(&mut self, listener: L) {
        self.listeners.push(Box::new(listener));
    }

    /// Runs one tick of synchronization against `provider`.
    pub fn tick(&mut self, provider: &dyn AvatarProvider, budget: &mut FrameBudget) -> TickStatus {
        if !self.lifecycle.state().is_live() {
            return TickStatus::Inactive;
        }

        let published = match provider.published_versions(self.handle) {
            Ok(published) => published,
            Err(error) if error.is_transient() => return TickStatus::ProviderNotReady,
            Err(error) => {
                tracing::warn!("{} version query failed: {}", self.handle, error);
                return TickStatus::ProviderNotReady;
            }
        };

        let in_flight = self.scheduler.active().map(RebuildPipeline::kind);
        let decision = self.scene.tracker.plan(published, in_flight);
        if let SyncDecision::Rebuild { kind, target } = decision {
            tracing::debug!(
                "{} starting {:?} rebuild toward h={} a={} v={}",
                self.handle,
                kind,
                target.hierarchy,
                target.all_nodes,
                target.visible_nodes
            );
            self.scheduler.start(RebuildPipeline::new(kind, target));
        }

        let Some(kind) = self.scheduler.active().map(RebuildPipeline::kind) else {
            return TickStatus::Synced;
        };

        let outcome = {
            let mut ctx = PipelineContext {
                provider,
                entity: self.handle,
                config: &self.config,
                scene: &mut self.scene,
            };
            self.scheduler.run(&mut ctx, budget)
        };

        match outcome {
            RunOutcome::Idle => TickStatus::Synced,
            RunOutcome::Yielded => TickStatus::Running,
            RunOutcome::Waiting => TickStatus::Waiting,
            RunOutcome::Completed(Some(report)) => {
                self.on_committed(&report);
                TickStatus::Committed(report)
            }
            RunOutcome::Completed(None) => TickStatus::Synced,
            RunOutcome::Cancelled(Some(error)) if error.is_superseded() => {
                tracing::debug!("{} {:?} rebuild superseded: {}", self.handle, kind, error);
                self.scene.tracker.abandon(kind);
                TickStatus::Superseded
            }
            RunOutcome::Cancelled(Some(error)) => {
                self.on_failed(error.clone());
                TickStatus::Failed(error)
            }
            RunOutcome::Cancelled(None) => {
                self.scene.tracker.abandon(kind);
                TickStatus::Superseded
            }
        }
    }

    fn on_committed(&mut self, report: &CommitReport) {
        self.last_error = None;
        if report.skeleton.is_some() {
            self.lifecycle
                .advance(LifecycleState::Skeleton, self.handle, &mut self.listeners);
        }
        if let Some(tier) = report.tier {
            if self.scene.skeleton.hierarchy().is_valid() {
                self.lifecycle.advance(
                    LifecycleState::for_tier(tier),
                    self.handle,
                    &mut self.listeners,
                );
            }
        }
    }

    fn on_failed(&mut self, error: LoadError) {
        tracing::error!("{} rebuild failed: {}", self.handle, error);
        let event = EntityEvent::LoadFailed(error.clone());
        self.last_error = Some(error);
        self.listeners.notify(self.handle, &event);
    }

    /// Releases everything and returns to `None`.
    ///
    /// Fires `PreTeardown` first. Safe to call repeatedly; only the first
    /// call on a live entity does anything.
    pub fn teardown(&mut self) -> bool {
        if !self.lifecycle.state().is_live() {
            return false;
        }
        self.listeners.notify(self.handle, &EntityEvent::PreTeardown);
        self.scheduler.cancel();
        let destroyed = self.scene.clear();
        tracing::debug!("{} released {} joints", self.handle, destroyed.len());
        self.last_error = None;
        self.lifecycle.reset(self.handle);
        true
    }

    /// Provider handle of this entity.
    #[must_use]
    pub const fn handle(&self) -> EntityHandle {
        self.handle
    }

    /// Settings in use.
    #[must_use]
    pub const fn config(&self) -> &EntityConfig {
        &self.config
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Versions of the committed structure.
    #[must_use]
    pub const fn versions(&self) -> VersionTriple {
        self.scene.tracker.current()
    }

    /// Versions the in-flight or last failed rebuild aims for.
    #[must_use]
    pub const fn target_versions(&self) -> VersionTriple {
        self.scene.tracker.target()
    }

    /// Checks whether a rebuild is running.
    #[must_use]
    pub const fn is_rebuilding(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Kind of the running rebuild.
    #[must_use]
    pub fn rebuild_kind(&self) -> Option<RebuildKind> {
        self.scheduler.active().map(RebuildPipeline::kind)
    }

    /// The running rebuild.
    #[must_use]
    pub const fn active_pipeline(&self) -> Option<&RebuildPipeline> {
        self.scheduler.active()
    }

    /// Most recent rebuild failure, cleared by the next commit.
    #[must_use]
    pub const fn last_error(&self) -> Option<&LoadError> {
        self.last_error.as_ref()
    }

    /// Scheduling counters.
    #[must_use]
    pub const fn stats(&self) -> &SchedulerStats {
        self.scheduler.stats()
    }

    /// Committed scene.
    #[must_use]
    pub const fn scene(&self) -> &SceneState {
        &self.scene
    }

    /// Number of committed joints.
    #[must_use]
    pub fn skeleton_joint_count(&self) -> usize {
        self.scene.skeleton.joint_count()
    }

    /// Committed joint at `index`.
    #[must_use]
    pub fn skeleton_joint(&self, index: usize) -> Option<&SkeletonJoint> {
        self.scene.skeleton.joint(index)
    }

    /// Committed joint resolved for `joint`.
    #[must_use]
    pub fn skeleton_joint_for_type(&self, joint: JointType) -> Option<&SkeletonJoint> {
        self.scene.skeleton.joint_for_type(joint)
    }

    /// Node resolved for `joint` at the last skeleton commit.
    #[must_use]
    pub fn node_for_type(&self, joint: JointType) -> Option<NodeId> {
        self.scene.skeleton.node_for_type(joint)
    }

    /// Joint index of `node` in the committed skeleton.
    #[must_use]
    pub fn index_for_node(&self, node: NodeId) -> Option<usize> {
        self.scene.skeleton.index_for_node(node)
    }

    /// Committed renderables.
    #[must_use]
    pub const fn renderables(&self) -> &RenderableSet {
        &self.scene.renderables
    }

    /// Visible renderables, in node order.
    #[must_use]
    pub fn visible(&self) -> &[Handle<Renderable>] {
        &self.scene.visible
    }

    /// Per-LOD visible cost.
    #[must_use]
    pub const fn lod(&self) -> &LodTable {
        &self.scene.lod
    }
}

impl Drop for AvatarEntity {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use marionette_core::{InstanceId, PrimitiveId, Transform, VersionToken};
    use marionette_provider::{
        ContentTier, LodFlags, PoseJoint, PrimitiveAsset, PrimitiveCost, PrimitiveData,
        PrimitiveRenderState, RenderPublish, ScriptedProvider,
    };

    fn entity() -> EntityHandle {
        EntityHandle::new(1)
    }

    fn n(raw: u32) -> NodeId {
        NodeId::new(raw)
    }

    fn chain(nodes: &[u32]) -> Vec<PoseJoint> {
        nodes
            .iter()
            .enumerate()
            .map(|(i, &node)| {
                let parent = i32::try_from(i).unwrap_or(0) - 1;
                PoseJoint::new(n(node), parent, format!("joint_{node}"))
            })
            .collect()
    }

    fn setup() -> (ScriptedProvider, AvatarEntity, Arc<Mutex<Vec<EntityEvent>>>) {
        let provider = ScriptedProvider::new();
        provider.register_entity(entity());
        let mut avatar = AvatarEntity::new(entity(), EntityConfig::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        avatar.add_listener(move |_: EntityHandle, event: &EntityEvent| {
            if let Ok(mut events) = sink.lock() {
                events.push(event.clone());
            }
        });
        avatar.initialize();
        (provider, avatar, events)
    }

    fn mesh(provider: &ScriptedProvider, node: u32, skin: &[u32]) -> PrimitiveRenderState {
        let id = PrimitiveId::new(u64::from(node));
        provider.register_asset(PrimitiveAsset::loaded(
            id,
            PrimitiveData {
                joint_names: skin.iter().map(|j| format!("joint_{j}")).collect(),
                lod_flags: LodFlags::single(0),
                cost: PrimitiveCost::new(100, 50, if skin.is_empty() { 0 } else { 100 }),
            },
        ));
        PrimitiveRenderState {
            mesh_node_id: n(node),
            primitive_id: id,
            instance_id: InstanceId::new(node),
            joint_pose_mapping: skin.iter().map(|&j| n(j)).collect(),
            skinning_origin: Transform::IDENTITY,
        }
    }

    fn run_until_quiet(avatar: &mut AvatarEntity, provider: &ScriptedProvider) -> Vec<TickStatus> {
        let mut statuses = Vec::new();
        for _ in 0..32 {
            let status = avatar.tick(provider, &mut FrameBudget::unlimited());
            let done = status == TickStatus::Synced;
            statuses.push(status);
            if done {
                break;
            }
        }
        statuses
    }

    fn recorded(events: &Arc<Mutex<Vec<EntityEvent>>>) -> Vec<EntityEvent> {
        events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    #[test]
    fn test_full_load_reaches_user_avatar() {
        let (provider, mut avatar, events) = setup();
        provider.publish_skeleton(entity(), chain(&[10, 11, 12]));
        let body = mesh(&provider, 100, &[10, 11]);
        provider.publish_render(
            entity(),
            RenderPublish {
                all_mesh_nodes: vec![n(100)],
                visible_mesh_nodes: vec![n(100)],
                primitives: vec![body],
                tier: ContentTier::User,
            },
        );

        run_until_quiet(&mut avatar, &provider);

        assert_eq!(avatar.state(), LifecycleState::UserAvatar);
        assert_eq!(avatar.skeleton_joint_count(), 3);
        assert_eq!(avatar.renderables().len(), 1);
        assert_eq!(avatar.visible().len(), 1);
        assert_eq!(avatar.versions().hierarchy, VersionToken::new(1));
        assert_eq!(
            recorded(&events),
            vec![
                EntityEvent::Created,
                EntityEvent::SkeletonLoaded,
                EntityEvent::DefaultAvatarLoaded,
                EntityEvent::UserAvatarLoaded,
            ]
        );
    }

    #[test]
    fn test_skeleton_only_publish() {
        let (provider, mut avatar, _) = setup();
        provider.publish_skeleton(entity(), chain(&[1, 2]));

        let statuses = run_until_quiet(&mut avatar, &provider);
        assert!(statuses.iter().any(|s| matches!(s, TickStatus::Committed(_))));
        assert_eq!(avatar.state(), LifecycleState::Skeleton);
        assert!(avatar.renderables().is_empty());
    }

    #[test]
    fn test_pending_provider_work_delays_rebuild() {
        let (provider, mut avatar, _) = setup();
        provider.publish_skeleton(entity(), chain(&[1]));
        provider.set_pending(entity(), 2);

        for _ in 0..3 {
            assert_eq!(avatar.tick(&provider, &mut FrameBudget::unlimited()), TickStatus::Waiting);
        }
        assert_eq!(avatar.skeleton_joint_count(), 0);

        provider.set_pending(entity(), 0);
        run_until_quiet(&mut avatar, &provider);
        assert_eq!(avatar.skeleton_joint_count(), 1);
    }

    #[test]
    fn test_uninitialized_entity_is_inactive() {
        let provider = ScriptedProvider::new();
        provider.register_entity(entity());
        provider.publish_skeleton(entity(), chain(&[1]));
        let mut avatar = AvatarEntity::new(entity(), EntityConfig::default());
        assert_eq!(avatar.tick(&provider, &mut FrameBudget::unlimited()), TickStatus::Inactive);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let (provider, mut avatar, events) = setup();
        provider.publish_skeleton(entity(), chain(&[1, 2, 3]));
        run_until_quiet(&mut avatar, &provider);

        assert!(avatar.teardown());
        assert!(!avatar.teardown());
        assert_eq!(avatar.state(), LifecycleState::None);
        assert_eq!(avatar.skeleton_joint_count(), 0);
        assert!(!avatar.versions().hierarchy.is_valid());

        let teardowns = recorded(&events)
            .into_iter()
            .filter(|e| *e == EntityEvent::PreTeardown)
            .count();
        assert_eq!(teardowns, 1);
    }

    #[test]
    fn test_failure_notifies_and_keeps_state() {
        let (provider, mut avatar, events) = setup();
        provider.publish_skeleton(entity(), chain(&[1, 2]));
        run_until_quiet(&mut avatar, &provider);

        provider.publish_skeleton(entity(), chain(&[1, 2, 3]));
        provider.inject_pose_error(
            entity(),
            Some(marionette_provider::ProviderError::Failed("corrupt".into())),
        );
        let statuses = run_until_quiet(&mut avatar, &provider);

        assert!(statuses.iter().any(|s| matches!(s, TickStatus::Failed(_))));
        assert_eq!(avatar.skeleton_joint_count(), 2);
        assert_eq!(avatar.versions().hierarchy, VersionToken::new(1));
        assert!(avatar.last_error().is_some());
        assert!(recorded(&events)
            .iter()
            .any(|e| matches!(e, EntityEvent::LoadFailed(_))));
    }
}
