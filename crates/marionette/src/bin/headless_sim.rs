//! # Marionette Headless Simulator
//!
//! Drives a handful of avatars against the scripted provider with no
//! renderer attached. A loader thread finishes primitive assets
//! asynchronously while the main loop ticks the manager, so rebuilds see
//! assets flip from pending to loaded mid-pipeline.
//!
//! ```bash
//! RUST_LOG=marionette_entity=debug cargo run --bin headless_sim -- marionette.toml
//! ```

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marionette::entity::{ChannelListener, EntityEvent, FrameBudget, LifecycleState};
use marionette::{AvatarManager, ManagerStats, MarionetteConfig};
use marionette_core::{EntityHandle, InstanceId, JointType, NodeId, PrimitiveId, Transform};
use marionette_provider::{
    ContentTier, LodFlags, PoseJoint, PrimitiveAsset, PrimitiveCost, PrimitiveData,
    PrimitiveRenderState, RenderPublish, ScriptedProvider,
};

const ENTITY_COUNT: u32 = 4;
const JOINT_COUNT: u32 = 24;
const MESHES_PER_AVATAR: u32 = 6;
const MAX_TICKS: u64 = 2_000;
const TICK_INTERVAL: Duration = Duration::from_millis(4);

/// Work item for the loader thread.
struct LoadJob {
    asset: Arc<PrimitiveAsset>,
    data: PrimitiveData,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,marionette_entity=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match MarionetteConfig::from_path(&path) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("FATAL: {error}");
                std::process::exit(1);
            }
        },
        None => MarionetteConfig::default(),
    };

    println!("═══════════════════════════════════════════════════════════════════");
    println!("                  MARIONETTE HEADLESS SIMULATOR");
    println!("═══════════════════════════════════════════════════════════════════");
    println!("  Entities:        {ENTITY_COUNT}");
    println!("  Frame budget:    {} us", config.scheduler.frame_budget_us);
    println!("  Steps / entity:  {}", config.scheduler.max_steps_per_entity);
    println!();

    let provider = ScriptedProvider::new();
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<LoadJob>();
    let loader = spawn_loader(job_rx);

    let mut manager = AvatarManager::new(config);
    let (listener, events) = ChannelListener::unbounded();
    for raw in 1..=ENTITY_COUNT {
        let handle = EntityHandle::new(raw);
        provider.register_entity(handle);
        if let Some(entity) = manager.add_entity(handle) {
            entity.add_listener(listener.clone());
        }
        publish_avatar(&provider, &job_tx, handle, ContentTier::Default, 0);
    }

    let start = Instant::now();
    let mut totals = ManagerStats::default();
    let mut tick = 0;
    while tick < MAX_TICKS {
        tick += 1;
        script(&provider, &job_tx, tick);

        let frame_start = Instant::now();
        let mut budget = FrameBudget::from_duration(manager.config().frame_budget());
        let stats = manager.tick_with_budget(&provider, &mut budget);
        accumulate(&mut totals, &stats);
        drain(&events);

        if tick > 300 && all_settled(&manager) {
            break;
        }
        if let Some(rest) = TICK_INTERVAL.checked_sub(frame_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    drop(job_tx);
    if loader.join().is_err() {
        tracing::error!("Asset loader thread panicked");
    }
    drain(&events);

    print_summary(&manager, &provider, &totals, tick, start.elapsed());
    manager.clear();
    let purged = provider.assets().purge_unused();
    println!("  Assets purged after teardown: {purged}");
}

/// Finishes assets after a random decode delay.
fn spawn_loader(jobs: Receiver<LoadJob>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut rng = StdRng::seed_from_u64(0x00a7_a7a5);
        for job in jobs {
            thread::sleep(Duration::from_millis(rng.gen_range(1..12)));
            // One in forty loads fails, to exercise the failure path.
            if rng.gen_range(0..40) == 0 {
                job.asset.fail();
                tracing::warn!("Loader failed asset {}", job.asset.id());
            } else if !job.asset.finish_load(job.data) {
                tracing::debug!("Asset {} was already settled", job.asset.id());
            }
        }
    })
}

fn skeleton(extra: u32) -> Vec<PoseJoint> {
    (0..JOINT_COUNT + extra)
        .map(|i| {
            let parent = match i {
                0 => -1,
                _ => i32::try_from((i - 1) / 2).unwrap_or(0),
            };
            PoseJoint::new(NodeId::new(i + 1), parent, format!("joint_{i}"))
        })
        .collect()
}

/// Publishes a skeleton and render state for `handle`; asset loads are
/// queued on the loader thread.
fn publish_avatar(
    provider: &ScriptedProvider,
    jobs: &Sender<LoadJob>,
    handle: EntityHandle,
    tier: ContentTier,
    extra_joints: u32,
) {
    provider.publish_skeleton(handle, skeleton(extra_joints));
    provider.set_joint_type(handle, JointType::Root, NodeId::new(1));
    provider.set_joint_type(handle, JointType::Hips, NodeId::new(2));
    provider.set_joint_type(handle, JointType::Head, NodeId::new(5));

    // Default content is shared by every avatar; user content is per avatar.
    let id_base = match tier {
        ContentTier::Default | ContentTier::FastLoad => 0,
        ContentTier::User => u64::from(handle.raw()) * 100,
    };

    let primitives: Vec<PrimitiveRenderState> = (0..MESHES_PER_AVATAR)
        .map(|mesh| {
            let id = PrimitiveId::new(id_base + u64::from(mesh));
            let skin: Vec<NodeId> = (0..3)
                .map(|j| NodeId::new(1 + (mesh * 3 + j) % JOINT_COUNT))
                .collect();
            if provider.assets().get(id).is_none() {
                let asset = provider.request_asset(id);
                let data = PrimitiveData {
                    joint_names: skin.iter().map(ToString::to_string).collect(),
                    lod_flags: LodFlags::single((mesh % 3) as u8),
                    cost: PrimitiveCost::new(1_500, 500, 1_500),
                };
                if jobs.send(LoadJob { asset, data }).is_err() {
                    tracing::warn!("Loader gone; asset {} will never load", id);
                }
            }
            PrimitiveRenderState {
                mesh_node_id: NodeId::new(1_000 + mesh),
                primitive_id: id,
                instance_id: InstanceId::new(handle.raw() * 1_000 + mesh),
                joint_pose_mapping: skin,
                skinning_origin: Transform::from_position([0.0, 0.9, 0.0]),
            }
        })
        .collect();

    let nodes: Vec<NodeId> = primitives.iter().map(|p| p.mesh_node_id).collect();
    provider.publish_render(
        handle,
        RenderPublish {
            all_mesh_nodes: nodes.clone(),
            visible_mesh_nodes: nodes,
            primitives,
            tier,
        },
    );
}

/// Provider-side events at fixed ticks.
fn script(provider: &ScriptedProvider, jobs: &Sender<LoadJob>, tick: u64) {
    match tick {
        40 => {
            for raw in 1..=ENTITY_COUNT {
                publish_avatar(provider, jobs, EntityHandle::new(raw), ContentTier::User, 0);
            }
        }
        // A new hierarchy lands while user content may still be loading.
        45 => publish_avatar(provider, jobs, EntityHandle::new(3), ContentTier::User, 4),
        120 => {
            let visible = (0..MESHES_PER_AVATAR)
                .step_by(2)
                .map(|m| NodeId::new(1_000 + m))
                .collect();
            provider.set_visible(EntityHandle::new(2), visible);
        }
        _ => {}
    }
}

fn drain(events: &Receiver<(EntityHandle, EntityEvent)>) {
    for (entity, event) in events.try_iter() {
        match event {
            EntityEvent::LoadFailed(error) => println!("  {entity}: load failed: {error}"),
            other => println!("  {entity}: {other:?}"),
        }
    }
}

fn all_settled(manager: &AvatarManager) -> bool {
    manager.entities().all(|e| {
        !e.is_rebuilding() && (e.versions() == e.target_versions() || e.last_error().is_some())
    })
}

fn accumulate(totals: &mut ManagerStats, tick: &ManagerStats) {
    totals.tick = tick.tick;
    totals.entities = tick.entities;
    totals.committed += tick.committed;
    totals.failed += tick.failed;
    totals.superseded += tick.superseded;
    totals.starved += tick.starved;
    totals.waiting += tick.waiting;
    totals.steps = totals.steps.saturating_add(tick.steps);
}

fn print_summary(
    manager: &AvatarManager,
    provider: &ScriptedProvider,
    totals: &ManagerStats,
    ticks: u64,
    elapsed: Duration,
) {
    let scheduler = manager.scheduler_totals();
    println!();
    println!("┌─ RUN ──────────────────────────────────────────────────────────┐");
    println!("│ Ticks:              {ticks}");
    println!("│ Wall time:          {:.1} ms", elapsed.as_secs_f64() * 1_000.0);
    println!("│ Steps:              {}", totals.steps);
    println!("│ Commits:            {}", totals.committed);
    println!("│ Failures:           {}", totals.failed);
    println!("│ Superseded:         {}", totals.superseded);
    println!("│ Entity-ticks waiting: {}", totals.waiting);
    println!("│ Entity-ticks starved: {}", totals.starved);
    println!("└────────────────────────────────────────────────────────────────┘");
    println!("┌─ SCHEDULER ────────────────────────────────────────────────────┐");
    println!("│ Pipelines started:  {}", scheduler.started);
    println!("│ Completed:          {}", scheduler.completed);
    println!("│ Cancelled:          {}", scheduler.cancelled);
    println!("│ Preempted:          {}", scheduler.preempted);
    println!("│ Waits / Delays:     {} / {}", scheduler.waits, scheduler.delays);
    println!("└────────────────────────────────────────────────────────────────┘");
    println!("┌─ ENTITIES ─────────────────────────────────────────────────────┐");
    for entity in manager.entities() {
        let state = entity.state();
        let marker = if state == LifecycleState::UserAvatar { "✓" } else { " " };
        println!(
            "│ {marker} {}: {state}, {} joints, {} renderables, {} visible, cost {} verts",
            entity.handle(),
            entity.skeleton_joint_count(),
            entity.renderables().len(),
            entity.visible().len(),
            entity.lod().total_cost().vertices,
        );
    }
    println!("└────────────────────────────────────────────────────────────────┘");
    println!("  Shared assets registered: {}", provider.assets().len());
}
