//! # Entity and Scheduler Configuration
//!
//! Plain data, deserializable from TOML by the top-level crate. Every field
//! has a default so partial files work.

use marionette_core::JointType;
use serde::{Deserialize, Serialize};

/// What to do when one primitive cannot be mapped onto the skeleton.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveFailurePolicy {
    /// Log, leave that primitive out, keep loading the rest.
    #[default]
    SkipPrimitive,
    /// Fail the whole rebuild.
    FailEntity,
}

/// Per-entity rebuild settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Joints processed per scheduler step.
    pub skeleton_batch_size: usize,
    /// Primitive descriptors queried per scheduler step.
    pub primitive_batch_size: usize,
    /// Policy for primitive joint-mapping failures.
    pub failure_policy: PrimitiveFailurePolicy,
    /// Ticks an asset may stay pending before the rebuild fails.
    /// `None` waits forever.
    pub asset_wait_timeout_ticks: Option<u32>,
    /// Joint roles resolved after every skeleton commit.
    pub critical_joints: Vec<JointType>,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            skeleton_batch_size: 32,
            primitive_batch_size: 8,
            failure_policy: PrimitiveFailurePolicy::SkipPrimitive,
            asset_wait_timeout_ticks: None,
            critical_joints: vec![
                JointType::Root,
                JointType::Hips,
                JointType::Chest,
                JointType::Head,
                JointType::LeftWrist,
                JointType::RightWrist,
            ],
        }
    }
}

/// Per-frame scheduling limits shared by all entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wall-clock budget for all rebuild work in one frame, in microseconds.
    pub frame_budget_us: u64,
    /// Maximum scheduler steps a single entity may take per frame.
    pub max_steps_per_entity: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_budget_us: 2_000,
            max_steps_per_entity: 64,
        }
    }
}
