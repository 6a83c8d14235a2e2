//! # Provider Identifiers
//!
//! Every identifier here is issued by the avatar provider and is opaque to
//! the core. Node ids are stable across frames for unchanged content; new
//! ids appear whenever the provider's content changes.

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident($repr:ty)) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name($repr);

        impl $name {
            /// Sentinel for "no such id".
            pub const INVALID: Self = Self(<$repr>::MAX);

            /// Wraps a raw provider value.
            #[inline]
            #[must_use]
            pub const fn new(raw: $repr) -> Self {
                Self(raw)
            }

            /// Returns the raw provider value.
            #[inline]
            #[must_use]
            pub const fn raw(self) -> $repr {
                self.0
            }

            /// Checks if this id is not the sentinel.
            #[inline]
            #[must_use]
            pub const fn is_valid(self) -> bool {
                self.0 != <$repr>::MAX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

opaque_id!(
    /// A position in the avatar's skeleton or render hierarchy.
    NodeId(u32)
);

opaque_id!(
    /// A loadable mesh/material asset, possibly shared across entities.
    PrimitiveId(u64)
);

opaque_id!(
    /// A render instance handle for one primitive on one entity.
    InstanceId(u32)
);

opaque_id!(
    /// The provider-side handle of one avatar entity.
    EntityHandle(u32)
);

/// Well-known joints an entity may ask the provider to resolve.
///
/// These are the "critical joints" external animation and attachment code
/// looks up by role rather than by node id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointType {
    /// Skeleton root.
    Root,
    /// Hips / pelvis.
    Hips,
    /// Lower spine.
    Spine,
    /// Chest.
    Chest,
    /// Neck.
    Neck,
    /// Head.
    Head,
    /// Left shoulder.
    LeftShoulder,
    /// Left upper arm.
    LeftArmUpper,
    /// Left forearm.
    LeftArmLower,
    /// Left wrist.
    LeftWrist,
    /// Right shoulder.
    RightShoulder,
    /// Right upper arm.
    RightArmUpper,
    /// Right forearm.
    RightArmLower,
    /// Right wrist.
    RightWrist,
    /// Left thigh.
    LeftLegUpper,
    /// Left shin.
    LeftLegLower,
    /// Left foot.
    LeftFoot,
    /// Right thigh.
    RightLegUpper,
    /// Right shin.
    RightLegLower,
    /// Right foot.
    RightFoot,
}

impl JointType {
    /// Every joint type, in declaration order.
    pub const ALL: [Self; 20] = [
        Self::Root,
        Self::Hips,
        Self::Spine,
        Self::Chest,
        Self::Neck,
        Self::Head,
        Self::LeftShoulder,
        Self::LeftArmUpper,
        Self::LeftArmLower,
        Self::LeftWrist,
        Self::RightShoulder,
        Self::RightArmUpper,
        Self::RightArmLower,
        Self::RightWrist,
        Self::LeftLegUpper,
        Self::LeftLegLower,
        Self::LeftFoot,
        Self::RightLegUpper,
        Self::RightLegLower,
        Self::RightFoot,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip_and_sentinel() {
        let node = NodeId::new(42);
        assert_eq!(node.raw(), 42);
        assert!(node.is_valid());
        assert!(!NodeId::INVALID.is_valid());
        assert_eq!(NodeId::default(), NodeId::INVALID);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(NodeId::new(7).to_string(), "NodeId#7");
        assert_eq!(PrimitiveId::new(9).to_string(), "PrimitiveId#9");
    }

    #[test]
    fn test_joint_type_all_is_unique() {
        let mut seen = std::collections::HashSet::new();
        for joint in JointType::ALL {
            assert!(seen.insert(joint));
        }
    }
}
