//! Local transform value type shared by joints and skinning origins.

/// Translation, rotation (xyzw quaternion) and scale.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Translation.
    pub position: [f32; 3],
    /// Rotation as an `[x, y, z, w]` quaternion.
    pub orientation: [f32; 4],
    /// Non-uniform scale.
    pub scale: [f32; 3],
}

impl Transform {
    /// The identity transform.
    pub const IDENTITY: Self = Self {
        position: [0.0; 3],
        orientation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0; 3],
    };

    /// Identity rotation and scale at `position`.
    #[inline]
    #[must_use]
    pub const fn from_position(position: [f32; 3]) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
