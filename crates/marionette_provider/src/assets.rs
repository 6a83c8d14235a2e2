//! # Shared Primitive Assets
//!
//! A primitive asset (mesh + material unit) is shared by every entity that
//! references the same [`PrimitiveId`]. Entities hold an `Arc` for as long
//! as one of their renderables uses it; the registry holds one more.
//!
//! ## Load Protocol
//!
//! ```text
//! Loading --finish_load(data)--> Loaded
//!         --cancel()-----------> Cancelled
//!         --fail()-------------> Failed
//! ```
//!
//! Data is written exactly once, *before* the status flips, so a reader that
//! observes `Loaded` always sees the data. Nothing mutates an asset after
//! load time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use marionette_core::PrimitiveId;
use parking_lot::RwLock;

/// Load status of a shared asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AssetStatus {
    /// Decode still running on a provider worker.
    Loading = 0,
    /// Data is available.
    Loaded = 1,
    /// The load was cancelled.
    Cancelled = 2,
    /// The load failed.
    Failed = 3,
}

impl AssetStatus {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loaded,
            2 => Self::Cancelled,
            3 => Self::Failed,
            _ => Self::Loading,
        }
    }
}

/// Level-of-detail membership bits of a primitive.
///
/// Bit `n` set means the primitive belongs to LOD bucket `n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct LodFlags(u32);

impl LodFlags {
    /// Highest LOD bucket representable.
    pub const MAX_BUCKETS: u8 = 8;

    /// Wraps raw flag bits.
    #[inline]
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Flags for a single bucket.
    #[inline]
    #[must_use]
    pub const fn single(bucket: u8) -> Self {
        Self(1 << bucket)
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// The bucket this primitive is accounted under: its lowest set bit.
    ///
    /// Returns `None` when no representable bucket is set.
    #[inline]
    #[must_use]
    pub const fn bucket(self) -> Option<u8> {
        let masked = self.0 & ((1 << Self::MAX_BUCKETS) - 1);
        if masked == 0 {
            None
        } else {
            Some(masked.trailing_zeros() as u8)
        }
    }
}

/// Render cost of one primitive instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct PrimitiveCost {
    /// Vertex count.
    pub vertices: u32,
    /// Triangle count.
    pub triangles: u32,
    /// Vertices that need skinning.
    pub skinned_vertices: u32,
}

impl PrimitiveCost {
    /// Creates a cost record.
    #[inline]
    #[must_use]
    pub const fn new(vertices: u32, triangles: u32, skinned_vertices: u32) -> Self {
        Self {
            vertices,
            triangles,
            skinned_vertices,
        }
    }
}

/// Decoded metadata of a loaded primitive.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PrimitiveData {
    /// Names of the joints the mesh is skinned to, in asset joint order.
    pub joint_names: Vec<String>,
    /// LOD buckets the primitive belongs to.
    pub lod_flags: LodFlags,
    /// Render cost per instance.
    pub cost: PrimitiveCost,
}

impl PrimitiveData {
    /// Number of joints the mesh expects a mapping for.
    #[inline]
    #[must_use]
    pub fn joint_count(&self) -> usize {
        self.joint_names.len()
    }

    /// Checks whether the primitive is skinned.
    #[inline]
    #[must_use]
    pub fn is_skinned(&self) -> bool {
        !self.joint_names.is_empty()
    }
}

/// A shared, reference-counted primitive asset.
#[derive(Debug)]
pub struct PrimitiveAsset {
    id: PrimitiveId,
    status: AtomicU8,
    data: OnceLock<PrimitiveData>,
}

impl PrimitiveAsset {
    /// Creates an asset in the `Loading` state.
    #[must_use]
    pub fn new(id: PrimitiveId) -> Self {
        Self {
            id,
            status: AtomicU8::new(AssetStatus::Loading as u8),
            data: OnceLock::new(),
        }
    }

    /// Creates an asset that is already loaded.
    #[must_use]
    pub fn loaded(id: PrimitiveId, data: PrimitiveData) -> Self {
        let asset = Self::new(id);
        let _ = asset.finish_load(data);
        asset
    }

    /// The asset id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> PrimitiveId {
        self.id
    }

    /// Current load status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> AssetStatus {
        AssetStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Checks whether the data is available.
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.status() == AssetStatus::Loaded
    }

    /// Checks whether the load ended without data (cancelled or failed).
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.status(), AssetStatus::Cancelled | AssetStatus::Failed)
    }

    /// The decoded data, once loaded.
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&PrimitiveData> {
        if self.is_loaded() {
            self.data.get()
        } else {
            None
        }
    }

    /// Publishes decoded data. Called once, by the loader.
    ///
    /// Returns `false` if the load already ended.
    pub fn finish_load(&self, data: PrimitiveData) -> bool {
        if self.status() != AssetStatus::Loading || self.data.set(data).is_err() {
            return false;
        }
        // A cancel that lands after the data write wins; the data stays hidden.
        self.status
            .compare_exchange(
                AssetStatus::Loading as u8,
                AssetStatus::Loaded as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Marks the load as cancelled. No-op once the load has ended.
    pub fn cancel(&self) {
        self.end_load(AssetStatus::Cancelled);
    }

    /// Marks the load as failed. No-op once the load has ended.
    pub fn fail(&self) {
        self.end_load(AssetStatus::Failed);
    }

    fn end_load(&self, status: AssetStatus) {
        let _ = self.status.compare_exchange(
            AssetStatus::Loading as u8,
            status as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Registry of shared primitives, keyed by asset id.
///
/// # Thread Safety
///
/// Lookups take a read lock; inserts and purges take a write lock. Loader
/// threads only touch the atomics on each asset, never the map.
#[derive(Debug, Default)]
pub struct AssetRegistry {
    assets: RwLock<HashMap<PrimitiveId, Arc<PrimitiveAsset>>>,
}

impl AssetRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the asset for `id`, registering a `Loading` one if absent.
    pub fn request(&self, id: PrimitiveId) -> Arc<PrimitiveAsset> {
        if let Some(asset) = self.assets.read().get(&id) {
            return Arc::clone(asset);
        }
        let mut assets = self.assets.write();
        Arc::clone(
            assets
                .entry(id)
                .or_insert_with(|| Arc::new(PrimitiveAsset::new(id))),
        )
    }

    /// Registers a fully built asset, replacing nothing if `id` exists.
    pub fn insert(&self, asset: PrimitiveAsset) -> Arc<PrimitiveAsset> {
        let id = asset.id();
        let mut assets = self.assets.write();
        Arc::clone(assets.entry(id).or_insert_with(|| Arc::new(asset)))
    }

    /// Looks up an asset without registering it.
    #[must_use]
    pub fn get(&self, id: PrimitiveId) -> Option<Arc<PrimitiveAsset>> {
        self.assets.read().get(&id).map(Arc::clone)
    }

    /// Number of references held outside the registry.
    #[must_use]
    pub fn ref_count(&self, id: PrimitiveId) -> usize {
        self.assets
            .read()
            .get(&id)
            .map_or(0, |asset| Arc::strong_count(asset).saturating_sub(1))
    }

    /// Drops every asset nobody outside the registry references.
    ///
    /// Returns the number of assets removed.
    pub fn purge_unused(&self) -> usize {
        let mut assets = self.assets.write();
        let before = assets.len();
        assets.retain(|_, asset| Arc::strong_count(asset) > 1);
        let purged = before - assets.len();
        if purged > 0 {
            tracing::debug!("Purged {} unused primitive assets", purged);
        }
        purged
    }

    /// Number of registered assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    /// Checks if no assets are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }
}
