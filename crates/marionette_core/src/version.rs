//! # Version Tracking
//!
//! The provider publishes three version tokens with every render state:
//!
//! ```text
//! hierarchy      - skeleton joint topology
//! all_nodes      - the full set of mesh nodes
//! visible_nodes  - the subset currently meant to be rendered
//! ```
//!
//! The tracker holds the locally committed (`current`) triple and the triple
//! the in-flight or last attempted rebuild is aiming for (`target`). A
//! `current` token equals the published one iff the local structure matches
//! the provider's.
//!
//! ## Policy
//!
//! - Hierarchy rebuilds always win over visibility rebuilds.
//! - A rebuild already targeting the published version is never re-triggered.
//!   After a failure the target is kept, so only a newer version retries. A
//!   failed hierarchy rebuild also retries when only render versions move.
//! - `current` is written by commits only.

/// Opaque monotonic version counter issued by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct VersionToken(u32);

impl VersionToken {
    /// Version before anything has been loaded.
    pub const INVALID: Self = Self(0);

    /// Wraps a raw provider counter.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw counter.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Checks if this token refers to a published state.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Returns the next token. Never yields [`VersionToken::INVALID`].
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        match self.0.checked_add(1) {
            Some(raw) => Self(raw),
            None => Self(1),
        }
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "v{}", self.0)
        } else {
            f.write_str("v-")
        }
    }
}

/// The three version tokens describing one render state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct VersionTriple {
    /// Skeleton topology version.
    pub hierarchy: VersionToken,
    /// Full mesh node set version.
    pub all_nodes: VersionToken,
    /// Visible mesh node subset version.
    pub visible_nodes: VersionToken,
}

impl VersionTriple {
    /// All three tokens invalid.
    pub const INVALID: Self = Self {
        hierarchy: VersionToken::INVALID,
        all_nodes: VersionToken::INVALID,
        visible_nodes: VersionToken::INVALID,
    };

    /// Creates a triple from its parts.
    #[inline]
    #[must_use]
    pub const fn new(
        hierarchy: VersionToken,
        all_nodes: VersionToken,
        visible_nodes: VersionToken,
    ) -> Self {
        Self {
            hierarchy,
            all_nodes,
            visible_nodes,
        }
    }

    /// Checks whether the node sets (all or visible) differ.
    #[inline]
    #[must_use]
    pub fn render_differs(&self, other: &Self) -> bool {
        self.all_nodes != other.all_nodes || self.visible_nodes != other.visible_nodes
    }
}

/// Which kind of rebuild a pipeline performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RebuildKind {
    /// Skeleton, then primitives, then visibility.
    Hierarchy,
    /// Primitives and visibility against the current skeleton.
    Visibility,
}

/// Outcome of comparing the tracker against a published triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncDecision {
    /// Local structure matches the published one.
    Synced,
    /// Stale, but a rebuild already targets the published version
    /// (in flight, or failed and waiting for a newer version).
    Suppressed,
    /// Stale; start a rebuild of `kind` aiming for `target`.
    Rebuild {
        /// Kind of rebuild to start.
        kind: RebuildKind,
        /// Versions the rebuild aims for.
        target: VersionTriple,
    },
}

/// Current/target bookkeeping for one entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VersionTracker {
    current: VersionTriple,
    target: VersionTriple,
}

impl VersionTracker {
    /// Creates a tracker with nothing loaded.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            current: VersionTriple::INVALID,
            target: VersionTriple::INVALID,
        }
    }

    /// Versions of the locally committed structure.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> VersionTriple {
        self.current
    }

    /// Versions the in-flight (or last failed) rebuild aims for.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> VersionTriple {
        self.target
    }

    /// Checks whether local state matches `published` exactly.
    #[inline]
    #[must_use]
    pub fn is_synced_with(&self, published: &VersionTriple) -> bool {
        self.current == *published
    }

    /// Decides what, if anything, to rebuild for `published`.
    ///
    /// `in_flight` is the kind of the rebuild currently running, if any.
    /// A `Rebuild` decision moves the matching `target` fields to
    /// `published`; the caller must start (or restart) a pipeline.
    pub fn plan(
        &mut self,
        published: VersionTriple,
        in_flight: Option<RebuildKind>,
    ) -> SyncDecision {
        if self.current.hierarchy != published.hierarchy {
            let targeted = self.target.hierarchy == published.hierarchy;
            if targeted
                && (in_flight == Some(RebuildKind::Hierarchy) || self.target == published)
            {
                return SyncDecision::Suppressed;
            }
            self.target = published;
            return SyncDecision::Rebuild {
                kind: RebuildKind::Hierarchy,
                target: published,
            };
        }

        if self.current.render_differs(&published) {
            // An out-of-date skeleton must not interpret render state.
            if in_flight == Some(RebuildKind::Hierarchy) {
                return SyncDecision::Suppressed;
            }
            if !self.target.render_differs(&published) {
                return SyncDecision::Suppressed;
            }
            self.target.all_nodes = published.all_nodes;
            self.target.visible_nodes = published.visible_nodes;
            return SyncDecision::Rebuild {
                kind: RebuildKind::Visibility,
                target: VersionTriple {
                    hierarchy: self.current.hierarchy,
                    ..published
                },
            };
        }

        SyncDecision::Synced
    }

    /// Records a committed skeleton for `hierarchy`.
    pub fn commit_hierarchy(&mut self, hierarchy: VersionToken) {
        debug_assert!(
            hierarchy >= self.current.hierarchy,
            "hierarchy version went backwards: {} -> {}",
            self.current.hierarchy,
            hierarchy
        );
        self.current.hierarchy = hierarchy;
        if self.target.hierarchy < hierarchy {
            self.target.hierarchy = hierarchy;
        }
    }

    /// Records committed render structure for `all_nodes`/`visible_nodes`.
    pub fn commit_render(&mut self, all_nodes: VersionToken, visible_nodes: VersionToken) {
        debug_assert!(
            visible_nodes >= self.current.visible_nodes,
            "visible version went backwards: {} -> {}",
            self.current.visible_nodes,
            visible_nodes
        );
        self.current.all_nodes = all_nodes;
        self.current.visible_nodes = visible_nodes;
        if self.target.all_nodes < all_nodes {
            self.target.all_nodes = all_nodes;
        }
        if self.target.visible_nodes < visible_nodes {
            self.target.visible_nodes = visible_nodes;
        }
    }

    /// Forgets the target of an abandoned rebuild so the next plan retries.
    pub fn abandon(&mut self, kind: RebuildKind) {
        match kind {
            RebuildKind::Hierarchy => self.target = self.current,
            RebuildKind::Visibility => {
                self.target.all_nodes = self.current.all_nodes;
                self.target.visible_nodes = self.current.visible_nodes;
            }
        }
    }

    /// Returns to the never-loaded state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
