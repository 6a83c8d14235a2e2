//! # Proxy Memory
//!
//! Entity-owned scene proxies (skeleton joints, renderables) live in flat
//! generational pools instead of an engine object graph.
//!
//! ## Design Philosophy
//!
//! - Identity is the handle: same index *and* generation means same object
//! - Freed slots are recycled, stale handles simply miss
//! - "Reparenting" is writing an index, never moving memory

mod pool;

pub use pool::{Handle, ProxyPool};
