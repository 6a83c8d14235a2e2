//! # Marionette
//!
//! Keeps locally built avatar scenes in step with an external avatar
//! provider that publishes skeleton and render state asynchronously.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         AvatarManager                            │
//! │   tick ─> entity 1 ─> entity 2 ─> ... (insertion order, budget)  │
//! └──────────────┬───────────────────────────────────────────────────┘
//!                │ &dyn AvatarProvider
//!   ┌────────────v────────────┐        ┌─────────────────────────────┐
//!   │ marionette_entity       │        │ marionette_provider         │
//!   │ • VersionTracker plan   │<──────>│ • pose / render queries     │
//!   │ • RebuildPipeline       │  poll  │ • shared AssetRegistry      │
//!   │ • Lifecycle + listeners │        │ • ScriptedProvider          │
//!   └─────────────────────────┘        └─────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML configuration
//! - `manager`: per-tick driver with a shared frame budget

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod manager;

pub use marionette_core as core;
pub use marionette_entity as entity;
pub use marionette_provider as provider;

pub use config::{ConfigError, ConfigResult, MarionetteConfig};
pub use manager::{AvatarManager, ManagerStats};
