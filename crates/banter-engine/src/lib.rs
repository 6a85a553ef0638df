//! # banter-engine
//!
//! The synchronization engine behind the messaging screen: one task that
//! owns the store, the push subscriptions, and every reconciliation rule.
//!
//! - [`Engine::start`] spawns the engine task for a session
//! - [`EngineHandle`] submits sends, switches conversations, reads
//!   snapshots, and tears the session down
//! - [`EngineUpdate`] tells renderers which snapshot went stale
//!
//! ## Concurrency model
//!
//! Every mutation runs on the engine task, one event at a time: commands,
//! push events, and resolved background work all funnel through a single
//! `select!` loop. Network calls never block that loop; they run in spawned
//! tasks and report back through an internal queue. There are no locks, and
//! no handler has an await point between reading and writing the store.

#![deny(unsafe_code)]

mod command;
mod config;
mod engine;
mod handle;
mod update;

pub use config::EngineConfig;
pub use engine::Engine;
pub use handle::{EngineHandle, EngineStopped};
pub use update::EngineUpdate;
