//! # banter-core
//!
//! Foundation types for the Banter conversation synchronization engine.
//!
//! This crate provides the shared vocabulary the other banter crates depend on:
//!
//! - **Branded IDs**: [`ids::ConversationId`], [`ids::MessageId`],
//!   [`ids::UserId`] as newtypes; provisional message ids carry a reserved
//!   prefix so unconfirmed sends are distinguishable from server-issued ones
//! - **Data model**: [`model::Conversation`] summaries and [`model::Message`]
//!   thread entries, plus [`model::ConversationPatch`] for partial updates
//! - **Wire events**: [`events::PushEvent`], the closed set of tagged push
//!   payloads, validated at the boundary by [`events::PushEvent::parse`]
//! - **Logging**: [`logging::init_subscriber`] for `tracing` setup
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other banter crates.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod logging;
pub mod model;
