//! # banter-store
//!
//! Authoritative in-memory state for the conversation sync engine: one
//! summary per conversation plus an ordered message list per thread.
//!
//! The store is deliberately dumb. All operations are synchronous, touch
//! nothing but the store's own maps, and report what they did so the engine
//! can decide what to broadcast. Policy (unread counting, reconciliation,
//! when to reload) lives in `banter-engine`; the store only enforces the
//! structural invariants:
//!
//! - message ids are unique within a thread
//! - a provisional entry and its confirmed counterpart never coexist
//! - display order is pinned-first (stable), then recency
//!
//! ## Crate Position
//!
//! Depends only on `banter-core`. Used by `banter-engine`.

#![deny(unsafe_code)]

mod store;

pub use store::{ConversationStore, ReplaceOutcome};
