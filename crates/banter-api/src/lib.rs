//! # banter-api
//!
//! Request/response client for the admin-console conversation endpoints.
//!
//! - **Trait**: [`ConversationApi`], the three calls the messaging screen makes
//! - **Client**: [`HttpConversationApi`], reqwest-backed with typed
//!   [`ApiError`]s
//! - **Test double**: [`mock::MockConversationApi`], scripted so downstream
//!   crates can test send races and failures without a server
//!
//! Push delivery is deliberately absent; it lives in `banter-channel`.
//! Nothing here retries: a failed call surfaces its error and the caller
//! decides what to do with it.

#![deny(unsafe_code)]

pub mod error;
pub mod http;
pub mod mock;

use async_trait::async_trait;
use banter_core::ids::ConversationId;
use banter_core::model::{Conversation, Message};

pub use error::ApiError;
pub use http::{ApiConfig, HttpConversationApi};
pub use mock::{MockConversationApi, SendOutcome};

/// The admin-console endpoints the messaging screen depends on.
///
/// Implementations take `&self` everywhere so one client can be shared
/// behind an `Arc` and called from spawned tasks.
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// Fetch every conversation visible to the signed-in staff user,
    /// newest data included; ordering is the caller's problem.
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    /// Fetch the full message history of one conversation.
    async fn fetch_thread(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<Message>, ApiError>;

    /// Post a message and return the canonical copy the server stored.
    ///
    /// The returned message carries the server-assigned id; callers use it
    /// to retire whatever provisional copy they rendered while waiting.
    async fn send_message(
        &self,
        conversation: &ConversationId,
        text: &str,
    ) -> Result<Message, ApiError>;
}
