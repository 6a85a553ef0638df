//! Branded identifier newtypes.
//!
//! Ids are opaque strings on the wire. Locally minted ids get a short type
//! prefix plus a UUIDv7 so they sort by creation time; server-issued ids are
//! accepted verbatim via [`FromStr`]/`from_raw`. Provisional message ids use
//! the reserved [`PROVISIONAL_PREFIX`] so the engine can tell an unconfirmed
//! send apart from a confirmed message by inspection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        /// Branded identifier newtype over an opaque string.
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a fresh id with this type's prefix.
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Wrap an externally issued id without validation.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(ConversationId, "conv");
branded_id!(MessageId, "msg");
branded_id!(UserId, "user");

/// Reserved prefix for message ids minted locally for not-yet-confirmed sends.
///
/// The server never issues ids with this prefix.
pub const PROVISIONAL_PREFIX: &str = "local_";

impl MessageId {
    /// Mint a provisional id for an optimistic send awaiting confirmation.
    pub fn provisional() -> Self {
        Self(format!("{}{}", PROVISIONAL_PREFIX, Uuid::now_v7()))
    }

    /// True when this id was minted locally and is awaiting confirmation.
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }
}
