//! Per-user dynamic update tokens.
//!
//! A token is an opaque bearer credential that lets a dynamic DNS client update an address
//! record in its owner's zone without going through the authenticating proxy. Each user has
//! at most one token. It stays stable until it is reset or deleted.
//!
//! [`file::FileTokenStore`] keeps one file per user in a directory next to the BIND config.

use crate::error::Error;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod file;

#[allow(clippy::module_name_repetitions)]
pub use file::FileTokenStore;

/// Length of a token in hex digits, excluding separators.
pub const TOKEN_LENGTH: usize = 16;
const TOKEN_GROUP: usize = 4;

/// `DynTokenStore` is a type alias for a [`TokenStore`] that can be used by multiple read/write
/// consumers that coordinate through an [`Arc`] and a [`RwLock`] wrapping the [`TokenStore`].
#[allow(clippy::module_name_repetitions)]
pub type DynTokenStore = Arc<RwLock<dyn TokenStore + Send + Sync>>;

#[async_trait::async_trait]
pub trait TokenStore {
    /// The user's token, issuing and persisting a new one if they have none.
    async fn get_or_create(&mut self, username: &str) -> Result<String, Error>;

    /// Replace the user's token with a freshly generated one.
    async fn reset(&mut self, username: &str) -> Result<String, Error>;

    /// Forget the user's token. Deleting a missing token is not an error.
    async fn delete(&mut self, username: &str) -> Result<(), Error>;

    /// The user owning `token`, if any.
    async fn find_user_for_token(&self, token: &str) -> Result<Option<String>, Error>;
}

/// Generate a new token from the OS CSPRNG, e.g. `3f2a-09bc-77de-1a40`.
#[must_use]
pub fn generate_token() -> String {
    let mut raw = [0u8; TOKEN_LENGTH / 2];
    OsRng.fill_bytes(&mut raw);
    let digits = hex::encode(raw);
    digits
        .as_bytes()
        .chunks(TOKEN_GROUP)
        .map(|group| String::from_utf8_lossy(group))
        .collect::<Vec<_>>()
        .join("-")
}
