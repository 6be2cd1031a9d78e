//! Durable Storage Abstractions
//!
//! Two persistence contracts with different lifetimes back the auth core:
//!
//! - [`ContinuationStore`]: key/value persistence that survives a full page
//!   reload. The browser leaves the application entirely during an OAuth
//!   redirect; anything the post-redirect page load needs (the PKCE verifier,
//!   the pending connection intent, the replay-guard marker) must live here,
//!   never only in memory.
//! - [`TokenVault`]: longer-lived secret storage for serialized token sets,
//!   surviving a browser restart. Implementations encrypt at rest where the
//!   platform allows.

use crate::error::Result;
use crate::platform::PlatformSendSync;

/// Page-reload-surviving key/value persistence.
///
/// Scoped to the browser profile. Values are short strings (serialized JSON
/// or bare markers); implementations are not expected to handle large blobs.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ContinuationStore;
///
/// async fn stash(store: &dyn ContinuationStore) -> Result<()> {
///     store.set("pkce-verifier", "dBjftJeZ4CVP...").await?;
///     Ok(())
/// }
/// ```
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
pub trait ContinuationStore: PlatformSendSync {
    /// Store a value, replacing any previous value under the key.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a value, or `None` if the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Secret storage for serialized token sets.
///
/// # Security Requirements
///
/// Implementations MUST:
/// - Encrypt data at rest where the platform provides primitives for it
/// - Never log or expose stored values
/// - Securely overwrite on replacement
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
pub trait TokenVault: PlatformSendSync {
    /// Store a secret value
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// List all secret keys (without values)
    async fn list_keys(&self) -> Result<Vec<String>>;
}
