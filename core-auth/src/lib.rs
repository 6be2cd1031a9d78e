//! # Core Auth
//!
//! Browser-oriented OAuth 2.0 authorization-code-with-PKCE coordinator for
//! cloud storage providers. The defining constraint is that the browser
//! leaves the application entirely during the consent redirect: everything
//! the flow needs afterwards is journaled through [`bridge_traits`]
//! persistence before navigating away, and the post-redirect page load
//! picks the attempt back up.
//!
//! ## Modules
//!
//! - [`pkce`]: verifier/challenge generation (S256 only)
//! - [`request`]: provider endpoints and authorization URL assembly
//! - [`continuation`]: the redirect-surviving flow journal
//! - [`exchange`]: token endpoint client (code exchange, refresh)
//! - [`token_store`]: token set persistence over the vault bridge
//! - [`coordinator`]: the flow state machine tying it all together
//! - [`fallback`]: manual copy/paste completion path

pub mod continuation;
pub mod coordinator;
pub mod error;
pub mod exchange;
pub mod fallback;
pub mod pkce;
pub mod request;
pub mod token_store;
pub mod types;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use continuation::FlowJournal;
pub use coordinator::{RedirectCoordinator, RedirectOutcome, StartOutcome};
pub use error::{AuthError, Result};
pub use exchange::TokenClient;
pub use fallback::ManualFallbackBridge;
pub use request::{AuthRequest, ProviderEndpoints};
pub use token_store::TokenStore;
pub use types::{
    ConnectedAccount, FlowState, OAuthCallbackResult, PendingConnection, ProfileId,
    ProviderCredentials, ProviderKind, TenantHint, TokenSet,
};
