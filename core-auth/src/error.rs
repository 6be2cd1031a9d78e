//! Error taxonomy for the authorization flow.
//!
//! Every failure the coordinator can surface maps to one of these variants.
//! `user_message` folds them into the three situations an end user can act
//! on: the consent was declined, something technical failed, or the session
//! ended and they must sign in again.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// The provider returned `error`/`error_description` on the redirect.
    /// Surfaced verbatim; the flow must be restarted.
    #[error("Provider rejected the authorization: {code}")]
    ProviderError {
        code: String,
        description: Option<String>,
    },

    /// The continuation store no longer holds the PKCE verifier for the
    /// delivered code. Unrecoverable for this attempt: the verifier cannot
    /// be reconstructed, and the code is now orphaned.
    #[error("PKCE verifier missing, restart authentication")]
    VerifierMissing,

    /// The `state` echoed by the provider does not match the journaled one.
    #[error("OAuth state mismatch")]
    StateMismatch,

    /// The code-for-token exchange failed. `status` is `None` for transport
    /// failures (network error, timeout) and `Some` for provider rejections.
    #[error("Token exchange failed: {description}")]
    TokenExchange {
        status: Option<u16>,
        provider_code: Option<String>,
        description: String,
    },

    /// The refresh-token exchange failed. Callers must treat this as
    /// "session ended" and prompt a full re-authentication.
    #[error("Token refresh failed: {description}")]
    TokenRefresh {
        status: Option<u16>,
        provider_code: Option<String>,
        description: String,
    },

    /// The continuation store or token vault could not be read or written.
    #[error("Storage unavailable: {0}")]
    Storage(String),

    /// Persisted data could not be serialized or deserialized.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Persisted tokens were present but undecodable; they have been removed.
    #[error("Stored tokens corrupted: {reason}")]
    TokenCorrupted { reason: String },

    /// No stored token set exists for the requested profile.
    #[error("No tokens stored for profile {0}")]
    ProfileNotFound(String),

    /// A stored token set has no refresh token to renew it with.
    #[error("No refresh token available for profile {0}")]
    NoRefreshToken(String),

    /// An authorization or token endpoint URL could not be parsed.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

impl AuthError {
    /// Whether retrying the same attempt may succeed without user action.
    ///
    /// Transport-level exchange failures and provider 5xx responses are
    /// transient; everything else requires restarting the flow.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::TokenExchange { status, .. } | AuthError::TokenRefresh { status, .. } => {
                match status {
                    None => true,
                    Some(s) => (500..600).contains(s),
                }
            }
            _ => false,
        }
    }

    /// A human-readable message distinguishing "declined" from "technical
    /// failure" from "session expired".
    pub fn user_message(&self) -> String {
        match self {
            AuthError::ProviderError { code, description } => {
                let detail = description.as_deref().unwrap_or(code);
                format!("The provider declined the request: {}", detail)
            }
            AuthError::VerifierMissing | AuthError::StateMismatch => {
                "The sign-in attempt could not be verified. Please start again.".to_string()
            }
            AuthError::TokenRefresh { .. } | AuthError::NoRefreshToken(_) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            _ => "A network or technical failure occurred. Please try again.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

impl From<bridge_traits::BridgeError> for AuthError {
    fn from(err: bridge_traits::BridgeError) -> Self {
        AuthError::Storage(err.to_string())
    }
}
