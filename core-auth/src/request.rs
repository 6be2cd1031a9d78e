//! Authorization request assembly.
//!
//! Builds the full authorization URL for a provider from its credentials,
//! the redirect URI, and freshly generated PKCE material. The redirect URI
//! used here must match the registered one byte for byte, and the exact
//! same string is sent again during the token exchange.

use url::Url;

use crate::error::{AuthError, Result};
use crate::pkce;
use crate::types::{ProviderCredentials, ProviderKind, TenantHint};

/// The two endpoints a provider's OAuth surface exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub auth_url: String,
    pub token_url: String,
}

impl ProviderEndpoints {
    /// Resolve the endpoints for a set of credentials. For OneDrive the
    /// tenant hint selects the `login.microsoftonline.com` path segment.
    pub fn for_credentials(credentials: &ProviderCredentials) -> Self {
        match credentials {
            ProviderCredentials::GoogleDrive { .. } => Self {
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
            },
            ProviderCredentials::OneDrive { tenant, .. } => Self::onedrive(*tenant),
        }
    }

    fn onedrive(tenant: TenantHint) -> Self {
        let segment = tenant.as_path_segment();
        Self {
            auth_url: format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/authorize",
                segment
            ),
            token_url: format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                segment
            ),
        }
    }
}

/// Everything needed to send a user to the consent screen and later redeem
/// the resulting code.
///
/// The verifier lives here only until it is journaled; the struct is never
/// persisted as a whole.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub code_verifier: String,
    pub code_challenge: String,
    pub state: String,
}

impl AuthRequest {
    /// Build a request with fresh PKCE material and the provider's default
    /// scopes.
    pub fn new(credentials: &ProviderCredentials, redirect_uri: impl Into<String>) -> Self {
        let code_verifier = pkce::generate_verifier();
        let code_challenge = pkce::derive_challenge(&code_verifier);
        Self {
            client_id: credentials.client_id().to_string(),
            scopes: credentials.kind().default_scopes(),
            redirect_uri: redirect_uri.into(),
            code_verifier,
            code_challenge,
            state: pkce::generate_state(),
        }
    }

    /// Render the authorization URL the browser should navigate to.
    ///
    /// Google additionally gets `access_type=offline`, which is its switch
    /// for issuing a refresh token; OneDrive expresses the same thing via
    /// the `offline_access` scope.
    pub fn authorization_url(
        &self,
        kind: ProviderKind,
        endpoints: &ProviderEndpoints,
    ) -> Result<String> {
        let mut url = Url::parse(&endpoints.auth_url)
            .map_err(|e| AuthError::InvalidUrl(format!("{}: {}", endpoints.auth_url, e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", &self.state)
            .append_pair("code_challenge", &self.code_challenge)
            .append_pair("code_challenge_method", "S256");

        if kind == ProviderKind::GoogleDrive {
            url.query_pairs_mut().append_pair("access_type", "offline");
        }

        Ok(url.into())
    }
}
