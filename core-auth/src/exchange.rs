//! Token endpoint client: code exchange and refresh.
//!
//! Both operations are single-shot form POSTs with a hard timeout and no
//! retry loop; whether an attempt is worth repeating is the caller's call
//! (via [`AuthError::is_transient`]). As public PKCE clients, requests
//! never carry a client secret.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{HttpClient, HttpMethod, HttpRequest};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AuthError, Result};
use crate::request::ProviderEndpoints;
use crate::types::TokenSet;

/// Hard bound on a single token endpoint call.
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

fn default_expires_in() -> i64 {
    3600
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Success payload of the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    scope: Option<String>,
}

/// Error payload of the token endpoint (RFC 6749 §5.2).
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client for a provider's token endpoint.
pub struct TokenClient {
    http: Arc<dyn HttpClient>,
}

impl TokenClient {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Redeem an authorization code for a token set.
    ///
    /// `redirect_uri` must be the byte-identical string used in the
    /// authorization request, and `code_verifier` the journaled PKCE
    /// verifier for this attempt.
    pub async fn exchange_code(
        &self,
        endpoints: &ProviderEndpoints,
        client_id: &str,
        redirect_uri: &str,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenSet> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("code", code),
            ("code_verifier", code_verifier),
        ];
        debug!(token_url = %endpoints.token_url, "Exchanging authorization code");
        self.post_token_request(&endpoints.token_url, &params, None)
            .await
            .map_err(|e| match e {
                AuthError::TokenRefresh {
                    status,
                    provider_code,
                    description,
                } => AuthError::TokenExchange {
                    status,
                    provider_code,
                    description,
                },
                other => other,
            })
    }

    /// Renew an access token with a refresh token.
    ///
    /// If the provider's response omits `refresh_token` (Google does on
    /// refresh), the previous one is carried forward in the returned set.
    pub async fn refresh(
        &self,
        endpoints: &ProviderEndpoints,
        client_id: &str,
        redirect_uri: &str,
        refresh_token: &str,
    ) -> Result<TokenSet> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("refresh_token", refresh_token),
        ];
        debug!(token_url = %endpoints.token_url, "Refreshing access token");
        self.post_token_request(&endpoints.token_url, &params, Some(refresh_token))
            .await
    }

    /// Shared POST path. Failures come back as `TokenRefresh`; the code
    /// exchange re-labels them as `TokenExchange`.
    async fn post_token_request(
        &self,
        token_url: &str,
        params: &[(&str, &str)],
        carry_refresh_token: Option<&str>,
    ) -> Result<TokenSet> {
        let body = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Serialization(e.to_string()))?;
        let request = HttpRequest::new(HttpMethod::Post, token_url)
            .form_body(body)
            .timeout(TOKEN_TIMEOUT);

        let response = self.http.execute(request).await.map_err(|e| {
            AuthError::TokenRefresh {
                status: None,
                provider_code: None,
                description: e.to_string(),
            }
        })?;

        if !response.is_success() {
            let (provider_code, description) = match response.json::<OAuthErrorBody>() {
                Ok(body) => {
                    let description = body
                        .error_description
                        .unwrap_or_else(|| body.error.clone());
                    (Some(body.error), description)
                }
                Err(_) => (None, format!("HTTP {}", response.status)),
            };
            warn!(
                status = response.status,
                code = provider_code.as_deref().unwrap_or("unknown"),
                "Token endpoint rejected request"
            );
            return Err(AuthError::TokenRefresh {
                status: Some(response.status),
                provider_code,
                description,
            });
        }

        let parsed: TokenResponse = response.json().map_err(|e| AuthError::TokenRefresh {
            status: Some(response.status),
            provider_code: None,
            description: format!("Malformed token response: {}", e),
        })?;

        Ok(TokenSet {
            access_token: parsed.access_token,
            refresh_token: parsed
                .refresh_token
                .or_else(|| carry_refresh_token.map(String::from)),
            token_type: parsed.token_type,
            expires_in: parsed.expires_in,
            scope: parsed.scope,
            obtained_at: Utc::now(),
        })
    }
}
