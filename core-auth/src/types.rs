//! Core domain types for provider connections and stored tokens.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Cloud storage providers the coordinator can connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    GoogleDrive,
    OneDrive,
}

impl ProviderKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::GoogleDrive => "Google Drive",
            ProviderKind::OneDrive => "OneDrive",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GoogleDrive => "google_drive",
            ProviderKind::OneDrive => "onedrive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "google_drive" => Some(ProviderKind::GoogleDrive),
            "onedrive" => Some(ProviderKind::OneDrive),
            _ => None,
        }
    }

    /// The OAuth scopes requested when connecting this provider.
    ///
    /// OneDrive needs `offline_access` spelled out to receive a refresh
    /// token; Google grants one through `access_type=offline` instead.
    pub fn default_scopes(&self) -> Vec<String> {
        match self {
            ProviderKind::GoogleDrive => {
                vec!["https://www.googleapis.com/auth/drive.readonly".to_string()]
            }
            ProviderKind::OneDrive => {
                vec!["Files.Read".to_string(), "offline_access".to_string()]
            }
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which Microsoft identity tenant a OneDrive connection targets.
///
/// Becomes the path segment in the `login.microsoftonline.com` endpoint
/// URLs: personal accounts use `consumers`, work/school use
/// `organizations`, and `common` accepts either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TenantHint {
    #[default]
    Common,
    Personal,
    Organizational,
}

impl TenantHint {
    pub fn as_path_segment(&self) -> &'static str {
        match self {
            TenantHint::Common => "common",
            TenantHint::Personal => "consumers",
            TenantHint::Organizational => "organizations",
        }
    }
}

/// Per-connection provider configuration supplied by the application.
///
/// Only public PKCE clients are supported; there is deliberately no field
/// for a client secret anywhere in this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderCredentials {
    GoogleDrive {
        client_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        root_folder: Option<String>,
    },
    // Tag must match `ProviderKind::as_str`, which snake_casing would not.
    #[serde(rename = "onedrive")]
    OneDrive {
        client_id: String,
        #[serde(default)]
        tenant: TenantHint,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_path: Option<String>,
    },
}

impl ProviderCredentials {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderCredentials::GoogleDrive { .. } => ProviderKind::GoogleDrive,
            ProviderCredentials::OneDrive { .. } => ProviderKind::OneDrive,
        }
    }

    pub fn client_id(&self) -> &str {
        match self {
            ProviderCredentials::GoogleDrive { client_id, .. } => client_id,
            ProviderCredentials::OneDrive { client_id, .. } => client_id,
        }
    }
}

/// Stable identifier for a connected account profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bundle of OAuth tokens as stored in the vault.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Access token lifetime in seconds, as reported by the provider.
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Local clock reading captured when the token response arrived.
    pub obtained_at: DateTime<Utc>,
}

impl TokenSet {
    /// The instant the access token stops being usable.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.obtained_at + Duration::seconds(self.expires_in)
    }

    /// A token exactly at its expiry instant counts as expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at()
    }

    /// Expiry check with a safety margin, so a token about to lapse is
    /// refreshed before a request is sent with it.
    pub fn is_expired_with_buffer(&self, buffer_secs: i64) -> bool {
        Utc::now() >= self.expires_at() - Duration::seconds(buffer_secs)
    }
}

// Token values must never reach logs.
impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// The journaled record of a connection attempt awaiting its redirect.
///
/// Written to the continuation store before navigating away; read back by
/// the post-redirect page load. Starting a new connection overwrites any
/// previous record, which abandons the older attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConnection {
    pub credentials: ProviderCredentials,
    pub redirect_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_state: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A fully established connection: identity plus live tokens.
#[derive(Debug, Clone)]
pub struct ConnectedAccount {
    pub profile_id: ProfileId,
    pub credentials: ProviderCredentials,
    pub tokens: TokenSet,
}

/// What the provider delivered in the callback query string, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthCallbackResult {
    /// Successful consent: an authorization code, optionally with the
    /// echoed `state`.
    Code { code: String, state: Option<String> },
    /// The provider reported an error (for example `access_denied`).
    ProviderError {
        error: String,
        description: Option<String>,
    },
    /// The URL carries no OAuth parameters at all; an ordinary page load.
    None,
}

impl OAuthCallbackResult {
    /// Classify a page-load URL. An `error` parameter wins over `code` if a
    /// malformed redirect somehow carries both.
    pub fn from_url(url: &url::Url) -> Self {
        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            OAuthCallbackResult::ProviderError { error, description }
        } else if let Some(code) = code {
            OAuthCallbackResult::Code { code, state }
        } else {
            OAuthCallbackResult::None
        }
    }
}

/// Connection flow progress, as observed by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    AwaitingRedirect,
    Exchanging,
    Completed,
    Failed,
    Cancelled,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowState::Completed | FlowState::Failed | FlowState::Cancelled
        )
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowState::Idle => "idle",
            FlowState::AwaitingRedirect => "awaiting_redirect",
            FlowState::Exchanging => "exchanging",
            FlowState::Completed => "completed",
            FlowState::Failed => "failed",
            FlowState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_set(expires_in: i64, obtained_at: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: "at-123".to_string(),
            refresh_token: Some("rt-456".to_string()),
            token_type: "Bearer".to_string(),
            expires_in,
            scope: None,
            obtained_at,
        }
    }

    #[test]
    fn test_provider_kind_round_trip() {
        for kind in [ProviderKind::GoogleDrive, ProviderKind::OneDrive] {
            assert_eq!(ProviderKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::parse("dropbox"), None);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        // Obtained exactly `expires_in` seconds ago: now == expires_at.
        let tokens = token_set(3600, Utc::now() - Duration::seconds(3600));
        assert!(tokens.is_expired());

        let fresh = token_set(3600, Utc::now());
        assert!(!fresh.is_expired());
        assert!(!fresh.is_expired_with_buffer(300));

        let nearly = token_set(3600, Utc::now() - Duration::seconds(3400));
        assert!(!nearly.is_expired());
        assert!(nearly.is_expired_with_buffer(300));
    }

    #[test]
    fn test_token_set_debug_redacts_secrets() {
        let tokens = token_set(3600, Utc::now());
        let debug = format!("{:?}", tokens);
        assert!(!debug.contains("at-123"));
        assert!(!debug.contains("rt-456"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_callback_classification() {
        let url = url::Url::parse("https://app.example/settings?code=abc&state=xyz").unwrap();
        assert_eq!(
            OAuthCallbackResult::from_url(&url),
            OAuthCallbackResult::Code {
                code: "abc".to_string(),
                state: Some("xyz".to_string()),
            }
        );

        let url =
            url::Url::parse("https://app.example/?error=access_denied&error_description=nope")
                .unwrap();
        assert_eq!(
            OAuthCallbackResult::from_url(&url),
            OAuthCallbackResult::ProviderError {
                error: "access_denied".to_string(),
                description: Some("nope".to_string()),
            }
        );

        // Error outranks code on a malformed redirect.
        let url = url::Url::parse("https://app.example/?code=abc&error=server_error").unwrap();
        assert!(matches!(
            OAuthCallbackResult::from_url(&url),
            OAuthCallbackResult::ProviderError { .. }
        ));

        let url = url::Url::parse("https://app.example/settings?tab=storage").unwrap();
        assert_eq!(OAuthCallbackResult::from_url(&url), OAuthCallbackResult::None);
    }

    #[test]
    fn test_credentials_serde_tagging() {
        let creds = ProviderCredentials::OneDrive {
            client_id: "client-1".to_string(),
            tenant: TenantHint::Personal,
            base_path: None,
        };
        let json = serde_json::to_string(&creds).unwrap();
        assert!(json.contains("\"provider\":\"onedrive\""));
        assert!(json.contains("\"tenant\":\"personal\""));

        let back: ProviderCredentials = serde_json::from_str(&json).unwrap();
        assert_eq!(back, creds);

        // The tag must be the same identifier `ProviderKind` reports, so a
        // host can echo a reported provider back as a credentials tag.
        for creds in [
            creds,
            ProviderCredentials::GoogleDrive {
                client_id: "client-2".to_string(),
                root_folder: None,
            },
        ] {
            let value: serde_json::Value = serde_json::to_value(&creds).unwrap();
            assert_eq!(value["provider"], creds.kind().as_str());
        }
    }

    #[test]
    fn test_flow_state_terminality() {
        assert!(!FlowState::Idle.is_terminal());
        assert!(!FlowState::AwaitingRedirect.is_terminal());
        assert!(!FlowState::Exchanging.is_terminal());
        assert!(FlowState::Completed.is_terminal());
        assert!(FlowState::Failed.is_terminal());
        assert!(FlowState::Cancelled.is_terminal());
    }
}
