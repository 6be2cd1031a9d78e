//! Redirect coordinator: drives a connection attempt across page loads.
//!
//! The flow has two halves separated by a full navigation away from the
//! application. `start_connection` journals the attempt and leaves for the
//! consent screen; `resume_from_page_load` runs on the next page load,
//! classifies the URL, and redeems the code at most once. The in-memory
//! [`FlowState`] only describes the current page load; everything that has
//! to outlive the redirect lives in the [`FlowJournal`].
//!
//! Authorization codes are single-use at the provider. The journal records
//! a code before its exchange is attempted, and every delivery is compared
//! against that record first, so a duplicate page load (back button,
//! refresh, bookmarked callback URL) is absorbed without a second POST.

use std::sync::Arc;

use bridge_traits::{ContinuationStore, HttpClient, PageNavigator, TokenVault};
use chrono::Utc;
use core_runtime::events::{AuthEvent, EventBus};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::continuation::FlowJournal;
use crate::error::{AuthError, Result};
use crate::exchange::TokenClient;
use crate::fallback::ManualFallbackBridge;
use crate::request::{AuthRequest, ProviderEndpoints};
use crate::token_store::TokenStore;
use crate::types::{
    ConnectedAccount, FlowState, OAuthCallbackResult, PendingConnection, ProfileId,
    ProviderCredentials, ProviderKind, TokenSet,
};

/// Refresh an access token this many seconds before it actually lapses.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

/// Result of starting a connection.
#[derive(Debug)]
pub enum StartOutcome {
    /// Usable tokens were already stored; no redirect needed.
    Connected(ConnectedAccount),
    /// The attempt was journaled and the browser told to leave for the
    /// consent screen. On a real page this is the last thing the caller
    /// observes before the navigation happens.
    RedirectPending { authorization_url: String },
}

/// Result of processing a page load.
#[derive(Debug)]
pub enum RedirectOutcome {
    /// The URL carried no OAuth parameters; nothing to do.
    NoCallback,
    /// The delivered code matches one already consumed; absorbed silently.
    DuplicateDelivery,
    /// The code was redeemed and the account stored.
    Connected(ConnectedAccount),
}

pub struct RedirectCoordinator {
    journal: FlowJournal,
    tokens: TokenStore,
    client: TokenClient,
    navigator: Arc<dyn PageNavigator>,
    events: EventBus,
    redirect_uri: String,
    state: Mutex<FlowState>,
    // All callback processing funnels through this lock, making the
    // replay-guard compare-then-set sequence atomic.
    dispatch: Mutex<()>,
    // Serializes refreshes so concurrent callers coalesce onto one POST.
    refresh_gate: Mutex<()>,
}

impl RedirectCoordinator {
    pub fn new(
        continuation: Arc<dyn ContinuationStore>,
        vault: Arc<dyn TokenVault>,
        http: Arc<dyn HttpClient>,
        navigator: Arc<dyn PageNavigator>,
        events: EventBus,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            journal: FlowJournal::new(continuation),
            tokens: TokenStore::new(vault),
            client: TokenClient::new(http),
            navigator,
            events,
            redirect_uri: redirect_uri.into(),
            state: Mutex::new(FlowState::Idle),
            dispatch: Mutex::new(()),
            refresh_gate: Mutex::new(()),
        }
    }

    pub async fn current_state(&self) -> FlowState {
        *self.state.lock().await
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Connect a provider: reuse stored tokens when a profile already
    /// exists, otherwise journal a fresh attempt and navigate away.
    pub async fn start_connection(
        &self,
        credentials: ProviderCredentials,
    ) -> Result<StartOutcome> {
        let provider = credentials.kind();
        self.events
            .emit(AuthEvent::ConnectStarted {
                provider: provider.to_string(),
            })
            .ok();

        if let Some((profile_id, tokens)) = self.tokens.find_profile(provider).await? {
            // An expired set with a refresh token is still a live session;
            // `fresh_access_token` renews it on first use.
            if !tokens.is_expired() || tokens.refresh_token.is_some() {
                info!(provider = %provider, profile_id = %profile_id, "Reusing stored tokens");
                *self.state.lock().await = FlowState::Completed;
                self.events
                    .emit(AuthEvent::Connected {
                        profile_id: profile_id.to_string(),
                        provider: provider.to_string(),
                    })
                    .ok();
                return Ok(StartOutcome::Connected(ConnectedAccount {
                    profile_id,
                    credentials,
                    tokens,
                }));
            }
        }

        let authorization_url = self.begin_redirect(credentials).await?;
        self.navigator.navigate(&authorization_url)?;
        Ok(StartOutcome::RedirectPending { authorization_url })
    }

    /// Start a connection without navigating: the caller shows the URL for
    /// the user to open themselves and later pastes the code back in.
    /// Used when the host environment blocks or mangles the redirect.
    pub async fn begin_manual_connection(
        self: &Arc<Self>,
        credentials: ProviderCredentials,
    ) -> Result<ManualFallbackBridge> {
        let provider = credentials.kind();
        self.events
            .emit(AuthEvent::ConnectStarted {
                provider: provider.to_string(),
            })
            .ok();
        let authorization_url = self.begin_redirect(credentials).await?;
        Ok(ManualFallbackBridge::new(self.clone(), authorization_url))
    }

    /// Journal a fresh attempt and return its authorization URL. A new
    /// attempt overwrites any journaled one; there is exactly one pending
    /// connection slot.
    async fn begin_redirect(&self, credentials: ProviderCredentials) -> Result<String> {
        // A fresh attempt gets a fresh code; any marker from the previous
        // attempt no longer guards anything.
        self.journal.clear_replay_guard().await?;
        let provider = credentials.kind();
        let endpoints = ProviderEndpoints::for_credentials(&credentials);
        let request = AuthRequest::new(&credentials, self.redirect_uri.clone());
        let authorization_url = request.authorization_url(provider, &endpoints)?;

        let pending = PendingConnection {
            credentials,
            redirect_uri: self.redirect_uri.clone(),
            expected_state: Some(request.state.clone()),
            created_at: Utc::now(),
        };
        self.journal.record_pending(&pending).await?;
        self.journal.record_verifier(&request.code_verifier).await?;

        *self.state.lock().await = FlowState::AwaitingRedirect;
        self.events
            .emit(AuthEvent::AwaitingRedirect {
                provider: provider.to_string(),
            })
            .ok();
        info!(provider = %provider, "Awaiting provider redirect");
        Ok(authorization_url)
    }

    /// Process the current page URL. Call once per page load, after the
    /// coordinator is constructed.
    pub async fn resume_from_page_load(&self) -> Result<RedirectOutcome> {
        let raw = self.navigator.current_url()?;
        let url = Url::parse(&raw).map_err(|e| AuthError::InvalidUrl(format!("{}: {}", raw, e)))?;
        self.handle_callback(OAuthCallbackResult::from_url(&url))
            .await
    }

    /// Redeem a manually pasted authorization code.
    pub async fn submit_manual_code(&self, code: &str) -> Result<RedirectOutcome> {
        self.handle_callback(OAuthCallbackResult::Code {
            code: code.trim().to_string(),
            state: None,
        })
        .await
    }

    async fn handle_callback(&self, callback: OAuthCallbackResult) -> Result<RedirectOutcome> {
        let _dispatch = self.dispatch.lock().await;

        match callback {
            OAuthCallbackResult::None => {
                debug!("Page load carries no callback parameters");
                Ok(RedirectOutcome::NoCallback)
            }
            OAuthCallbackResult::ProviderError { error, description } => {
                self.fail_attempt(
                    None,
                    AuthError::ProviderError {
                        code: error,
                        description,
                    },
                    false,
                )
                .await
            }
            OAuthCallbackResult::Code { code, state } => self.process_code(code, state).await,
        }
    }

    /// Runs with the dispatch lock held.
    async fn process_code(&self, code: String, state: Option<String>) -> Result<RedirectOutcome> {
        if self.journal.last_processed_code().await?.as_deref() == Some(code.as_str()) {
            debug!("Duplicate delivery of an already-consumed code");
            self.strip_callback_params();
            return Ok(RedirectOutcome::DuplicateDelivery);
        }
        // Claim the code before anything that can fail; a reload during the
        // exchange must see it as consumed.
        self.journal.mark_code(&code).await?;
        *self.state.lock().await = FlowState::Exchanging;

        let pending = match self.journal.pending().await? {
            Some(pending) => pending,
            None => {
                return self
                    .fail_attempt(None, AuthError::VerifierMissing, false)
                    .await;
            }
        };
        let provider = pending.credentials.kind();

        let verifier = match self.journal.verifier().await? {
            Some(verifier) => verifier,
            None => {
                return self
                    .fail_attempt(Some(provider), AuthError::VerifierMissing, false)
                    .await;
            }
        };

        // Only checked when the callback carried a state at all; a manually
        // pasted code has none.
        if let (Some(echoed), Some(expected)) = (&state, &pending.expected_state) {
            if echoed != expected {
                return self
                    .fail_attempt(Some(provider), AuthError::StateMismatch, false)
                    .await;
            }
        }

        let endpoints = ProviderEndpoints::for_credentials(&pending.credentials);
        match self
            .client
            .exchange_code(
                &endpoints,
                pending.credentials.client_id(),
                &pending.redirect_uri,
                &code,
                &verifier,
            )
            .await
        {
            Ok(tokens) => self.complete_attempt(pending, tokens).await,
            Err(e) => {
                // The code was never redeemed, so the guard must not keep
                // treating it as consumed.
                self.journal.clear_replay_guard().await?;
                let transient = e.is_transient();
                self.fail_with_cleanup(Some(provider), e, transient).await
            }
        }
    }

    async fn complete_attempt(
        &self,
        pending: PendingConnection,
        tokens: TokenSet,
    ) -> Result<RedirectOutcome> {
        let provider = pending.credentials.kind();
        let profile_id = ProfileId::new();
        self.tokens
            .store_tokens(provider, &profile_id, &tokens)
            .await?;
        // The pending record and verifier are spent, but the guard marker
        // must outlive the success: a re-delivery of the consumed code
        // (back button, bookmarked callback URL) is absorbed against it.
        // The marker is dropped when the next attempt begins.
        self.journal.clear_pending().await?;
        self.strip_callback_params();

        *self.state.lock().await = FlowState::Completed;
        self.events
            .emit(AuthEvent::Connected {
                profile_id: profile_id.to_string(),
                provider: provider.to_string(),
            })
            .ok();
        info!(provider = %provider, profile_id = %profile_id, "Connection established");

        Ok(RedirectOutcome::Connected(ConnectedAccount {
            profile_id,
            credentials: pending.credentials,
            tokens,
        }))
    }

    /// Unrecoverable failure: wipe the whole journal entry.
    async fn fail_attempt(
        &self,
        provider: Option<ProviderKind>,
        error: AuthError,
        recoverable: bool,
    ) -> Result<RedirectOutcome> {
        self.journal.clear_all().await?;
        self.finish_failed(provider, error, recoverable).await
    }

    /// Exchange failure: the journal entry survives a transient error so a
    /// retried attempt can reuse the pending record, but is dropped when
    /// the provider definitively rejected the grant.
    async fn fail_with_cleanup(
        &self,
        provider: Option<ProviderKind>,
        error: AuthError,
        transient: bool,
    ) -> Result<RedirectOutcome> {
        if !transient {
            self.journal.clear_pending().await?;
        }
        self.finish_failed(provider, error, transient).await
    }

    async fn finish_failed(
        &self,
        provider: Option<ProviderKind>,
        error: AuthError,
        recoverable: bool,
    ) -> Result<RedirectOutcome> {
        self.strip_callback_params();
        *self.state.lock().await = FlowState::Failed;
        warn!(error = %error, recoverable, "Connection attempt failed");
        self.events
            .emit(AuthEvent::ConnectFailed {
                provider: provider.map(|p| p.to_string()),
                message: error.user_message(),
                recoverable,
            })
            .ok();
        Err(error)
    }

    /// Abandon the journaled attempt, if any.
    pub async fn cancel_pending_connection(&self) -> Result<()> {
        let provider = self
            .journal
            .pending()
            .await
            .ok()
            .flatten()
            .map(|p| p.credentials.kind());
        self.journal.clear_all().await?;
        *self.state.lock().await = FlowState::Cancelled;
        self.events
            .emit(AuthEvent::Cancelled {
                provider: provider.map(|p| p.to_string()),
            })
            .ok();
        info!("Pending connection cancelled");
        Ok(())
    }

    /// Remove OAuth callback parameters from the visible URL so a manual
    /// refresh does not re-deliver them. Best effort: a page whose URL
    /// cannot be rewritten still completed the flow.
    fn strip_callback_params(&self) {
        let Ok(raw) = self.navigator.current_url() else {
            return;
        };
        let Ok(mut url) = Url::parse(&raw) else {
            return;
        };

        let (stripped, retained): (Vec<(String, String)>, Vec<(String, String)>) = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .partition(|(k, _)| {
                matches!(k.as_str(), "code" | "state" | "error" | "error_description")
            });
        if stripped.is_empty() {
            return;
        }

        if retained.is_empty() {
            url.set_query(None);
        } else {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (k, v) in &retained {
                pairs.append_pair(k, v);
            }
        }

        if let Err(e) = self.navigator.replace_url(url.as_str()) {
            warn!(error = %e, "Could not strip callback parameters from URL");
        }
    }

    /// Return a non-expired access token for a connected profile,
    /// refreshing it first when it is within the expiry buffer.
    ///
    /// Concurrent callers coalesce: the gate admits one at a time, and each
    /// re-reads the vault after acquiring it, so a refresh finished by the
    /// previous holder is reused rather than repeated. A failed refresh is
    /// reported once, not retried here.
    pub async fn fresh_access_token(
        &self,
        credentials: &ProviderCredentials,
        profile_id: &ProfileId,
    ) -> Result<String> {
        let provider = credentials.kind();
        let _gate = self.refresh_gate.lock().await;

        let tokens = self
            .tokens
            .retrieve_tokens(provider, profile_id)
            .await?
            .ok_or_else(|| AuthError::ProfileNotFound(profile_id.to_string()))?;

        if !tokens.is_expired_with_buffer(TOKEN_REFRESH_BUFFER_SECS) {
            return Ok(tokens.access_token);
        }

        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            self.tokens.delete_tokens(provider, profile_id).await?;
            self.events
                .emit(AuthEvent::SessionExpired {
                    profile_id: profile_id.to_string(),
                })
                .ok();
            return Err(AuthError::NoRefreshToken(profile_id.to_string()));
        };

        self.events
            .emit(AuthEvent::TokenRefreshing {
                profile_id: profile_id.to_string(),
            })
            .ok();
        let endpoints = ProviderEndpoints::for_credentials(credentials);
        match self
            .client
            .refresh(
                &endpoints,
                credentials.client_id(),
                &self.redirect_uri,
                refresh_token,
            )
            .await
        {
            Ok(renewed) => {
                self.tokens
                    .store_tokens(provider, profile_id, &renewed)
                    .await?;
                self.events
                    .emit(AuthEvent::TokenRefreshed {
                        profile_id: profile_id.to_string(),
                        expires_at: renewed.expires_at().timestamp(),
                    })
                    .ok();
                debug!(profile_id = %profile_id, "Access token refreshed");
                Ok(renewed.access_token)
            }
            Err(e) => {
                if !e.is_transient() {
                    // The refresh token is dead; the stored session with it.
                    self.tokens.delete_tokens(provider, profile_id).await?;
                    self.events
                        .emit(AuthEvent::SessionExpired {
                            profile_id: profile_id.to_string(),
                        })
                        .ok();
                }
                warn!(profile_id = %profile_id, error = %e, "Token refresh failed");
                Err(e)
            }
        }
    }

    /// Disconnect a profile: drop its stored tokens.
    pub async fn disconnect(
        &self,
        provider: ProviderKind,
        profile_id: &ProfileId,
    ) -> Result<()> {
        self.tokens.delete_tokens(provider, profile_id).await?;
        info!(provider = %provider, profile_id = %profile_id, "Profile disconnected");
        Ok(())
    }
}
