//! JavaScript bindings for the redirect coordinator.
//!
//! Constructs the browser bridge implementations internally, so a host page
//! only supplies its redirect URI and provider credentials (as JSON, shaped
//! like [`ProviderCredentials`]). Results cross the boundary as JSON
//! strings; errors become JS exceptions carrying the user-facing message.

use std::sync::Arc;

use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use bridge_wasm::{BrowserNavigator, FetchHttpClient, LocalStorageStore, WebTokenVault};
use core_runtime::events::EventBus;

use crate::coordinator::{RedirectCoordinator, RedirectOutcome, StartOutcome};
use crate::error::AuthError;
use crate::types::{ProfileId, ProviderCredentials};

fn js_error(e: AuthError) -> JsValue {
    JsValue::from_str(&e.user_message())
}

fn bridge_error(e: bridge_traits::BridgeError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn parse_credentials(json: &str) -> Result<ProviderCredentials, JsValue> {
    serde_json::from_str(json)
        .map_err(|e| JsValue::from_str(&format!("Invalid credentials: {}", e)))
}

fn outcome_json(value: serde_json::Value) -> JsValue {
    JsValue::from_str(&value.to_string())
}

/// Redirect coordinator wired to browser bridges.
#[wasm_bindgen]
pub struct JsRedirectCoordinator {
    inner: Arc<RedirectCoordinator>,
}

#[wasm_bindgen]
impl JsRedirectCoordinator {
    /// Create a coordinator for a page served at `redirect_uri`. The URI
    /// must match the one registered with each provider byte for byte.
    #[wasm_bindgen(constructor)]
    pub fn new(redirect_uri: String) -> Result<JsRedirectCoordinator, JsValue> {
        let continuation = Arc::new(LocalStorageStore::new().map_err(bridge_error)?);
        let vault = Arc::new(WebTokenVault::new().map_err(bridge_error)?);
        let http = Arc::new(FetchHttpClient::new().map_err(bridge_error)?);
        let navigator = Arc::new(BrowserNavigator::new().map_err(bridge_error)?);

        let inner = Arc::new(RedirectCoordinator::new(
            continuation,
            vault,
            http,
            navigator,
            EventBus::default(),
            redirect_uri,
        ));
        Ok(Self { inner })
    }

    /// Begin connecting a provider. Resolves to
    /// `{"outcome":"connected","profile_id":...}` when stored tokens were
    /// reused, or `{"outcome":"redirect_pending","authorization_url":...}`
    /// right before the page navigates away.
    #[wasm_bindgen(js_name = startConnection)]
    pub async fn start_connection(&self, credentials_json: String) -> Result<JsValue, JsValue> {
        let credentials = parse_credentials(&credentials_json)?;
        match self.inner.start_connection(credentials).await {
            Ok(StartOutcome::Connected(account)) => Ok(outcome_json(serde_json::json!({
                "outcome": "connected",
                "profile_id": account.profile_id.to_string(),
                "provider": account.credentials.kind().as_str(),
            }))),
            Ok(StartOutcome::RedirectPending { authorization_url }) => {
                Ok(outcome_json(serde_json::json!({
                    "outcome": "redirect_pending",
                    "authorization_url": authorization_url,
                })))
            }
            Err(e) => Err(js_error(e)),
        }
    }

    /// Process the current page URL. Call once on every page load.
    #[wasm_bindgen(js_name = resumeFromPageLoad)]
    pub async fn resume_from_page_load(&self) -> Result<JsValue, JsValue> {
        match self.inner.resume_from_page_load().await {
            Ok(outcome) => Ok(redirect_outcome_json(outcome)),
            Err(e) => Err(js_error(e)),
        }
    }

    /// Redeem a manually pasted authorization code.
    #[wasm_bindgen(js_name = submitManualCode)]
    pub async fn submit_manual_code(&self, code: String) -> Result<JsValue, JsValue> {
        match self.inner.submit_manual_code(&code).await {
            Ok(outcome) => Ok(redirect_outcome_json(outcome)),
            Err(e) => Err(js_error(e)),
        }
    }

    /// Abandon any journaled connection attempt.
    #[wasm_bindgen(js_name = cancelPendingConnection)]
    pub async fn cancel_pending_connection(&self) -> Result<(), JsValue> {
        self.inner
            .cancel_pending_connection()
            .await
            .map_err(js_error)
    }

    /// Return a usable access token for a connected profile, refreshing it
    /// first if needed.
    #[wasm_bindgen(js_name = freshAccessToken)]
    pub async fn fresh_access_token(
        &self,
        credentials_json: String,
        profile_id: String,
    ) -> Result<String, JsValue> {
        let credentials = parse_credentials(&credentials_json)?;
        self.inner
            .fresh_access_token(&credentials, &ProfileId::from_string(profile_id))
            .await
            .map_err(js_error)
    }

    /// Remove a profile's stored tokens.
    #[wasm_bindgen]
    pub async fn disconnect(
        &self,
        credentials_json: String,
        profile_id: String,
    ) -> Result<(), JsValue> {
        let credentials = parse_credentials(&credentials_json)?;
        self.inner
            .disconnect(credentials.kind(), &ProfileId::from_string(profile_id))
            .await
            .map_err(js_error)
    }

    /// Subscribe `callback` to auth events. Each event arrives as a JSON
    /// string with an `event` tag. The subscription lives as long as the
    /// page; subscribe once at startup.
    #[wasm_bindgen(js_name = onEvent)]
    pub fn on_event(&self, callback: js_sys::Function) {
        let mut rx = self.inner.events().subscribe();
        spawn_local(async move {
            while let Ok(event) = rx.recv().await {
                let Ok(json) = serde_json::to_string(&event) else {
                    continue;
                };
                let _ = callback.call1(&JsValue::NULL, &JsValue::from_str(&json));
            }
        });
    }
}

fn redirect_outcome_json(outcome: RedirectOutcome) -> JsValue {
    match outcome {
        RedirectOutcome::NoCallback => outcome_json(serde_json::json!({
            "outcome": "no_callback",
        })),
        RedirectOutcome::DuplicateDelivery => outcome_json(serde_json::json!({
            "outcome": "duplicate_delivery",
        })),
        RedirectOutcome::Connected(account) => outcome_json(serde_json::json!({
            "outcome": "connected",
            "profile_id": account.profile_id.to_string(),
            "provider": account.credentials.kind().as_str(),
        })),
    }
}
