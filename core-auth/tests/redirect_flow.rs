//! End-to-end redirect flow scenarios against in-memory bridges.
//!
//! Each test drives a coordinator through the same journal/vault/navigator
//! a page load would see, with the provider's token endpoint scripted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_traits::{
    BridgeError, ContinuationStore, HttpClient, HttpRequest, HttpResponse, PageNavigator,
    TokenVault,
};
use bytes::Bytes;
use chrono::{Duration, Utc};
use core_auth::coordinator::{RedirectCoordinator, RedirectOutcome, StartOutcome};
use core_auth::error::AuthError;
use core_auth::types::{
    ProfileId, ProviderCredentials, ProviderKind, TenantHint, TokenSet,
};
use core_runtime::events::{AuthEvent, EventBus};
use url::Url;

#[derive(Default)]
struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl ContinuationStore for MemoryStore {
    async fn set(&self, key: &str, value: &str) -> bridge_traits::error::Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> bridge_traits::error::Result<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> bridge_traits::error::Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

impl MemoryStore {
    fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }
}

#[derive(Default)]
struct MemoryVault {
    secrets: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl TokenVault for MemoryVault {
    async fn set_secret(&self, key: &str, value: &[u8]) -> bridge_traits::error::Result<()> {
        self.secrets
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> bridge_traits::error::Result<Option<Vec<u8>>> {
        Ok(self.secrets.lock().unwrap().get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> bridge_traits::error::Result<()> {
        self.secrets.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> bridge_traits::error::Result<Vec<String>> {
        Ok(self.secrets.lock().unwrap().keys().cloned().collect())
    }
}

/// Token endpoint with a scripted response queue.
struct ScriptedHttp {
    responses: Mutex<Vec<bridge_traits::error::Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttp {
    fn new(responses: Vec<bridge_traits::error::Result<HttpResponse>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_body(&self) -> String {
        let requests = self.requests.lock().unwrap();
        let request = requests.last().expect("no request recorded");
        String::from_utf8(request.body.clone().unwrap_or_default().to_vec()).unwrap()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        // Suspend once so overlapping callers get a chance to interleave,
        // as a real network round trip would allow.
        tokio::task::yield_now().await;
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(BridgeError::OperationFailed(
                "no scripted response left".to_string(),
            ));
        }
        responses.remove(0)
    }
}

fn token_response(body: &str) -> bridge_traits::error::Result<HttpResponse> {
    Ok(HttpResponse {
        status: 200,
        headers: HashMap::new(),
        body: Bytes::from(body.to_string()),
    })
}

fn error_response(status: u16, body: &str) -> bridge_traits::error::Result<HttpResponse> {
    Ok(HttpResponse {
        status,
        headers: HashMap::new(),
        body: Bytes::from(body.to_string()),
    })
}

const GOOD_TOKENS: &str =
    r#"{"access_token":"at-1","refresh_token":"rt-1","expires_in":3600,"token_type":"Bearer"}"#;

/// Holds the "visible" page URL and records outbound navigations.
struct FakeNavigator {
    current: Mutex<String>,
    navigations: Mutex<Vec<String>>,
}

impl FakeNavigator {
    fn at(url: &str) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(url.to_string()),
            navigations: Mutex::new(Vec::new()),
        })
    }

    fn set_current(&self, url: &str) {
        *self.current.lock().unwrap() = url.to_string();
    }

    fn last_navigation(&self) -> Option<String> {
        self.navigations.lock().unwrap().last().cloned()
    }
}

impl PageNavigator for FakeNavigator {
    fn current_url(&self) -> bridge_traits::error::Result<String> {
        Ok(self.current.lock().unwrap().clone())
    }

    fn navigate(&self, url: &str) -> bridge_traits::error::Result<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn replace_url(&self, url: &str) -> bridge_traits::error::Result<()> {
        self.set_current(url);
        Ok(())
    }
}

const REDIRECT_URI: &str = "https://app.example/settings";

fn google() -> ProviderCredentials {
    ProviderCredentials::GoogleDrive {
        client_id: "google-client".to_string(),
        root_folder: None,
    }
}

fn onedrive() -> ProviderCredentials {
    ProviderCredentials::OneDrive {
        client_id: "ms-client".to_string(),
        tenant: TenantHint::Common,
        base_path: None,
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    vault: Arc<MemoryVault>,
    http: Arc<ScriptedHttp>,
    navigator: Arc<FakeNavigator>,
    coordinator: Arc<RedirectCoordinator>,
}

fn harness(responses: Vec<bridge_traits::error::Result<HttpResponse>>) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let vault = Arc::new(MemoryVault::default());
    let http = ScriptedHttp::new(responses);
    let navigator = FakeNavigator::at(REDIRECT_URI);
    let coordinator = Arc::new(RedirectCoordinator::new(
        store.clone(),
        vault.clone(),
        http.clone(),
        navigator.clone(),
        EventBus::default(),
        REDIRECT_URI,
    ));
    Harness {
        store,
        vault,
        http,
        navigator,
        coordinator,
    }
}

/// Extract the `state` parameter from the recorded authorization URL.
fn state_from_auth_url(navigator: &FakeNavigator) -> String {
    let url = Url::parse(&navigator.last_navigation().expect("no navigation")).unwrap();
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("authorization URL has no state")
}

#[tokio::test]
async fn full_round_trip_connects_and_cleans_up() {
    let h = harness(vec![token_response(GOOD_TOKENS)]);
    let mut events = h.coordinator.events().subscribe();

    let outcome = h.coordinator.start_connection(google()).await.unwrap();
    let StartOutcome::RedirectPending { authorization_url } = outcome else {
        panic!("expected a redirect");
    };
    assert_eq!(
        h.navigator.last_navigation().as_deref(),
        Some(authorization_url.as_str())
    );

    // Provider sends the user back with a code and the echoed state.
    let state = state_from_auth_url(&h.navigator);
    h.navigator
        .set_current(&format!("{}?code=auth-code-1&state={}", REDIRECT_URI, state));

    let outcome = h.coordinator.resume_from_page_load().await.unwrap();
    let RedirectOutcome::Connected(account) = outcome else {
        panic!("expected a connection");
    };
    assert_eq!(account.credentials.kind(), ProviderKind::GoogleDrive);
    assert_eq!(account.tokens.access_token, "at-1");

    // Exactly one exchange, with the journaled verifier and no secret.
    assert_eq!(h.http.request_count(), 1);
    let body = h.http.last_body();
    assert!(body.contains("grant_type=authorization_code"));
    assert!(body.contains("code=auth-code-1"));
    assert!(body.contains("code_verifier="));
    assert!(!body.contains("client_secret"));

    // The pending record and verifier are gone; only the replay-guard
    // marker stays behind to absorb a re-delivery of the consumed code.
    assert_eq!(h.store.keys(), vec!["oauth.last-processed-code".to_string()]);
    assert_eq!(h.navigator.current_url().unwrap(), REDIRECT_URI);

    // Tokens landed in the vault under the new profile.
    let keys = h.vault.list_keys().await.unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("tokens::google_drive::"));

    // Event order: started, awaiting, connected.
    assert!(matches!(
        events.try_recv().unwrap(),
        AuthEvent::ConnectStarted { .. }
    ));
    assert!(matches!(
        events.try_recv().unwrap(),
        AuthEvent::AwaitingRedirect { .. }
    ));
    assert!(matches!(
        events.try_recv().unwrap(),
        AuthEvent::Connected { .. }
    ));
}

#[tokio::test]
async fn duplicate_delivery_is_absorbed_without_second_exchange() {
    let h = harness(vec![token_response(GOOD_TOKENS)]);

    h.coordinator.start_connection(google()).await.unwrap();
    let state = state_from_auth_url(&h.navigator);
    let callback = format!("{}?code=auth-code-1&state={}", REDIRECT_URI, state);

    h.navigator.set_current(&callback);
    assert!(matches!(
        h.coordinator.resume_from_page_load().await.unwrap(),
        RedirectOutcome::Connected(_)
    ));

    // The user hits back/refresh and the same callback URL loads again.
    h.navigator.set_current(&callback);
    assert!(matches!(
        h.coordinator.resume_from_page_load().await.unwrap(),
        RedirectOutcome::DuplicateDelivery
    ));
    assert_eq!(h.http.request_count(), 1);

    // The guard marker lives until the next attempt begins, then drops.
    assert!(h
        .store
        .keys()
        .contains(&"oauth.last-processed-code".to_string()));
    h.navigator.set_current(REDIRECT_URI);
    h.coordinator.start_connection(onedrive()).await.unwrap();
    assert!(!h
        .store
        .keys()
        .contains(&"oauth.last-processed-code".to_string()));
}

#[tokio::test]
async fn provider_error_fails_without_touching_token_endpoint() {
    let h = harness(vec![]);
    let mut events = h.coordinator.events().subscribe();

    h.coordinator.start_connection(google()).await.unwrap();
    h.navigator.set_current(&format!(
        "{}?error=access_denied&error_description=User+declined",
        REDIRECT_URI
    ));

    let err = h.coordinator.resume_from_page_load().await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderError { .. }));
    assert_eq!(h.http.request_count(), 0);
    assert!(h.store.is_empty());
    assert_eq!(h.navigator.current_url().unwrap(), REDIRECT_URI);

    // Skip started/awaiting, then the terminal failure with the decline
    // surfaced as unrecoverable.
    events.try_recv().unwrap();
    events.try_recv().unwrap();
    match events.try_recv().unwrap() {
        AuthEvent::ConnectFailed { recoverable, .. } => assert!(!recoverable),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn code_without_journaled_attempt_is_unrecoverable() {
    // Fresh page load, nothing journaled, but the URL carries a code (for
    // example a bookmarked callback URL).
    let h = harness(vec![]);
    h.navigator
        .set_current(&format!("{}?code=stray-code", REDIRECT_URI));

    let err = h.coordinator.resume_from_page_load().await.unwrap_err();
    assert!(matches!(err, AuthError::VerifierMissing));
    assert_eq!(h.http.request_count(), 0);
    assert!(h.store.is_empty());
    assert_eq!(h.navigator.current_url().unwrap(), REDIRECT_URI);
}

#[tokio::test]
async fn state_mismatch_rejects_the_callback() {
    let h = harness(vec![]);

    h.coordinator.start_connection(google()).await.unwrap();
    h.navigator.set_current(&format!(
        "{}?code=auth-code-1&state=forged-state",
        REDIRECT_URI
    ));

    let err = h.coordinator.resume_from_page_load().await.unwrap_err();
    assert!(matches!(err, AuthError::StateMismatch));
    assert_eq!(h.http.request_count(), 0);
}

#[tokio::test]
async fn transient_exchange_failure_releases_replay_guard() {
    let h = harness(vec![
        error_response(503, r#"{"error":"temporarily_unavailable"}"#),
        token_response(GOOD_TOKENS),
    ]);

    h.coordinator.start_connection(onedrive()).await.unwrap();
    let state = state_from_auth_url(&h.navigator);
    let callback = format!("{}?code=auth-code-1&state={}", REDIRECT_URI, state);

    h.navigator.set_current(&callback);
    let err = h.coordinator.resume_from_page_load().await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(h.http.request_count(), 1);

    // Guard released and pending retained: the same delivery can be
    // retried instead of being absorbed as a duplicate.
    h.navigator.set_current(&callback);
    assert!(matches!(
        h.coordinator.resume_from_page_load().await.unwrap(),
        RedirectOutcome::Connected(_)
    ));
    assert_eq!(h.http.request_count(), 2);
}

#[tokio::test]
async fn rejected_exchange_drops_the_attempt() {
    let h = harness(vec![error_response(
        400,
        r#"{"error":"invalid_grant","error_description":"Code expired"}"#,
    )]);

    h.coordinator.start_connection(google()).await.unwrap();
    let state = state_from_auth_url(&h.navigator);
    h.navigator
        .set_current(&format!("{}?code=auth-code-1&state={}", REDIRECT_URI, state));

    let err = h.coordinator.resume_from_page_load().await.unwrap_err();
    assert!(matches!(err, AuthError::TokenExchange { status: Some(400), .. }));
    assert!(!err.is_transient());

    // The pending record and verifier are gone; re-delivering the code now
    // finds no journaled attempt.
    h.navigator
        .set_current(&format!("{}?code=auth-code-2", REDIRECT_URI));
    let err = h.coordinator.resume_from_page_load().await.unwrap_err();
    assert!(matches!(err, AuthError::VerifierMissing));
    assert_eq!(h.http.request_count(), 1);
}

#[tokio::test]
async fn new_connection_supersedes_pending_attempt() {
    let h = harness(vec![token_response(GOOD_TOKENS)]);

    h.coordinator.start_connection(google()).await.unwrap();
    let first_state = state_from_auth_url(&h.navigator);

    // User changes their mind and starts over with a different provider.
    h.coordinator.start_connection(onedrive()).await.unwrap();
    let second_state = state_from_auth_url(&h.navigator);
    assert_ne!(first_state, second_state);

    h.navigator.set_current(&format!(
        "{}?code=auth-code-2&state={}",
        REDIRECT_URI, second_state
    ));
    let RedirectOutcome::Connected(account) =
        h.coordinator.resume_from_page_load().await.unwrap()
    else {
        panic!("expected a connection");
    };
    assert_eq!(account.credentials.kind(), ProviderKind::OneDrive);
}

#[tokio::test]
async fn cancel_wipes_the_journal() {
    let h = harness(vec![]);

    h.coordinator.start_connection(google()).await.unwrap();
    assert!(!h.store.is_empty());

    h.coordinator.cancel_pending_connection().await.unwrap();
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn stored_tokens_short_circuit_the_redirect() {
    let h = harness(vec![]);
    let profile = ProfileId::from_string("existing");
    let tokens = TokenSet {
        access_token: "at-live".to_string(),
        refresh_token: Some("rt-live".to_string()),
        token_type: "Bearer".to_string(),
        expires_in: 3600,
        scope: None,
        obtained_at: Utc::now(),
    };
    h.vault
        .set_secret(
            "tokens::google_drive::existing",
            &serde_json::to_vec(&tokens).unwrap(),
        )
        .await
        .unwrap();

    let outcome = h.coordinator.start_connection(google()).await.unwrap();
    let StartOutcome::Connected(account) = outcome else {
        panic!("expected stored-token reuse");
    };
    assert_eq!(account.profile_id, profile);
    assert!(h.navigator.last_navigation().is_none());
}

#[tokio::test]
async fn manual_fallback_redeems_pasted_code() {
    let h = harness(vec![token_response(GOOD_TOKENS)]);

    let bridge = h
        .coordinator
        .begin_manual_connection(google())
        .await
        .unwrap();
    assert!(bridge.authorization_url().contains("code_challenge="));
    // The manual path never navigates on its own.
    assert!(h.navigator.last_navigation().is_none());

    let outcome = bridge.submit_code("  pasted-code-1  ").await.unwrap();
    assert!(matches!(outcome, RedirectOutcome::Connected(_)));

    let body = h.http.last_body();
    assert!(body.contains("code=pasted-code-1"));
}

#[tokio::test]
async fn fresh_access_token_skips_refresh_while_valid() {
    let h = harness(vec![]);
    let profile = ProfileId::from_string("p1");
    let tokens = TokenSet {
        access_token: "at-live".to_string(),
        refresh_token: Some("rt-live".to_string()),
        token_type: "Bearer".to_string(),
        expires_in: 3600,
        scope: None,
        obtained_at: Utc::now(),
    };
    h.vault
        .set_secret(
            "tokens::google_drive::p1",
            &serde_json::to_vec(&tokens).unwrap(),
        )
        .await
        .unwrap();

    let token = h
        .coordinator
        .fresh_access_token(&google(), &profile)
        .await
        .unwrap();
    assert_eq!(token, "at-live");
    assert_eq!(h.http.request_count(), 0);
}

#[tokio::test]
async fn fresh_access_token_refreshes_near_expiry() {
    let h = harness(vec![token_response(
        r#"{"access_token":"at-renewed","expires_in":3600}"#,
    )]);
    let profile = ProfileId::from_string("p1");
    let tokens = TokenSet {
        access_token: "at-stale".to_string(),
        refresh_token: Some("rt-live".to_string()),
        token_type: "Bearer".to_string(),
        expires_in: 3600,
        scope: None,
        // Inside the refresh buffer but not yet expired.
        obtained_at: Utc::now() - Duration::seconds(3400),
    };
    h.vault
        .set_secret(
            "tokens::google_drive::p1",
            &serde_json::to_vec(&tokens).unwrap(),
        )
        .await
        .unwrap();

    let token = h
        .coordinator
        .fresh_access_token(&google(), &profile)
        .await
        .unwrap();
    assert_eq!(token, "at-renewed");
    assert_eq!(h.http.request_count(), 1);
    assert!(h.http.last_body().contains("grant_type=refresh_token"));

    // The renewed set was stored, with the old refresh token carried
    // forward; a second call needs no further POST.
    let token = h
        .coordinator
        .fresh_access_token(&google(), &profile)
        .await
        .unwrap();
    assert_eq!(token, "at-renewed");
    assert_eq!(h.http.request_count(), 1);
}

#[tokio::test]
async fn rejected_refresh_ends_the_session() {
    let h = harness(vec![error_response(400, r#"{"error":"invalid_grant"}"#)]);
    let mut events = h.coordinator.events().subscribe();
    let profile = ProfileId::from_string("p1");
    let tokens = TokenSet {
        access_token: "at-stale".to_string(),
        refresh_token: Some("rt-dead".to_string()),
        token_type: "Bearer".to_string(),
        expires_in: 3600,
        scope: None,
        obtained_at: Utc::now() - Duration::seconds(7200),
    };
    h.vault
        .set_secret(
            "tokens::google_drive::p1",
            &serde_json::to_vec(&tokens).unwrap(),
        )
        .await
        .unwrap();

    let err = h
        .coordinator
        .fresh_access_token(&google(), &profile)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenRefresh { .. }));

    // Tokens were dropped: the next call reports the profile missing.
    let err = h
        .coordinator
        .fresh_access_token(&google(), &profile)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ProfileNotFound(_)));

    assert!(matches!(
        events.try_recv().unwrap(),
        AuthEvent::TokenRefreshing { .. }
    ));
    assert!(matches!(
        events.try_recv().unwrap(),
        AuthEvent::SessionExpired { .. }
    ));
}

#[tokio::test]
async fn expired_tokens_without_refresh_token_require_reconnect() {
    let h = harness(vec![]);
    let profile = ProfileId::from_string("p1");
    let tokens = TokenSet {
        access_token: "at-stale".to_string(),
        refresh_token: None,
        token_type: "Bearer".to_string(),
        expires_in: 3600,
        scope: None,
        obtained_at: Utc::now() - Duration::seconds(7200),
    };
    h.vault
        .set_secret(
            "tokens::google_drive::p1",
            &serde_json::to_vec(&tokens).unwrap(),
        )
        .await
        .unwrap();

    let err = h
        .coordinator
        .fresh_access_token(&google(), &profile)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoRefreshToken(_)));
    assert!(h.vault.list_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn overlapping_page_load_handlers_exchange_once() {
    let h = harness(vec![token_response(GOOD_TOKENS)]);

    h.coordinator.start_connection(google()).await.unwrap();
    let state = state_from_auth_url(&h.navigator);
    h.navigator
        .set_current(&format!("{}?code=auth-code-1&state={}", REDIRECT_URI, state));

    // Two handlers race into the same callback; they serialize on the
    // dispatch lock, so one redeems the code and the other observes the
    // guard.
    let (a, b) = tokio::join!(
        h.coordinator.resume_from_page_load(),
        h.coordinator.resume_from_page_load()
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(h.http.request_count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, RedirectOutcome::Connected(_)))
            .count(),
        1
    );
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, RedirectOutcome::DuplicateDelivery))
            .count(),
        1
    );
}

#[tokio::test]
async fn overlapping_refresh_callers_coalesce_into_one_post() {
    let h = harness(vec![token_response(
        r#"{"access_token":"at-renewed","expires_in":3600}"#,
    )]);
    let profile = ProfileId::from_string("p1");
    let tokens = TokenSet {
        access_token: "at-stale".to_string(),
        refresh_token: Some("rt-live".to_string()),
        token_type: "Bearer".to_string(),
        expires_in: 3600,
        scope: None,
        obtained_at: Utc::now() - Duration::seconds(7200),
    };
    h.vault
        .set_secret(
            "tokens::google_drive::p1",
            &serde_json::to_vec(&tokens).unwrap(),
        )
        .await
        .unwrap();

    // Both callers find the stored token expired; the second waits on the
    // gate, re-reads the vault, and reuses the refresh the first finished.
    let provider = google();
    let (a, b) = tokio::join!(
        h.coordinator.fresh_access_token(&provider, &profile),
        h.coordinator.fresh_access_token(&provider, &profile)
    );

    assert_eq!(a.unwrap(), "at-renewed");
    assert_eq!(b.unwrap(), "at-renewed");
    assert_eq!(h.http.request_count(), 1);
}

#[tokio::test]
async fn callback_stripping_preserves_unrelated_params() {
    let h = harness(vec![token_response(GOOD_TOKENS)]);

    h.coordinator.start_connection(google()).await.unwrap();
    let state = state_from_auth_url(&h.navigator);
    h.navigator.set_current(&format!(
        "{}?tab=storage&code=auth-code-1&state={}",
        REDIRECT_URI, state
    ));

    h.coordinator.resume_from_page_load().await.unwrap();
    let current = Url::parse(&h.navigator.current_url().unwrap()).unwrap();
    let pairs: Vec<(String, String)> = current.query_pairs().into_owned().collect();
    assert_eq!(pairs, vec![("tab".to_string(), "storage".to_string())]);
}
