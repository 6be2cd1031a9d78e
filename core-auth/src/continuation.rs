//! Flow journal: the redirect-surviving slice of coordinator state.
//!
//! The browser leaves the application completely between sending the user
//! to the consent screen and the provider redirecting back. Everything the
//! post-redirect page load needs is journaled here under fixed keys:
//!
//! - the pending connection record (which provider, which redirect URI,
//!   which `state` to expect),
//! - the PKCE verifier for that attempt,
//! - the replay-guard marker of the last authorization code processed.

use std::sync::Arc;

use bridge_traits::ContinuationStore;

use crate::error::{AuthError, Result};
use crate::types::PendingConnection;

const KEY_PENDING: &str = "oauth.pending-connection";
const KEY_VERIFIER: &str = "oauth.pkce-verifier";
const KEY_LAST_CODE: &str = "oauth.last-processed-code";

/// Typed facade over the continuation store for the single in-flight
/// connection attempt.
pub struct FlowJournal {
    store: Arc<dyn ContinuationStore>,
}

impl FlowJournal {
    pub fn new(store: Arc<dyn ContinuationStore>) -> Self {
        Self { store }
    }

    /// Journal a new pending connection, superseding any previous attempt.
    pub async fn record_pending(&self, pending: &PendingConnection) -> Result<()> {
        let json = serde_json::to_string(pending)
            .map_err(|e| AuthError::Serialization(e.to_string()))?;
        self.store.set(KEY_PENDING, &json).await?;
        Ok(())
    }

    pub async fn pending(&self) -> Result<Option<PendingConnection>> {
        match self.store.get(KEY_PENDING).await? {
            Some(json) => {
                let pending = serde_json::from_str(&json)
                    .map_err(|e| AuthError::Serialization(e.to_string()))?;
                Ok(Some(pending))
            }
            None => Ok(None),
        }
    }

    pub async fn record_verifier(&self, verifier: &str) -> Result<()> {
        self.store.set(KEY_VERIFIER, verifier).await?;
        Ok(())
    }

    pub async fn verifier(&self) -> Result<Option<String>> {
        Ok(self.store.get(KEY_VERIFIER).await?)
    }

    /// The replay guard: which authorization code has already been consumed.
    pub async fn last_processed_code(&self) -> Result<Option<String>> {
        Ok(self.store.get(KEY_LAST_CODE).await?)
    }

    /// Mark a code consumed, before its exchange is attempted.
    pub async fn mark_code(&self, code: &str) -> Result<()> {
        self.store.set(KEY_LAST_CODE, code).await?;
        Ok(())
    }

    /// Release the replay guard so a later retry is not mistaken for a
    /// duplicate delivery of this code.
    pub async fn clear_replay_guard(&self) -> Result<()> {
        self.store.remove(KEY_LAST_CODE).await?;
        Ok(())
    }

    /// Drop the pending record and its verifier, keeping the replay guard.
    pub async fn clear_pending(&self) -> Result<()> {
        self.store.remove(KEY_PENDING).await?;
        self.store.remove(KEY_VERIFIER).await?;
        Ok(())
    }

    /// Erase every journaled trace of the attempt.
    pub async fn clear_all(&self) -> Result<()> {
        self.clear_pending().await?;
        self.clear_replay_guard().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProviderCredentials, TenantHint};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

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

    fn pending(client_id: &str) -> PendingConnection {
        PendingConnection {
            credentials: ProviderCredentials::OneDrive {
                client_id: client_id.to_string(),
                tenant: TenantHint::Common,
                base_path: None,
            },
            redirect_uri: "https://app.example/settings".to_string(),
            expected_state: Some("state-1".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_pending_round_trip() {
        let journal = FlowJournal::new(Arc::new(MemoryStore::default()));
        assert!(journal.pending().await.unwrap().is_none());

        journal.record_pending(&pending("client-a")).await.unwrap();
        let loaded = journal.pending().await.unwrap().unwrap();
        assert_eq!(loaded.credentials.client_id(), "client-a");
        assert_eq!(loaded.expected_state.as_deref(), Some("state-1"));
    }

    #[tokio::test]
    async fn test_new_pending_supersedes_previous() {
        let journal = FlowJournal::new(Arc::new(MemoryStore::default()));
        journal.record_pending(&pending("client-a")).await.unwrap();
        journal.record_pending(&pending("client-b")).await.unwrap();

        let loaded = journal.pending().await.unwrap().unwrap();
        assert_eq!(loaded.credentials.client_id(), "client-b");
    }

    #[tokio::test]
    async fn test_replay_guard_lifecycle() {
        let journal = FlowJournal::new(Arc::new(MemoryStore::default()));
        assert!(journal.last_processed_code().await.unwrap().is_none());

        journal.mark_code("code-1").await.unwrap();
        assert_eq!(
            journal.last_processed_code().await.unwrap().as_deref(),
            Some("code-1")
        );

        journal.clear_replay_guard().await.unwrap();
        assert!(journal.last_processed_code().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_pending_keeps_replay_guard() {
        let journal = FlowJournal::new(Arc::new(MemoryStore::default()));
        journal.record_pending(&pending("client-a")).await.unwrap();
        journal.record_verifier("verifier-1").await.unwrap();
        journal.mark_code("code-1").await.unwrap();

        journal.clear_pending().await.unwrap();
        assert!(journal.pending().await.unwrap().is_none());
        assert!(journal.verifier().await.unwrap().is_none());
        assert_eq!(
            journal.last_processed_code().await.unwrap().as_deref(),
            Some("code-1")
        );

        journal.clear_all().await.unwrap();
        assert!(journal.last_processed_code().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_pending_reports_serialization_error() {
        let store = Arc::new(MemoryStore::default());
        store.set(KEY_PENDING, "{not json").await.unwrap();
        let journal = FlowJournal::new(store);
        assert!(matches!(
            journal.pending().await,
            Err(AuthError::Serialization(_))
        ));
    }
}
