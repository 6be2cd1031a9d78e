//! Typed token persistence over the vault bridge.
//!
//! Token sets are serialized as JSON under `tokens::<provider>::<profile>`.
//! A payload that no longer decodes is treated as unusable: it is deleted
//! on read so the caller can fall back to a fresh connection instead of
//! failing forever on the same bytes.

use std::sync::Arc;

use bridge_traits::TokenVault;
use tracing::warn;

use crate::error::{AuthError, Result};
use crate::types::{ProfileId, ProviderKind, TokenSet};

const KEY_PREFIX: &str = "tokens";

fn vault_key(provider: ProviderKind, profile_id: &ProfileId) -> String {
    format!("{}::{}::{}", KEY_PREFIX, provider.as_str(), profile_id)
}

pub struct TokenStore {
    vault: Arc<dyn TokenVault>,
}

impl TokenStore {
    pub fn new(vault: Arc<dyn TokenVault>) -> Self {
        Self { vault }
    }

    pub async fn store_tokens(
        &self,
        provider: ProviderKind,
        profile_id: &ProfileId,
        tokens: &TokenSet,
    ) -> Result<()> {
        let json = serde_json::to_vec(tokens)
            .map_err(|e| AuthError::Serialization(e.to_string()))?;
        self.vault
            .set_secret(&vault_key(provider, profile_id), &json)
            .await?;
        Ok(())
    }

    /// Load a profile's tokens. Undecodable payloads are deleted and
    /// reported as [`AuthError::TokenCorrupted`].
    pub async fn retrieve_tokens(
        &self,
        provider: ProviderKind,
        profile_id: &ProfileId,
    ) -> Result<Option<TokenSet>> {
        let key = vault_key(provider, profile_id);
        let Some(bytes) = self.vault.get_secret(&key).await? else {
            return Ok(None);
        };

        match serde_json::from_slice(&bytes) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                warn!(profile_id = %profile_id, "Deleting undecodable token payload");
                self.vault.delete_secret(&key).await?;
                Err(AuthError::TokenCorrupted {
                    reason: e.to_string(),
                })
            }
        }
    }

    pub async fn delete_tokens(
        &self,
        provider: ProviderKind,
        profile_id: &ProfileId,
    ) -> Result<()> {
        self.vault
            .delete_secret(&vault_key(provider, profile_id))
            .await?;
        Ok(())
    }

    /// Find the stored profile for a provider, if one exists.
    ///
    /// Key order from the vault is unspecified, so with multiple stored
    /// profiles for the same provider this returns an arbitrary one.
    pub async fn find_profile(
        &self,
        provider: ProviderKind,
    ) -> Result<Option<(ProfileId, TokenSet)>> {
        let prefix = format!("{}::{}::", KEY_PREFIX, provider.as_str());
        for key in self.vault.list_keys().await? {
            let Some(id) = key.strip_prefix(&prefix) else {
                continue;
            };
            let profile_id = ProfileId::from_string(id);
            match self.retrieve_tokens(provider, &profile_id).await {
                Ok(Some(tokens)) => return Ok(Some((profile_id, tokens))),
                Ok(None) => continue,
                // A corrupted entry was already deleted; keep scanning.
                Err(AuthError::TokenCorrupted { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}
