//! Browser implementations of the continuation store and token vault.
//!
//! Both sit on `localStorage`, which is the only browser storage that is
//! synchronous, same-origin scoped, and reliably survives the full page
//! navigation of an OAuth redirect. Continuation values are short-lived
//! plaintext markers; vault secrets are encrypted with AES-256-GCM under a
//! randomly generated master key that is itself persisted (base64 encoded)
//! alongside them. Namespaces keep multiple host shells from clobbering
//! each other's data.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    storage::{ContinuationStore, TokenVault},
};
use rand::{rngs::OsRng, RngCore};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

use crate::error::js_error;

const VAULT_MASTER_KEY_SUFFIX: &str = "vault-master-key";
const VAULT_PREFIX: &str = "vault";
const CONTINUATION_PREFIX: &str = "continuation";
const DEFAULT_NAMESPACE: &str = "cloud-shelf";

fn local_storage() -> BridgeResult<web_sys::Storage> {
    let window = web_sys::window().ok_or_else(|| BridgeError::NotAvailable("window".into()))?;
    window
        .local_storage()
        .map_err(|err| js_error("localStorage", err))?
        .ok_or_else(|| BridgeError::NotAvailable("localStorage".into()))
}

fn namespaced_prefix(namespace: &str, kind: &str) -> String {
    format!("{namespace}::{kind}::")
}

fn scoped_key(namespace: &str, kind: &str, key: &str) -> String {
    format!("{namespace}::{kind}::{key}")
}

fn list_prefixed_keys(storage: &web_sys::Storage, prefix: &str) -> BridgeResult<Vec<String>> {
    let len = storage
        .length()
        .map_err(|err| js_error("storage length", err))?;
    let mut keys = Vec::new();
    for idx in 0..len {
        if let Some(entry) = storage
            .key(idx)
            .map_err(|err| js_error("storage key", err))?
        {
            if entry.starts_with(prefix) {
                keys.push(entry[prefix.len()..].to_string());
            }
        }
    }
    Ok(keys)
}

#[derive(Clone)]
/// `localStorage`-backed continuation store.
pub struct LocalStorageStore {
    storage: web_sys::Storage,
    namespace: String,
}

impl LocalStorageStore {
    /// Construct a store under the default namespace.
    pub fn new() -> BridgeResult<Self> {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    /// Construct a store scoped to the provided namespace.
    pub fn with_namespace(namespace: impl Into<String>) -> BridgeResult<Self> {
        Ok(Self {
            storage: local_storage()?,
            namespace: namespace.into(),
        })
    }

    fn key_for(&self, key: &str) -> String {
        scoped_key(&self.namespace, CONTINUATION_PREFIX, key)
    }
}

#[async_trait(?Send)]
impl ContinuationStore for LocalStorageStore {
    async fn set(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.storage
            .set_item(&self.key_for(key), value)
            .map_err(|err| js_error("set continuation value", err))
    }

    async fn get(&self, key: &str) -> BridgeResult<Option<String>> {
        self.storage
            .get_item(&self.key_for(key))
            .map_err(|err| js_error("get continuation value", err))
    }

    async fn remove(&self, key: &str) -> BridgeResult<()> {
        self.storage
            .remove_item(&self.key_for(key))
            .map_err(|err| js_error("remove continuation value", err))
    }
}

#[derive(Clone)]
/// AES-GCM backed token vault for browsers.
pub struct WebTokenVault {
    storage: web_sys::Storage,
    namespace: String,
    master_key: [u8; 32],
}

impl WebTokenVault {
    /// Construct a vault under the default namespace.
    pub fn new() -> BridgeResult<Self> {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    /// Construct a vault scoped to the provided namespace.
    pub fn with_namespace(namespace: impl Into<String>) -> BridgeResult<Self> {
        let namespace = namespace.into();
        let storage = local_storage()?;
        let master_key = load_or_create_master_key(&storage, &namespace)?;
        Ok(Self {
            storage,
            namespace,
            master_key,
        })
    }

    fn cipher(&self) -> BridgeResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.master_key)
            .map_err(|err| BridgeError::OperationFailed(format!("cipher init failed: {err}")))
    }

    fn key_for(&self, key: &str) -> String {
        scoped_key(&self.namespace, VAULT_PREFIX, key)
    }

    fn key_prefix(&self) -> String {
        namespaced_prefix(&self.namespace, VAULT_PREFIX)
    }
}

#[async_trait(?Send)]
impl TokenVault for WebTokenVault {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);
        let ciphertext = cipher
            .encrypt(&nonce, value)
            .map_err(|err| BridgeError::OperationFailed(format!("encrypt secret: {err}")))?;

        let mut payload = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        let encoded = BASE64.encode(payload);
        self.storage
            .set_item(&self.key_for(key), &encoded)
            .map_err(|err| js_error("set secret", err))
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        let stored = match self
            .storage
            .get_item(&self.key_for(key))
            .map_err(|err| js_error("get secret", err))?
        {
            Some(value) => value,
            None => return Ok(None),
        };

        let data = BASE64
            .decode(stored)
            .map_err(|err| BridgeError::OperationFailed(format!("decode secret: {err}")))?;

        if data.len() <= 12 {
            return Err(BridgeError::OperationFailed(
                "stored secret payload too small".into(),
            ));
        }

        let (nonce_bytes, ciphertext) = data.split_at(12);
        let mut nonce_array = [0u8; 12];
        nonce_array.copy_from_slice(nonce_bytes);
        let nonce = Nonce::from(nonce_array);
        let cipher = self.cipher()?;
        let plaintext = cipher
            .decrypt(&nonce, ciphertext)
            .map_err(|err| BridgeError::OperationFailed(format!("decrypt secret: {err}")))?;

        Ok(Some(plaintext))
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.storage
            .remove_item(&self.key_for(key))
            .map_err(|err| js_error("remove secret", err))
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        let mut keys = list_prefixed_keys(&self.storage, &self.key_prefix())?;
        keys.retain(|key| key != VAULT_MASTER_KEY_SUFFIX);
        Ok(keys)
    }
}

fn load_or_create_master_key(
    storage: &web_sys::Storage,
    namespace: &str,
) -> BridgeResult<[u8; 32]> {
    let key_name = scoped_key(namespace, VAULT_PREFIX, VAULT_MASTER_KEY_SUFFIX);

    if let Some(existing) = storage
        .get_item(&key_name)
        .map_err(|err| js_error("get master key", err))?
    {
        let mut key = [0u8; 32];
        let decoded = BASE64
            .decode(existing)
            .map_err(|err| BridgeError::OperationFailed(format!("decode master key: {err}")))?;
        if decoded.len() != 32 {
            return Err(BridgeError::OperationFailed(
                "master key has invalid length".into(),
            ));
        }
        key.copy_from_slice(&decoded);
        return Ok(key);
    }

    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    let encoded = BASE64.encode(key);
    storage
        .set_item(&key_name, &encoded)
        .map_err(|err| js_error("store master key", err))?;
    Ok(key)
}
