//! Manual completion path for environments where the redirect cannot land.
//!
//! Embedded webviews and some browser extensions block or mangle the
//! return navigation. The bridge exposes the same journaled attempt as the
//! automatic flow, but instead of waiting for a page load the user opens
//! the authorization URL themselves and pastes the resulting code back in.
//! The pasted code goes through the same dispatch path as a redirect, so
//! the replay guard and verifier handling are identical.

use std::sync::Arc;

use crate::coordinator::{RedirectCoordinator, RedirectOutcome};
use crate::error::Result;

pub struct ManualFallbackBridge {
    coordinator: Arc<RedirectCoordinator>,
    authorization_url: String,
}

impl ManualFallbackBridge {
    pub(crate) fn new(coordinator: Arc<RedirectCoordinator>, authorization_url: String) -> Self {
        Self {
            coordinator,
            authorization_url,
        }
    }

    /// The URL the user opens in an external browser.
    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    /// Redeem a code the user pasted back. Surrounding whitespace from the
    /// copy/paste is tolerated.
    pub async fn submit_code(&self, code: &str) -> Result<RedirectOutcome> {
        self.coordinator.submit_manual_code(code).await
    }

    /// Abandon the attempt.
    pub async fn cancel(&self) -> Result<()> {
        self.coordinator.cancel_pending_connection().await
    }
}
