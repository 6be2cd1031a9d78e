//! # Event Bus System
//!
//! Provides event-driven notification of authentication state changes using
//! `tokio::sync::broadcast`. Host applications subscribe **once** at startup
//! and hold the receiver for the lifetime of the page; re-subscribing on every
//! render is exactly the stale-handler pattern this bus exists to replace.
//!
//! ## Usage
//!
//! ### Creating an Event Bus
//!
//! ```rust
//! use core_runtime::events::EventBus;
//!
//! let event_bus = EventBus::new(100); // Buffer size of 100 events
//! ```
//!
//! ### Publishing Events
//!
//! ```rust
//! use core_runtime::events::{EventBus, AuthEvent};
//!
//! # let event_bus = EventBus::new(100);
//! let event = AuthEvent::Connected {
//!     profile_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
//!     provider: "google_drive".to_string(),
//! };
//!
//! event_bus.emit(event).ok();
//! ```
//!
//! ### Subscribing to Events
//!
//! ```rust
//! use core_runtime::events::EventBus;
//! use tokio::sync::broadcast::error::RecvError;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! tokio::spawn(async move {
//!     loop {
//!         match stream.recv().await {
//!             Ok(event) => println!("Received: {:?}", event),
//!             Err(RecvError::Lagged(n)) => eprintln!("Missed {} events", n),
//!             Err(RecvError::Closed) => break,
//!         }
//!     }
//! });
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: subscriber was too slow and missed `n`
//!   events. Non-fatal; the subscriber keeps receiving new events.
//! - **`RecvError::Closed`**: all senders dropped, indicating shutdown.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Events related to authentication and connection lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// A connect attempt was started; the authorization URL has been built.
    ConnectStarted {
        /// The provider being connected (e.g., "google_drive", "onedrive").
        provider: String,
    },
    /// The flow persisted its continuation state and is leaving the page for
    /// the provider's consent screen.
    AwaitingRedirect {
        /// The provider being connected.
        provider: String,
    },
    /// Authorization completed; a token set was obtained and stored.
    Connected {
        /// The newly created profile ID.
        profile_id: String,
        /// The provider connected.
        provider: String,
    },
    /// The connect attempt ended in failure.
    ConnectFailed {
        /// The provider, when known.
        provider: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Whether retrying the same attempt may succeed.
        recoverable: bool,
    },
    /// The user abandoned the attempt before or outside the redirect.
    Cancelled {
        /// The provider, when known.
        provider: Option<String>,
    },
    /// An access token is being refreshed.
    TokenRefreshing {
        /// The profile whose token is being refreshed.
        profile_id: String,
    },
    /// Token refresh completed successfully.
    TokenRefreshed {
        /// The profile whose token was refreshed.
        profile_id: String,
        /// Unix epoch seconds when the new access token expires.
        expires_at: i64,
    },
    /// Token refresh was rejected; the authenticated session has ended and
    /// the user must sign in again.
    SessionExpired {
        /// The profile whose session ended.
        profile_id: String,
    },
}

impl AuthEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            AuthEvent::ConnectStarted { .. } => "Connect attempt started",
            AuthEvent::AwaitingRedirect { .. } => "Redirecting to provider",
            AuthEvent::Connected { .. } => "Provider connected",
            AuthEvent::ConnectFailed { .. } => "Connect attempt failed",
            AuthEvent::Cancelled { .. } => "Connect attempt cancelled",
            AuthEvent::TokenRefreshing { .. } => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::SessionExpired { .. } => "Session expired",
        }
    }

    /// Whether the event represents a terminal outcome of a connect attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthEvent::Connected { .. }
                | AuthEvent::ConnectFailed { .. }
                | AuthEvent::Cancelled { .. }
        )
    }
}

/// Central broadcast channel for auth events.
///
/// Cloning an `EventBus` clones the sender; all clones feed the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that received the event. An `Err`
    /// simply means nobody is listening, which is not a failure for emitters.
    pub fn emit(&self, event: AuthEvent) -> Result<usize, SendError<AuthEvent>> {
        tracing::trace!(event = event.description(), "emitting auth event");
        self.sender.send(event)
    }

    /// Create a new subscription to the event stream.
    pub fn subscribe(&self) -> Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}
