//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host shell.
//!
//! ## Overview
//!
//! This crate defines the contract between the auth core and platform-specific
//! implementations. Each trait represents a capability the core requires but
//! that must be provided differently per host (browser, test harness, future
//! native shells).
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP requests with bounded waits
//! - [`ContinuationStore`](storage::ContinuationStore) - Key/value persistence
//!   that survives a full page reload, carrying in-flight auth state across
//!   the redirect boundary
//! - [`TokenVault`](storage::TokenVault) - Longer-lived secret storage for
//!   serialized token sets (survives browser restart)
//! - [`PageNavigator`](navigation::PageNavigator) - Read the current URL,
//!   trigger a full navigation, and rewrite the visible URL in place
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform-specific failures into `BridgeError` with enough
//! context to act on (storage quota, network status, missing browser API).
//!
//! ## Thread Safety
//!
//! Traits require `Send + Sync` so implementations can be shared across async
//! tasks behind `Arc`. Browser implementations run on a single thread but the
//! bounds cost nothing there.

pub mod error;
pub mod http;
pub mod navigation;
pub mod platform;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use navigation::PageNavigator;
pub use storage::{ContinuationStore, TokenVault};
