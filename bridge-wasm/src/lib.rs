//! Browser Bridge Implementations
//!
//! WebAssembly-compatible implementations of the bridge traits defined in
//! `bridge-traits`, built on browser APIs through `web-sys` and
//! `wasm-bindgen`.
//!
//! # Platform Support
//!
//! This crate is designed exclusively for the `wasm32-unknown-unknown`
//! target. It will not compile for native targets.
//!
//! # Implementations
//!
//! - [`LocalStorageStore`]: `localStorage`-backed continuation store
//! - [`WebTokenVault`]: AES-256-GCM encrypted token vault over `localStorage`
//! - [`FetchHttpClient`]: `fetch`-backed HTTP client with abortable timeouts
//! - [`BrowserNavigator`]: `window.location` / `history.replaceState` surface

#![cfg(target_arch = "wasm32")]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod navigation;
pub mod storage;

pub use http::FetchHttpClient;
pub use navigation::BrowserNavigator;
pub use storage::{LocalStorageStore, WebTokenVault};
