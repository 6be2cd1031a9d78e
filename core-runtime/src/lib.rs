//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the connector core:
//! - Logging and tracing infrastructure
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the auth core depends on. It
//! establishes the logging conventions and the event broadcasting mechanism
//! used to notify host applications of authentication state changes.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
