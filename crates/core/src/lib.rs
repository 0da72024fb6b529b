//! Life Shield Core - Shared types library.
//!
//! This crate provides the domain types consumed by `life-shield-client`
//! (the authenticated-session core).
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no async
//! runtime. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for emails and route paths, the principal
//!   shape returned by the identity provider, and the closed role enumeration

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
