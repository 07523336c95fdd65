//! Headwater Core - Shared types library.
//!
//! This crate provides the types shared by the sub-request cache and the
//! cart dispatcher:
//! - cache strategies and `Cache-Control` header rendering
//! - cache keys and their stable hashed form
//! - freshness classification of stored entries
//! - Shopify global IDs (cart ids) and money amounts
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no cache
//! backends, no HTTP clients. Everything time-dependent takes `now` as an
//! argument so it can be tested without a clock.
//!
//! # Modules
//!
//! - [`types`] - Strategies, keys, freshness, IDs, and money

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
