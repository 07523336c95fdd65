//! Core types for Headwater.
//!
//! This module provides type-safe wrappers for caching and cart concepts.

pub mod id;
pub mod key;
pub mod money;
pub mod status;
pub mod strategy;

pub use id::{CartId, CartLineId, GidError, ProductVariantId};
pub use key::{CacheKey, HashedKey};
pub use money::Money;
pub use status::{CacheStatus, classify};
pub use strategy::{CacheControlParseError, CacheMode, CacheStrategy};
