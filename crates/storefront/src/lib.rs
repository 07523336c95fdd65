//! Headwater Storefront library.
//!
//! - [`cache`] - stale-while-revalidate sub-request cache (`WithCache`)
//! - [`shopify`] - Storefront API client routed through the cache
//! - [`cart`] - cart actions, `CartHandler`, and cookie persistence
//! - [`routes`] / [`state`] - the axum demo server
//!
//! The binary in `main.rs` only wires configuration, tracing, and Sentry
//! around [`routes::app`], so everything here can be tested in-process.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod cart;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod shopify;
pub mod state;
