//! HTTP middleware stack for the demo storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (binary only)
//! 2. `TraceLayer` (request span with an empty `request_id` field)
//! 3. Request ID (fills the span field, tags Sentry, echoes the header)

pub mod request_id;

pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
