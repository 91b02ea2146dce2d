//! REST API client module for the storefront backend.
//!
//! This module provides the `HttpClient` seam and the reqwest-backed
//! `ApiClient`. The backend issues JWT bearer tokens from `/token/` and
//! renews them from `/token/refresh/`.

pub mod client;
pub mod error;

pub use client::{ApiClient, HttpClient, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
