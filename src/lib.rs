//! Fetch, cache and page through federated social-graph resources.
//!
//! - [`http`]: coalescing clients with a proxy rewrite and cache pipeline
//! - [`cache`]: namespaced TTL cache for documents and binary payloads
//! - [`collection`]: paging over paginated collections, incremental or eager

pub mod cache;
pub mod collection;
pub mod config;
pub mod error;
pub mod http;

pub use config::Config;
pub use error::{FailureKind, FetchError};
