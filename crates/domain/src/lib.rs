//! Shared domain types for policywatch.
//!
//! Entities (sources, versions, changes, subscriptions), the fetch
//! envelope with its closed error taxonomy, the typed configuration
//! tree, and the error type used across all policywatch crates.

pub mod config;
pub mod error;
pub mod fetch;
pub mod source;
pub mod subscription;
pub mod version;

pub use error::{Error, Result};
pub use fetch::{FetchErrorType, FetchResult};
pub use source::{CheckFrequency, FetchType, Source, SourceOverrides};
pub use subscription::RouteSubscription;
pub use version::{PolicyChange, PolicyVersion};
