//! Backend query builders
//!
//! One mutable builder per query strategy. The manager composes these and
//! hands them to the caller-supplied pre-execution hook before the backend
//! runs them, so callers can add view fields, change limits, or adjust scope.

pub mod federated;
pub mod item;
pub mod search;

pub use federated::FederatedQuery;
pub use item::ItemQuery;
pub use search::{KeywordInclusion, SearchQuery};
