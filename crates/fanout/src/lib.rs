//! Concurrent invocation under a shared deadline.
//!
//! The fan-out engine owns the concurrent region of a request: it runs a
//! bounded set of invokers, isolates their failures, cancels stragglers at
//! the deadline, and — in web-search mode — merges provider results with
//! canonical-URL dedup and priority ranking. Identical queries inside a
//! short window share one in-flight execution.

pub mod engine;
pub mod search;
pub mod singleflight;
pub mod url;

pub use engine::{FanoutEngine, FanoutTask};
pub use search::{aggregate_search, SearchAggregation, SearchHit, SearchProvider};
pub use singleflight::{query_hash, SingleFlight};
