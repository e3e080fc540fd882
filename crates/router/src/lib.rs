//! Intent classification.
//!
//! One strictly ordered pipeline decides every query: identity guard,
//! affirmative follow-up guard, keyword classifier with context boost,
//! confidence thresholding, and a synthetic fallback-search intent when
//! nothing clears the bar. The first rule that fires terminates
//! classification — there is exactly one context-aware layer, not two.

pub mod keywords;
pub mod patterns;
pub mod router;

pub use router::{HandlerDirectory, IntentRouter};
