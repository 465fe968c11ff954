//! Lifecycle events
//!
//! A single [`EventEmitter`] per mock context carries the `request`,
//! `replied` and `no match` channels. Scopes expose the same channels
//! filtered to their own interceptors and origin.
//!
//! # Ordering
//!
//! ```text
//! matched:   request ──▶ (response built, counter += 1) ──▶ replied
//! unmatched: no match ──▶ network gate decision
//! ```

pub mod emitter;

// Re-export commonly used types
pub use emitter::{Channel, Event, EventEmitter, EventHandler, SubscriptionId};
