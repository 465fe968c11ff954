//! Request interception layer
//!
//! - **Dispatcher**: the [`MockContext`] every intercepted request goes through
//! - **Network Gate**: pass-through policy for unmatched requests
//! - **Network Path**: the real network behind the gate
//!
//! # Architecture
//!
//! ```text
//! RequestRecord
//!     │
//!     ├─ matched   → request event → MockResponse → replied event
//!     └─ unmatched → no match event → NetworkGate
//!                                       ├─ allowed → NetworkPath::forward
//!                                       └─ denied  → EngineError::NoMatch
//! ```

pub mod dispatcher;
pub mod gate;
pub mod network;

// Re-export commonly used types
pub use dispatcher::MockContext;
pub use gate::NetworkGate;
pub use network::{HyperNetwork, NetworkPath, Unreachable};
