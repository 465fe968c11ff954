//! Mocknet Engine Library
//!
//! HTTP request interception and mock response synthesis for tests. A test
//! declares the requests it expects against an origin; when the code under
//! test issues a matching request, the engine answers with a synthesized
//! response instead of touching the network.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **mocking**: scopes, interceptors, matchers and the registry
//! - **response**: header normalization and response synthesis
//! - **events**: `request`, `replied` and `no match` lifecycle events
//! - **interception**: dispatch, the network gate and pass-through
//! - **observability**: tracing setup
//! - **utils**: configuration and errors
//!
//! # Example
//!
//! ```ignore
//! let ctx = MockContext::new();
//! ctx.scope("http://example.test")?.get("/abc")?.reply(200);
//!
//! let request = RequestRecord::get("http://example.test/abc")?;
//! let response = ctx.dispatch(request, &Unreachable).await?;
//! assert_eq!(response.status(), 200);
//! ```

// Public module exports
pub mod events;
pub mod interception;
pub mod mocking;
pub mod observability;
pub mod response;
pub mod utils;

// Re-export commonly used types
pub use events::{Channel, Event};
pub use interception::{HyperNetwork, MockContext, NetworkPath, Unreachable};
pub use mocking::{BodyMatcher, Origin, QueryMatcher, RequestRecord, ResponseDefinition, Scope, ValueMatcher};
pub use response::{MockResponse, RawHeaders, RawResponse};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
