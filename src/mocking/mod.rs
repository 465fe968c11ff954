//! Mock declaration and matching
//!
//! - **Request**: origins and the request record handed over for matching
//! - **Matchers**: value, query and body predicates
//! - **Interceptor**: one declared request-match-and-reply rule
//! - **Registry**: interceptors per origin, in declaration order
//! - **Matcher**: two-phase request matching with atomic claiming
//! - **Scope**: the declarative builder surface
//!
//! # Architecture
//!
//! ```text
//! Scope::get("/path")?.reply(200)
//!     │
//!     └─ Interceptor ──▶ InterceptorRegistry (by origin)
//!                              │
//! RequestRecord ──▶ Matcher::plan ──▶ MatchPlan::resolve(body) ──▶ MatchResult
//! ```

pub mod interceptor;
pub mod matcher;
pub mod matchers;
pub mod registry;
pub mod request;
pub mod scope;

// Re-export commonly used types
pub use interceptor::{BodyGenerator, Interceptor, ReplyBody, ResponseDefinition, ResponseGenerator};
pub use matcher::{MatchHint, MatchPlan, MatchResult, Matcher};
pub use matchers::{parse_query, BodyMatcher, QueryMatcher, ValueMatcher};
pub use registry::InterceptorRegistry;
pub use request::{Origin, RequestBody, RequestRecord};
pub use scope::{InterceptorBuilder, Scope};
