//! Response synthesis
//!
//! - **Headers**: raw header normalization and the response header container
//! - **Body**: body sources, the bounded body queue, and the lazy body stream
//! - **Synthesizer**: status/header/body assembly into a [`MockResponse`]
//!
//! # Architecture
//!
//! ```text
//! (status, raw headers, body source)
//!     │
//!     ├─ status ∈ {204, 205, 304} ──▶ empty body
//!     ├─ raw headers ──▶ NormalizedHeaders ──▶ HeaderSet (+ set-cookie fixup)
//!     └─ body source ──▶ BodyStream (pulled by the reader)
//! ```

pub mod body;
pub mod headers;
pub mod synthesizer;

// Re-export commonly used types
pub use body::{body_channel, BodySender, BodySource, BodyStream, ResponseBody};
pub use headers::{HeaderSet, NormalizedHeader, NormalizedHeaders, RawHeaders};
pub use synthesizer::{
    is_bodiless, reason_phrase, synthesize, MockResponse, RawResponse, BODILESS_STATUS_CODES,
};
