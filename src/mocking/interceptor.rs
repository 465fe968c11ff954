//! Interceptors and their response definitions

use crate::mocking::matchers::{BodyMatcher, QueryMatcher, ValueMatcher};
use crate::mocking::request::{Origin, RequestRecord};
use crate::response::body::BodySource;
use crate::response::headers::RawHeaders;
use crate::response::synthesizer::RawResponse;
use crate::utils::errors::Result;
use bytes::Bytes;
use hyper::Method;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Produces a body from the request and its buffered body
pub type BodyGenerator = Arc<dyn Fn(&RequestRecord, Option<&Bytes>) -> BodySource + Send + Sync>;

/// Produces a whole response definition from the request
pub type ResponseGenerator =
    Arc<dyn Fn(&RequestRecord, Option<&Bytes>) -> ResponseDefinition + Send + Sync>;

/// Body of a declared reply
#[derive(Clone, Default)]
pub enum ReplyBody {
    #[default]
    None,
    Static(Bytes),
    Generated(BodyGenerator),
}

impl fmt::Debug for ReplyBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyBody::None => f.write_str("None"),
            ReplyBody::Static(b) => write!(f, "Static({} bytes)", b.len()),
            ReplyBody::Generated(_) => f.write_str("Generated(<fn>)"),
        }
    }
}

/// What an interceptor replies with
#[derive(Debug, Clone)]
pub struct ResponseDefinition {
    pub status: u16,
    pub status_text: Option<String>,
    pub headers: RawHeaders,
    pub body: ReplyBody,
}

impl ResponseDefinition {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_text: None,
            headers: RawHeaders::new(),
            body: ReplyBody::None,
        }
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn with_headers(mut self, headers: RawHeaders) -> Self {
        for (name, value) in headers.iter() {
            self.headers.push(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ReplyBody::Static(body.into());
        self
    }

    /// Serialize `value` as the body, adding a JSON content type unless one
    /// was already declared
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value)?;
        if !self.headers.contains("content-type") {
            self.headers.push("Content-Type", "application/json");
        }
        self.body = ReplyBody::Static(Bytes::from(body));
        Ok(self)
    }

    pub fn with_body_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestRecord, Option<&Bytes>) -> BodySource + Send + Sync + 'static,
    {
        self.body = ReplyBody::Generated(Arc::new(f));
        self
    }

    pub(crate) fn to_raw(&self, request: &RequestRecord, body: Option<&Bytes>) -> RawResponse {
        let body = match &self.body {
            ReplyBody::None => BodySource::None,
            ReplyBody::Static(bytes) => BodySource::Bytes(bytes.clone()),
            ReplyBody::Generated(f) => f(request, body),
        };

        RawResponse {
            status: Some(self.status),
            status_message: self.status_text.clone(),
            headers: self.headers.clone(),
            body,
        }
    }
}

pub(crate) enum Reply {
    Fixed(ResponseDefinition),
    Dynamic(ResponseGenerator),
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Fixed(def) => f.debug_tuple("Fixed").field(def).finish(),
            Reply::Dynamic(_) => f.write_str("Dynamic(<fn>)"),
        }
    }
}

/// Request predicates declared for one interceptor
#[derive(Debug, Clone)]
pub(crate) struct RequestSpec {
    pub method: Method,
    pub path: ValueMatcher,
    pub query: QueryMatcher,
    pub headers: Vec<(String, ValueMatcher)>,
    pub body: Option<BodyMatcher>,
}

/// A declared request-match-and-reply rule
#[derive(Debug)]
pub struct Interceptor {
    id: u64,
    scope_id: u64,
    origin: Origin,
    spec: RequestSpec,
    reply: Reply,
    persistent: AtomicBool,
    consumed: AtomicBool,
    removed: AtomicBool,
    interception_counter: AtomicU64,
}

impl Interceptor {
    pub(crate) fn new(
        id: u64,
        scope_id: u64,
        origin: Origin,
        spec: RequestSpec,
        reply: Reply,
        persistent: bool,
    ) -> Self {
        Self {
            id,
            scope_id,
            origin,
            spec,
            reply,
            persistent: AtomicBool::new(persistent),
            consumed: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            interception_counter: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope_id(&self) -> u64 {
        self.scope_id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn method(&self) -> &Method {
        &self.spec.method
    }

    /// Number of requests this interceptor has replied to
    pub fn interception_counter(&self) -> u64 {
        self.interception_counter.load(Ordering::SeqCst)
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::SeqCst)
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::SeqCst)
    }

    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    /// Still waiting for the request it was declared for
    pub fn is_pending(&self) -> bool {
        if self.is_persistent() {
            self.interception_counter() == 0
        } else {
            !self.is_consumed()
        }
    }

    /// `METHOD scheme://host:port/path`
    pub fn describe(&self) -> String {
        format!("{} {}{:?}", self.spec.method, self.origin, self.spec.path)
    }

    pub(crate) fn set_persistent(&self, persistent: bool) {
        self.persistent.store(persistent, Ordering::SeqCst);
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }

    /// Still eligible to be matched. Persistent interceptors are never
    /// consumed, and a consumed one stays out even if made persistent later.
    pub(crate) fn is_available(&self) -> bool {
        !self.is_removed() && !self.is_consumed()
    }

    /// Method, path, query and header predicates
    pub(crate) fn accepts_head(&self, request: &RequestRecord) -> bool {
        if *request.method() != self.spec.method {
            return false;
        }
        if !self.spec.path.accepts(request.path()) {
            return false;
        }
        if !self.spec.query.accepts(request.query()) {
            return false;
        }
        self.spec.headers.iter().all(|(name, matcher)| {
            request
                .headers()
                .iter()
                .any(|(n, v)| n.eq_ignore_ascii_case(name) && matcher.accepts(v))
        })
    }

    pub(crate) fn has_body_matcher(&self) -> bool {
        self.spec.body.is_some()
    }

    /// Body predicate; a body that never arrived only satisfies interceptors
    /// that declared no body matcher
    pub(crate) fn accepts_body(&self, body: Option<&Bytes>, body_available: bool) -> bool {
        match &self.spec.body {
            None => true,
            Some(_) if !body_available => false,
            Some(matcher) => matcher.accepts(body.map(|b| &b[..]).unwrap_or_default()),
        }
    }

    /// Take this interceptor for one request. Non-persistent interceptors
    /// can only be claimed once.
    pub(crate) fn try_claim(&self) -> bool {
        if !self.is_available() {
            return false;
        }
        if self.is_persistent() {
            return true;
        }
        self.consumed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn record_interception(&self) -> u64 {
        self.interception_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn respond(&self, request: &RequestRecord, body: Option<&Bytes>) -> RawResponse {
        match &self.reply {
            Reply::Fixed(def) => def.to_raw(request, body),
            Reply::Dynamic(generate) => generate(request, body).to_raw(request, body),
        }
    }
}
