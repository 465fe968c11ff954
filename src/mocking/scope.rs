//! Declarative surface: scopes and interceptor builders
//!
//! A scope targets one origin and owns the interceptors declared through it:
//!
//! ```ignore
//! let scope = ctx.scope("http://example.test")?;
//! scope
//!     .get("/users")?
//!     .reply_json(200, &users)?
//!     .post("/users")?
//!     .json_body(serde_json::json!({ "name": "ada" }))
//!     .reply(201);
//! ```

use crate::events::emitter::{Channel, Event, EventEmitter, SubscriptionId};
use crate::mocking::interceptor::{Interceptor, Reply, RequestSpec, ResponseDefinition};
use crate::mocking::matchers::{parse_query, BodyMatcher, QueryMatcher, ValueMatcher};
use crate::mocking::registry::InterceptorRegistry;
use crate::mocking::request::{Origin, RequestRecord};
use crate::response::headers::RawHeaders;
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use hyper::Method;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct Declared {
    interceptor: Arc<Interceptor>,
    /// Set when the builder chose its own persist value
    pinned: bool,
}

struct ScopeState {
    id: u64,
    origin: Origin,
    persist: AtomicBool,
    interceptors: Mutex<Vec<Declared>>,
}

/// Interceptors declared for one origin
#[derive(Clone)]
pub struct Scope {
    state: Arc<ScopeState>,
    registry: Arc<InterceptorRegistry>,
    emitter: Arc<EventEmitter>,
}

impl Scope {
    pub(crate) fn new(
        origin: Origin,
        registry: Arc<InterceptorRegistry>,
        emitter: Arc<EventEmitter>,
    ) -> Self {
        let id = registry.next_id();
        debug!("Created scope {} for {}", id, origin);
        Self {
            state: Arc::new(ScopeState {
                id,
                origin,
                persist: AtomicBool::new(false),
                interceptors: Mutex::new(Vec::new()),
            }),
            registry,
            emitter,
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn origin(&self) -> &Origin {
        &self.state.origin
    }

    /// Start declaring an interceptor. A `?` in `path` declares the exact
    /// query the request must carry.
    pub fn intercept(&self, method: Method, path: &str) -> Result<InterceptorBuilder<'_>> {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, QueryMatcher::exact(parse_query(query))),
            None => (path, QueryMatcher::None),
        };

        Ok(self.intercept_matching(method, ValueMatcher::path(path)?).query(query))
    }

    /// Start declaring an interceptor whose path is tested by `path`, e.g. a
    /// regex or a predicate. The request must carry no query unless one is
    /// declared on the builder.
    pub fn intercept_matching(
        &self,
        method: Method,
        path: impl Into<ValueMatcher>,
    ) -> InterceptorBuilder<'_> {
        InterceptorBuilder {
            scope: self,
            method,
            path: path.into(),
            query: QueryMatcher::None,
            headers: Vec::new(),
            body: None,
            persist: None,
        }
    }

    pub fn get_matching(&self, path: impl Into<ValueMatcher>) -> InterceptorBuilder<'_> {
        self.intercept_matching(Method::GET, path)
    }

    pub fn post_matching(&self, path: impl Into<ValueMatcher>) -> InterceptorBuilder<'_> {
        self.intercept_matching(Method::POST, path)
    }

    pub fn put_matching(&self, path: impl Into<ValueMatcher>) -> InterceptorBuilder<'_> {
        self.intercept_matching(Method::PUT, path)
    }

    pub fn patch_matching(&self, path: impl Into<ValueMatcher>) -> InterceptorBuilder<'_> {
        self.intercept_matching(Method::PATCH, path)
    }

    pub fn delete_matching(&self, path: impl Into<ValueMatcher>) -> InterceptorBuilder<'_> {
        self.intercept_matching(Method::DELETE, path)
    }

    pub fn get(&self, path: &str) -> Result<InterceptorBuilder<'_>> {
        self.intercept(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> Result<InterceptorBuilder<'_>> {
        self.intercept(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> Result<InterceptorBuilder<'_>> {
        self.intercept(Method::PUT, path)
    }

    pub fn patch(&self, path: &str) -> Result<InterceptorBuilder<'_>> {
        self.intercept(Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> Result<InterceptorBuilder<'_>> {
        self.intercept(Method::DELETE, path)
    }

    pub fn head(&self, path: &str) -> Result<InterceptorBuilder<'_>> {
        self.intercept(Method::HEAD, path)
    }

    pub fn options(&self, path: &str) -> Result<InterceptorBuilder<'_>> {
        self.intercept(Method::OPTIONS, path)
    }

    /// Make the interceptors of this scope persistent, including those
    /// declared later. Interceptors that set their own persist value keep it.
    pub fn persist(&self, persist: bool) -> &Self {
        self.state.persist.store(persist, Ordering::SeqCst);
        for declared in self.state.interceptors.lock().iter() {
            if !declared.pinned {
                declared.interceptor.set_persistent(persist);
            }
        }
        self
    }

    /// Subscribe to events of this scope: matches of its interceptors and
    /// unmatched requests to its origin
    pub fn on<F>(&self, channel: Channel, handler: F) -> SubscriptionId
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        self.emitter.on_scoped(
            self.state.id,
            self.state.origin.clone(),
            channel,
            false,
            Arc::new(handler),
        )
    }

    pub fn once<F>(&self, channel: Channel, handler: F) -> SubscriptionId
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        self.emitter.on_scoped(
            self.state.id,
            self.state.origin.clone(),
            channel,
            true,
            Arc::new(handler),
        )
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.emitter.off(id)
    }

    /// Interceptors declared through this scope, in declaration order
    pub fn interceptors(&self) -> Vec<Arc<Interceptor>> {
        self.state
            .interceptors
            .lock()
            .iter()
            .map(|d| Arc::clone(&d.interceptor))
            .collect()
    }

    pub fn pending_mocks(&self) -> Vec<String> {
        self.state
            .interceptors
            .lock()
            .iter()
            .map(|d| &d.interceptor)
            .filter(|i| !i.is_removed() && i.is_pending())
            .map(|i| i.describe())
            .collect()
    }

    pub fn is_done(&self) -> bool {
        self.pending_mocks().is_empty()
    }

    /// Fail with the pending interceptors if any is still unsatisfied
    pub fn done(&self) -> Result<()> {
        let pending = self.pending_mocks();
        if pending.is_empty() {
            Ok(())
        } else {
            Err(EngineError::PendingMocks(pending))
        }
    }

    /// Remove every interceptor and scoped subscription of this scope
    pub fn remove(&self) {
        let removed = self.registry.remove_scope(self.state.id);
        self.emitter.remove_scope(self.state.id);
        info!(
            "Removed scope {} for {} ({} interceptors)",
            self.state.id, self.state.origin, removed
        );
    }

    fn declare(&self, builder: InterceptorBuilder<'_>, reply: Reply) -> &Self {
        let persistent = builder
            .persist
            .unwrap_or_else(|| self.state.persist.load(Ordering::SeqCst));

        let interceptor = Arc::new(Interceptor::new(
            self.registry.next_id(),
            self.state.id,
            self.state.origin.clone(),
            RequestSpec {
                method: builder.method,
                path: builder.path,
                query: builder.query,
                headers: builder.headers,
                body: builder.body,
            },
            reply,
            persistent,
        ));

        self.state.interceptors.lock().push(Declared {
            interceptor: Arc::clone(&interceptor),
            pinned: builder.persist.is_some(),
        });
        self.registry.declare(interceptor);
        self
    }
}

/// Request predicates of an interceptor being declared. Finished by one of
/// the `reply*` methods, which hand back the scope for chaining.
pub struct InterceptorBuilder<'s> {
    scope: &'s Scope,
    method: Method,
    path: ValueMatcher,
    query: QueryMatcher,
    headers: Vec<(String, ValueMatcher)>,
    body: Option<BodyMatcher>,
    persist: Option<bool>,
}

impl<'s> InterceptorBuilder<'s> {
    pub fn query(mut self, query: QueryMatcher) -> Self {
        self.query = query;
        self
    }

    /// Require exactly these query pairs, in any order
    pub fn query_pairs<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query(QueryMatcher::exact(pairs))
    }

    pub fn query_any(self) -> Self {
        self.query(QueryMatcher::Any)
    }

    pub fn match_header(mut self, name: impl Into<String>, value: impl Into<ValueMatcher>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: BodyMatcher) -> Self {
        self.body = Some(body);
        self
    }

    pub fn json_body(self, value: Value) -> Self {
        self.body(BodyMatcher::json(value))
    }

    /// Override the scope's persist setting for this interceptor
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Reply with a status and no body
    pub fn reply(self, status: u16) -> &'s Scope {
        self.reply_definition(ResponseDefinition::new(status))
    }

    pub fn reply_with(self, status: u16, body: impl Into<Bytes>, headers: RawHeaders) -> &'s Scope {
        self.reply_definition(
            ResponseDefinition::new(status)
                .with_headers(headers)
                .with_body(body),
        )
    }

    pub fn reply_definition(self, definition: ResponseDefinition) -> &'s Scope {
        let scope = self.scope;
        scope.declare(self, Reply::Fixed(definition))
    }

    pub fn reply_json<T: Serialize + ?Sized>(self, status: u16, value: &T) -> Result<&'s Scope> {
        let definition = ResponseDefinition::new(status).with_json(value)?;
        Ok(self.reply_definition(definition))
    }

    /// Build the response per request
    pub fn reply_fn<F>(self, f: F) -> &'s Scope
    where
        F: Fn(&RequestRecord, Option<&Bytes>) -> ResponseDefinition + Send + Sync + 'static,
    {
        let scope = self.scope;
        scope.declare(self, Reply::Dynamic(Arc::new(f)))
    }
}
