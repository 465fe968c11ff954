//! Request dispatch over a mock context
//!
//! Every outbound request handed over by the interception substrate goes
//! through [`MockContext::dispatch`]: it is matched against the declared
//! interceptors, answered with a synthesized response on a match, and
//! otherwise reported as unmatched and either passed to the network or
//! rejected.

use crate::events::emitter::{Event, EventEmitter};
use crate::interception::gate::NetworkGate;
use crate::interception::network::NetworkPath;
use crate::mocking::interceptor::Interceptor;
use crate::mocking::matcher::{MatchHint, MatchResult, Matcher};
use crate::mocking::matchers::ValueMatcher;
use crate::mocking::registry::InterceptorRegistry;
use crate::mocking::request::{Origin, RequestRecord};
use crate::mocking::scope::Scope;
use crate::response::body::{body_channel, BodySender, BodySource};
use crate::response::synthesizer::MockResponse;
use crate::utils::config::EngineConfig;
use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::StatusCode;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct ContextInner {
    config: EngineConfig,
    registry: Arc<InterceptorRegistry>,
    emitter: Arc<EventEmitter>,
    gate: NetworkGate,
    matcher: Matcher,
}

/// Registry, event emitter and network gate shared by a test run
#[derive(Clone)]
pub struct MockContext {
    inner: Arc<ContextInner>,
}

impl MockContext {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let registry = Arc::new(InterceptorRegistry::new());
        let gate = NetworkGate::from_config(&config.network);
        info!(
            "Mock context ready (net connect {})",
            if gate.is_disabled() { "restricted" } else { "allowed" }
        );

        Self {
            inner: Arc::new(ContextInner {
                matcher: Matcher::new(Arc::clone(&registry)),
                emitter: Arc::new(EventEmitter::new()),
                registry,
                gate,
                config,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<InterceptorRegistry> {
        &self.inner.registry
    }

    pub fn events(&self) -> &EventEmitter {
        &self.inner.emitter
    }

    pub fn gate(&self) -> &NetworkGate {
        &self.inner.gate
    }

    pub fn matcher(&self) -> &Matcher {
        &self.inner.matcher
    }

    /// Open a scope for `origin` (`scheme://host[:port]`)
    pub fn scope(&self, origin: &str) -> Result<Scope> {
        let origin = Origin::parse(origin)?;
        Ok(Scope::new(
            origin,
            Arc::clone(&self.inner.registry),
            Arc::clone(&self.inner.emitter),
        ))
    }

    /// Streaming body channel sized from `dispatch.body_channel_capacity`
    pub fn body_channel(&self) -> (BodySender, BodySource) {
        body_channel(self.inner.config.dispatch.body_channel_capacity)
    }

    pub fn disable_net_connect(&self) {
        self.inner.gate.disable_net_connect();
    }

    pub fn enable_net_connect(&self, allowed: Option<ValueMatcher>) {
        self.inner.gate.enable_net_connect(allowed);
    }

    /// Interceptors across all scopes still waiting for their request
    pub fn pending_mocks(&self) -> Vec<String> {
        self.inner
            .registry
            .all()
            .iter()
            .filter(|i| i.is_pending())
            .map(|i| i.describe())
            .collect()
    }

    pub fn is_done(&self) -> bool {
        self.pending_mocks().is_empty()
    }

    /// Remove every scope, drop all subscriptions and restore the
    /// configured network gate
    pub fn reset(&self) {
        self.inner.registry.clear();
        self.inner.emitter.remove_all(None);
        self.inner.gate.apply_config(&self.inner.config.network);
        info!("Mock context reset");
    }

    pub async fn dispatch(
        &self,
        request: RequestRecord,
        network: &dyn NetworkPath,
    ) -> Result<MockResponse> {
        self.dispatch_with_cancel(request, network, CancellationToken::new())
            .await
    }

    /// Like [`MockContext::dispatch`]; cancelling `cancel` stops waiting for
    /// the request body.
    ///
    /// Whenever some interceptor could match, the body is read in full first,
    /// even if no candidate has a body matcher, so that the `request` event
    /// carries it. A stalled body therefore delays the reply by up to
    /// `dispatch.body_match_timeout_ms`; after that, candidates without a
    /// body matcher still match and the event sees no body.
    pub async fn dispatch_with_cancel(
        &self,
        mut request: RequestRecord,
        network: &dyn NetworkPath,
        cancel: CancellationToken,
    ) -> Result<MockResponse> {
        debug!("Dispatching {} {}", request.method(), request.url());

        let plan = self.inner.matcher.plan(&request);
        if plan.hint() == MatchHint::Candidate {
            let body_available = self.buffer_body(&mut request, &cancel).await;
            let body = request.buffered_body().cloned();

            if let MatchResult::Matched(interceptor) = plan.resolve(body.as_ref(), body_available) {
                return Ok(self.reply(&request, &interceptor, body.as_ref()));
            }
        }

        self.unmatched(request, network).await
    }

    /// Dispatch a hyper request and answer with a hyper response.
    /// Failures become a `502 Bad Gateway` carrying the error message.
    pub async fn dispatch_hyper<B>(
        &self,
        request: hyper::Request<B>,
        network: &dyn NetworkPath,
    ) -> hyper::Response<UnsyncBoxBody<Bytes, EngineError>>
    where
        B: Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: fmt::Display,
    {
        let result = match RequestRecord::from_hyper(request) {
            Ok(record) => self.dispatch(record, network).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => response.into_hyper(),
            Err(e) => {
                warn!("Request failed: {}", e);
                let body = Full::new(Bytes::from(e.to_string()))
                    .map_err(|never| match never {})
                    .boxed_unsync();
                let mut response = hyper::Response::new(body);
                *response.status_mut() = StatusCode::BAD_GATEWAY;
                response
            }
        }
    }

    /// Wait for the request body; false when it never fully arrived
    async fn buffer_body(&self, request: &mut RequestRecord, cancel: &CancellationToken) -> bool {
        let timeout = self.inner.config.dispatch.body_match_timeout();

        tokio::select! {
            biased;

            result = tokio::time::timeout(timeout, request.buffer_body()) => match result {
                Ok(Ok(_)) => true,
                Ok(Err(e)) => {
                    warn!("Request body unavailable: {}", e);
                    false
                }
                Err(_) => {
                    warn!("Request body did not arrive within {:?}", timeout);
                    false
                }
            },
            _ = cancel.cancelled() => {
                warn!("Request body wait cancelled");
                false
            }
        }
    }

    fn reply(
        &self,
        request: &RequestRecord,
        interceptor: &Arc<Interceptor>,
        body: Option<&Bytes>,
    ) -> MockResponse {
        self.inner.emitter.emit(&Event::Request {
            request,
            interceptor,
            body,
        });

        let response = interceptor.respond(request, body).synthesize();
        let count = interceptor.record_interception();
        info!(
            "Replied {} to {} {} (interception {} of {})",
            response.status(),
            request.method(),
            request.url(),
            count,
            interceptor.describe()
        );

        self.inner.emitter.emit(&Event::Replied {
            request,
            interceptor,
        });
        response
    }

    async fn unmatched(
        &self,
        request: RequestRecord,
        network: &dyn NetworkPath,
    ) -> Result<MockResponse> {
        self.inner.emitter.emit(&Event::NoMatch { request: &request });

        if self.inner.gate.is_allowed(request.origin()) {
            debug!(
                "No match for {} {}, passing through to the network",
                request.method(),
                request.url()
            );
            let raw = network.forward(request).await?;
            return Ok(raw.synthesize());
        }

        warn!(
            "No match for {} {} and net connect is not allowed",
            request.method(),
            request.url()
        );
        Err(EngineError::NoMatch {
            method: request.method().to_string(),
            url: request.url(),
        })
    }
}

impl Default for MockContext {
    fn default() -> Self {
        Self::new()
    }
}
