//! Request-to-interceptor matching
//!
//! Matching runs in two phases. [`Matcher::plan`] filters the origin's
//! candidates on everything known up front (method, path, query, headers);
//! that is enough for a fast "no candidate" answer. [`MatchPlan::resolve`]
//! then applies body matchers once the body is buffered and claims the
//! first interceptor that accepts.

use crate::mocking::interceptor::Interceptor;
use crate::mocking::registry::InterceptorRegistry;
use crate::mocking::request::RequestRecord;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// Outcome of matching one request
#[derive(Debug, Clone)]
pub enum MatchResult {
    Matched(Arc<Interceptor>),
    NoMatch,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }

    pub fn interceptor(&self) -> Option<&Arc<Interceptor>> {
        match self {
            MatchResult::Matched(i) => Some(i),
            MatchResult::NoMatch => None,
        }
    }
}

/// Early answer available before the body is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchHint {
    /// Nothing can match, whatever the body
    NoCandidate,
    Candidate,
}

/// Candidates that passed the header-level checks, in declaration order
#[derive(Debug)]
pub struct MatchPlan {
    candidates: Vec<Arc<Interceptor>>,
}

impl MatchPlan {
    pub fn hint(&self) -> MatchHint {
        if self.candidates.is_empty() {
            MatchHint::NoCandidate
        } else {
            MatchHint::Candidate
        }
    }

    /// Whether the decision depends on the request body
    pub fn requires_body(&self) -> bool {
        self.candidates.iter().any(|i| i.has_body_matcher())
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Final decision given the buffered body.
    ///
    /// `body_available` is false when the body never arrived (timeout,
    /// cancellation, read error); interceptors with a body matcher then
    /// decline.
    pub fn resolve(self, body: Option<&Bytes>, body_available: bool) -> MatchResult {
        for candidate in self.candidates {
            if !candidate.accepts_body(body, body_available) {
                continue;
            }
            // loses the race if another request consumed it meanwhile
            if candidate.try_claim() {
                debug!("Matched interceptor {}", candidate.describe());
                return MatchResult::Matched(candidate);
            }
        }
        MatchResult::NoMatch
    }
}

/// Matches requests against the registry
#[derive(Clone)]
pub struct Matcher {
    registry: Arc<InterceptorRegistry>,
}

impl Matcher {
    pub fn new(registry: Arc<InterceptorRegistry>) -> Self {
        Self { registry }
    }

    pub fn plan(&self, request: &RequestRecord) -> MatchPlan {
        let candidates: Vec<_> = self
            .registry
            .find_candidates(request.origin())
            .into_iter()
            .filter(|i| i.accepts_head(request))
            .collect();

        debug!(
            "{} {}: {} candidate interceptor(s)",
            request.method(),
            request.url(),
            candidates.len()
        );
        MatchPlan { candidates }
    }

    /// Single-step match using whatever body is already buffered.
    ///
    /// Claims the interceptor without recording an interception; only
    /// dispatch replies and counts.
    #[cfg(test)]
    pub(crate) fn match_request(&self, request: &RequestRecord) -> MatchResult {
        use crate::mocking::request::RequestBody;

        let body = request.buffered_body();
        let body_available = !matches!(request.body(), RequestBody::Streaming { .. });
        self.plan(request).resolve(body, body_available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocking::interceptor::{Reply, RequestSpec, ResponseDefinition};
    use crate::mocking::matchers::{BodyMatcher, QueryMatcher, ValueMatcher};
    use crate::mocking::request::Origin;
    use hyper::Method;

    fn declare(
        registry: &Arc<InterceptorRegistry>,
        method: Method,
        path: &str,
        body: Option<BodyMatcher>,
        persistent: bool,
    ) -> Arc<Interceptor> {
        let interceptor = Arc::new(Interceptor::new(
            registry.next_id(),
            1,
            Origin::parse("http://example.test").unwrap(),
            RequestSpec {
                method,
                path: ValueMatcher::path(path).unwrap(),
                query: QueryMatcher::None,
                headers: Vec::new(),
                body,
            },
            Reply::Fixed(ResponseDefinition::new(200)),
            persistent,
        ));
        registry.declare(Arc::clone(&interceptor));
        interceptor
    }

    #[test]
    fn test_first_declared_wins() {
        let registry = Arc::new(InterceptorRegistry::new());
        let a = declare(&registry, Method::GET, "/x", None, false);
        let b = declare(&registry, Method::GET, "/*", None, false);
        let matcher = Matcher::new(Arc::clone(&registry));

        let req = RequestRecord::get("http://example.test/x").unwrap();
        assert_eq!(matcher.match_request(&req).interceptor().unwrap().id(), a.id());
        // a is consumed, b takes over
        assert_eq!(matcher.match_request(&req).interceptor().unwrap().id(), b.id());
        assert!(!matcher.match_request(&req).is_match());
    }

    #[test]
    fn test_persistent_keeps_matching() {
        let registry = Arc::new(InterceptorRegistry::new());
        let a = declare(&registry, Method::GET, "/x", None, true);
        let matcher = Matcher::new(Arc::clone(&registry));
        let req = RequestRecord::get("http://example.test/x").unwrap();

        for _ in 0..5 {
            let matched = matcher.match_request(&req);
            assert_eq!(matched.interceptor().unwrap().id(), a.id());
        }
        assert!(!a.is_consumed());
    }

    #[test]
    fn test_hint_fast_rejects() {
        let registry = Arc::new(InterceptorRegistry::new());
        declare(&registry, Method::POST, "/x", Some(BodyMatcher::exact("a")), false);
        let matcher = Matcher::new(Arc::clone(&registry));

        let wrong_path = RequestRecord::post("http://example.test/y").unwrap();
        assert_eq!(matcher.plan(&wrong_path).hint(), MatchHint::NoCandidate);

        let right_path = RequestRecord::post("http://example.test/x").unwrap();
        let plan = matcher.plan(&right_path);
        assert_eq!(plan.hint(), MatchHint::Candidate);
        assert!(plan.requires_body());
    }

    #[test]
    fn test_body_decides_between_candidates() {
        let registry = Arc::new(InterceptorRegistry::new());
        let a = declare(&registry, Method::POST, "/x", Some(BodyMatcher::exact("a")), false);
        let b = declare(&registry, Method::POST, "/x", Some(BodyMatcher::exact("b")), false);
        let matcher = Matcher::new(Arc::clone(&registry));

        let req = RequestRecord::post("http://example.test/x").unwrap().with_body("b");
        assert_eq!(matcher.match_request(&req).interceptor().unwrap().id(), b.id());
        assert!(!a.is_consumed());
    }

    #[test]
    fn test_missing_body_declines_body_matchers() {
        let registry = Arc::new(InterceptorRegistry::new());
        declare(&registry, Method::POST, "/x", Some(BodyMatcher::exact("")), false);
        let fallback = declare(&registry, Method::POST, "/x", None, false);
        let matcher = Matcher::new(Arc::clone(&registry));

        let req = RequestRecord::post("http://example.test/x").unwrap();
        let result = matcher.plan(&req).resolve(None, false);
        assert_eq!(result.interceptor().unwrap().id(), fallback.id());
    }

    #[test]
    fn test_removed_after_plan_is_not_claimed() {
        let registry = Arc::new(InterceptorRegistry::new());
        declare(&registry, Method::GET, "/x", None, true);
        let matcher = Matcher::new(Arc::clone(&registry));

        let req = RequestRecord::get("http://example.test/x").unwrap();
        let plan = matcher.plan(&req);
        registry.remove_scope(1);
        assert!(!plan.resolve(None, true).is_match());
    }
}
