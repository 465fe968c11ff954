//! Interceptor registry
//!
//! Maps each origin to its interceptors in declaration order. Declaration
//! order is match priority, including across several scopes that target
//! the same origin.

use crate::mocking::interceptor::Interceptor;
use crate::mocking::request::Origin;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// All declared interceptors, grouped by origin
pub struct InterceptorRegistry {
    by_origin: DashMap<Origin, Vec<Arc<Interceptor>>>,
    next_id: AtomicU64,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self {
            by_origin: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a new scope or interceptor
    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register an interceptor behind any already declared for its origin
    pub fn declare(&self, interceptor: Arc<Interceptor>) {
        debug!("Declaring interceptor {}", interceptor.describe());
        self.by_origin
            .entry(interceptor.origin().clone())
            .or_default()
            .push(interceptor);
    }

    /// Remove every interceptor of a scope; returns how many were removed.
    ///
    /// Removed interceptors are flagged so that a match already holding a
    /// snapshot cannot claim them.
    pub fn remove_scope(&self, scope_id: u64) -> usize {
        let mut removed = 0;
        self.by_origin.retain(|_, interceptors| {
            interceptors.retain(|i| {
                if i.scope_id() == scope_id {
                    i.mark_removed();
                    removed += 1;
                    false
                } else {
                    true
                }
            });
            !interceptors.is_empty()
        });

        if removed > 0 {
            info!("Removed {} interceptors of scope {}", removed, scope_id);
        }
        removed
    }

    /// Snapshot of the interceptors still eligible for `origin`, in
    /// declaration order
    pub fn find_candidates(&self, origin: &Origin) -> Vec<Arc<Interceptor>> {
        match self.by_origin.get(origin) {
            Some(interceptors) => interceptors
                .iter()
                .filter(|i| i.is_available())
                .cloned()
                .collect(),
            None => {
                debug!("No interceptors declared for {}", origin);
                Vec::new()
            }
        }
    }

    /// Every registered interceptor, ordered by declaration
    pub fn all(&self) -> Vec<Arc<Interceptor>> {
        let mut all: Vec<_> = self
            .by_origin
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|i| i.id());
        all
    }

    pub fn has_origin(&self, origin: &Origin) -> bool {
        self.by_origin.contains_key(origin)
    }

    pub fn len(&self) -> usize {
        self.by_origin.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every interceptor
    pub fn clear(&self) {
        for entry in self.by_origin.iter() {
            for interceptor in entry.value() {
                interceptor.mark_removed();
            }
        }
        self.by_origin.clear();
        info!("Cleared all interceptors");
    }
}

impl Default for InterceptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
