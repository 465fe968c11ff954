//! Network gate for unmatched requests
//!
//! Decides whether a request that no interceptor accepted may reach the
//! real network. By default everything may; once disabled, only origins on
//! the allow-list pass.

use crate::mocking::matchers::ValueMatcher;
use crate::mocking::request::Origin;
use crate::utils::config::NetworkConfig;
use parking_lot::RwLock;
use tracing::{debug, info};

#[derive(Debug, Clone)]
enum Policy {
    AllowAll,
    /// Only hosts matching one of these patterns
    Restricted(Vec<ValueMatcher>),
}

/// Pass-through policy for unmatched requests
pub struct NetworkGate {
    policy: RwLock<Policy>,
}

impl NetworkGate {
    pub fn new() -> Self {
        Self {
            policy: RwLock::new(Policy::AllowAll),
        }
    }

    /// Initial state from configuration. `allowed_hosts` only matters when
    /// `allow_net_connect` is false.
    pub fn from_config(config: &NetworkConfig) -> Self {
        let gate = Self::new();
        gate.apply_config(config);
        gate
    }

    pub(crate) fn apply_config(&self, config: &NetworkConfig) {
        let policy = if config.allow_net_connect {
            Policy::AllowAll
        } else {
            Policy::Restricted(
                config
                    .allowed_hosts
                    .iter()
                    .map(|h| ValueMatcher::host(h))
                    .collect(),
            )
        };
        *self.policy.write() = policy;
    }

    /// Block every origin not explicitly allowed afterwards
    pub fn disable_net_connect(&self) {
        *self.policy.write() = Policy::Restricted(Vec::new());
        info!("Network connections disabled");
    }

    /// With `None`, allow every origin again. With a pattern, add it to the
    /// allow-list; origins not on the list stay blocked.
    pub fn enable_net_connect(&self, allowed: Option<ValueMatcher>) {
        let mut policy = self.policy.write();
        match allowed {
            None => {
                *policy = Policy::AllowAll;
                info!("Network connections enabled");
            }
            Some(pattern) => {
                info!("Network connections enabled for {:?}", pattern);
                match &mut *policy {
                    Policy::Restricted(list) => list.push(pattern),
                    Policy::AllowAll => *policy = Policy::Restricted(vec![pattern]),
                }
            }
        }
    }

    /// Shorthand for allowing a host name or `*` wildcard
    pub fn enable_net_connect_host(&self, host: &str) {
        self.enable_net_connect(Some(ValueMatcher::host(host)));
    }

    /// Patterns are tried against both `host` and `host:port`
    pub fn is_allowed(&self, origin: &Origin) -> bool {
        let allowed = match &*self.policy.read() {
            Policy::AllowAll => true,
            Policy::Restricted(list) => {
                let host_port = origin.host_port();
                list.iter()
                    .any(|p| p.accepts(origin.host()) || p.accepts(&host_port))
            }
        };
        debug!("Network gate for {}: {}", origin, if allowed { "open" } else { "closed" });
        allowed
    }

    pub fn is_disabled(&self) -> bool {
        matches!(*self.policy.read(), Policy::Restricted(_))
    }
}

impl Default for NetworkGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(s: &str) -> Origin {
        Origin::parse(s).unwrap()
    }

    #[test]
    fn test_default_allows_everything() {
        let gate = NetworkGate::new();
        assert!(!gate.is_disabled());
        assert!(gate.is_allowed(&origin("http://example.test")));
    }

    #[test]
    fn test_disable_then_allow_list() {
        let gate = NetworkGate::new();
        gate.disable_net_connect();
        assert!(!gate.is_allowed(&origin("http://example.test")));

        gate.enable_net_connect_host("*.internal.test");
        gate.enable_net_connect(Some(ValueMatcher::literal("localhost:8080")));
        assert!(gate.is_allowed(&origin("http://api.internal.test")));
        assert!(gate.is_allowed(&origin("http://localhost:8080")));
        assert!(!gate.is_allowed(&origin("http://localhost:9090")));
        assert!(!gate.is_allowed(&origin("http://example.test")));

        gate.enable_net_connect(None);
        assert!(gate.is_allowed(&origin("http://example.test")));
    }

    #[test]
    fn test_naming_a_host_restricts_to_it() {
        let gate = NetworkGate::new();
        gate.enable_net_connect_host("localhost");
        assert!(gate.is_disabled());
        assert!(gate.is_allowed(&origin("http://localhost:3000")));
        assert!(!gate.is_allowed(&origin("http://example.test")));
    }

    #[test]
    fn test_disable_clears_allow_list() {
        let gate = NetworkGate::new();
        gate.enable_net_connect_host("localhost");
        gate.disable_net_connect();
        assert!(!gate.is_allowed(&origin("http://localhost")));
    }

    #[test]
    fn test_from_config() {
        let gate = NetworkGate::from_config(&NetworkConfig {
            allow_net_connect: false,
            allowed_hosts: vec!["127.0.0.1".to_string()],
        });
        assert!(gate.is_allowed(&origin("http://127.0.0.1:8080")));
        assert!(!gate.is_allowed(&origin("http://example.test")));
    }
}
