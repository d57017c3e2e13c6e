use std::time::Duration;

use railyard_queue::DEFAULT_SETTLING_DELAY;

/// Coordination-store roots and connector tuning a [`crate::Daemon`]
/// needs beyond what a tenant layout carries: where node requests and
/// build requests land, and how long the inbound event connector
/// holds a freshly observed event before it becomes visible to any
/// pipeline.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub node_request_root: String,
    pub executor_root: String,
    pub cache_root: String,
    pub settling_delay: Duration,
}

impl ServerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_node_request_root(mut self, root: impl Into<String>) -> Self {
        self.node_request_root = root.into();
        self
    }

    #[must_use]
    pub fn with_executor_root(mut self, root: impl Into<String>) -> Self {
        self.executor_root = root.into();
        self
    }

    #[must_use]
    pub fn with_cache_root(mut self, root: impl Into<String>) -> Self {
        self.cache_root = root.into();
        self
    }

    /// Overrides the settling delay floor.
    #[must_use]
    pub fn with_settling_delay(mut self, delay: Duration) -> Self {
        self.settling_delay = delay;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node_request_root: "/railyard/nodepool/requests".into(),
            executor_root: "/railyard/executor".into(),
            cache_root: "/railyard/cache".into(),
            settling_delay: DEFAULT_SETTLING_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_cs_layout() {
        let config = ServerConfig::new();
        assert_eq!(config.node_request_root, "/railyard/nodepool/requests");
        assert_eq!(config.settling_delay, DEFAULT_SETTLING_DELAY);
    }

    #[test]
    fn builder_methods_override_one_field_at_a_time() {
        let config = ServerConfig::new().with_settling_delay(Duration::ZERO);
        assert_eq!(config.settling_delay, Duration::ZERO);
        assert_eq!(config.executor_root, "/railyard/executor");
    }
}
