//! Health Check Registry
//!
//! Daemons register named readiness checks at startup; the HTTP server's
//! `/ready` endpoint reports 200 only while every check passes. `/live` is
//! independent of the registry: the process answering is the check.

use std::sync::Arc;
use std::sync::RwLock;

type CheckFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Named readiness checks consulted by `/ready`
#[derive(Clone, Default)]
pub struct HealthRegistry {
    checks: Arc<RwLock<Vec<(String, CheckFn)>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named check. Checks must be cheap and non-blocking.
    pub fn register<F>(&self, name: &str, check: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.checks
            .write()
            .expect("health registry lock poisoned")
            .push((name.to_string(), Arc::new(check)));
    }

    /// Run every check; returns the names of the ones that failed.
    pub fn failing(&self) -> Vec<String> {
        self.checks
            .read()
            .expect("health registry lock poisoned")
            .iter()
            .filter(|(_, check)| !check())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_ready(&self) -> bool {
        self.failing().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_empty_registry_is_ready() {
        let registry = HealthRegistry::new();
        assert!(registry.is_ready());
        assert!(registry.failing().is_empty());
    }

    #[test]
    fn test_passing_checks() {
        let registry = HealthRegistry::new();
        registry.register("storage", || true);
        registry.register("grpc", || true);
        assert!(registry.is_ready());
    }

    #[test]
    fn test_failing_check_reported_by_name() {
        let registry = HealthRegistry::new();
        registry.register("storage", || true);
        registry.register("grpc", || false);
        assert!(!registry.is_ready());
        assert_eq!(registry.failing(), vec!["grpc".to_string()]);
    }

    #[test]
    fn test_check_observes_live_state() {
        let ready = Arc::new(AtomicBool::new(false));
        let registry = HealthRegistry::new();
        let flag = Arc::clone(&ready);
        registry.register("warmup", move || flag.load(Ordering::Relaxed));

        assert!(!registry.is_ready());
        ready.store(true, Ordering::Relaxed);
        assert!(registry.is_ready());
    }
}
