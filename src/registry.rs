//! Ordered metric registry with lazily instantiated adapters.
//!
//! Metrics are registered as factories. An adapter is built on first use and
//! kept until it is explicitly invalidated, so expensive scorers load once
//! per process.

use crate::config::ExternalMetricConfig;
use crate::external::CommandMetric;
use crate::metrics::{LengthRatio, MetricAdapter, MetricError, ZeroEdit};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use thiserror::Error;

/// Builds a metric adapter on first use
pub type MetricFactory =
    Arc<dyn Fn() -> Result<Arc<dyn MetricAdapter>, MetricError> + Send + Sync>;

/// Registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unknown metric: {name} (available: {available})")]
    UnknownMetric { name: String, available: String },

    #[error("Failed to load metric: {0}")]
    Load(#[from] MetricError),
}

/// Explicit, ordered list of available metrics
pub struct MetricRegistry {
    factories: RwLock<Vec<(String, MetricFactory)>>,
    instances: Mutex<HashMap<String, Arc<dyn MetricAdapter>>>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self {
            factories: RwLock::new(Vec::new()),
            instances: Mutex::new(HashMap::new()),
        }
    }
}

impl MetricRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in metrics
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(ZeroEdit::NAME, || Ok(Arc::new(ZeroEdit) as Arc<dyn MetricAdapter>));
        registry.register(LengthRatio::NAME, || {
            Ok(Arc::new(LengthRatio) as Arc<dyn MetricAdapter>)
        });
        registry
    }

    /// Register a metric factory
    ///
    /// Re-registering a name keeps its position, replaces the factory and
    /// drops any loaded instance.
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Result<Arc<dyn MetricAdapter>, MetricError> + Send + Sync + 'static,
    {
        let factory: MetricFactory = Arc::new(factory);
        {
            let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = factories.iter_mut().find(|(n, _)| n == name) {
                slot.1 = factory;
            } else {
                factories.push((name.to_string(), factory));
            }
        }
        self.invalidate(name);
        tracing::debug!(metric = name, "Metric registered");
    }

    /// Register an external scorer command
    pub fn register_external(&self, config: ExternalMetricConfig) {
        let name = config.name.clone();
        self.register(&name, move || {
            Ok(Arc::new(CommandMetric::new(config.clone())) as Arc<dyn MetricAdapter>)
        });
    }

    /// Registered metric names, in registration order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Canonical registered name for `name`, matched case-insensitively
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<String> {
        let names = self.names();
        names
            .iter()
            .find(|n| *n == name)
            .or_else(|| names.iter().find(|n| n.eq_ignore_ascii_case(name)))
            .cloned()
    }

    /// Get the adapter for `name`, instantiating it on first use
    ///
    /// # Errors
    ///
    /// Returns `UnknownMetric` if nothing is registered under `name`, or
    /// `Load` if the factory fails.
    pub fn get(&self, name: &str) -> Result<Arc<dyn MetricAdapter>, RegistryError> {
        let canonical = self.resolve(name).ok_or_else(|| RegistryError::UnknownMetric {
            name: name.to_string(),
            available: self.names().join(", "),
        })?;

        let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(adapter) = instances.get(&canonical) {
            return Ok(Arc::clone(adapter));
        }

        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(n, _)| *n == canonical)
            .map(|(_, f)| Arc::clone(f))
            .ok_or_else(|| RegistryError::UnknownMetric {
                name: name.to_string(),
                available: String::new(),
            })?;

        tracing::info!(metric = %canonical, "Loading metric");
        let adapter = factory()?;
        instances.insert(canonical, Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Whether the adapter for `name` is currently instantiated
    #[must_use]
    pub fn is_loaded(&self, name: &str) -> bool {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Drop the loaded adapter for `name`; the next `get` rebuilds it
    pub fn invalidate(&self, name: &str) {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Drop every loaded adapter
    pub fn clear(&self) {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("metrics", &self.names())
            .finish_non_exhaustive()
    }
}

/// Process-wide registry, created with the built-in metrics on first access
pub fn global() -> &'static MetricRegistry {
    static REGISTRY: OnceLock<MetricRegistry> = OnceLock::new();
    REGISTRY.get_or_init(MetricRegistry::with_builtins)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(registry: &MetricRegistry, name: &str) -> Arc<AtomicUsize> {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        registry.register(name, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(ZeroEdit) as Arc<dyn MetricAdapter>)
        });
        loads
    }

    #[test]
    fn test_builtins_in_order() {
        let registry = MetricRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["ZeroEdit", "LengthRatio"]);
    }

    #[test]
    fn test_lazy_single_load() {
        let registry = MetricRegistry::new();
        let loads = counting(&registry, "Counted");
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert!(!registry.is_loaded("Counted"));

        registry.get("Counted").unwrap();
        registry.get("Counted").unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(registry.is_loaded("Counted"));
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let registry = MetricRegistry::new();
        let loads = counting(&registry, "Counted");
        registry.get("Counted").unwrap();
        registry.invalidate("Counted");
        assert!(!registry.is_loaded("Counted"));
        registry.get("Counted").unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_metric() {
        let registry = MetricRegistry::with_builtins();
        let err = registry.get("COMET").err().unwrap();
        match err {
            RegistryError::UnknownMetric { name, available } => {
                assert_eq!(name, "COMET");
                assert_eq!(available, "ZeroEdit, LengthRatio");
            }
            RegistryError::Load(e) => panic!("unexpected load error: {e}"),
        }
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let registry = MetricRegistry::with_builtins();
        assert_eq!(registry.resolve("zeroedit").as_deref(), Some("ZeroEdit"));
        assert_eq!(registry.get("lengthratio").unwrap().name(), "LengthRatio");
    }

    #[test]
    fn test_factory_failure_propagates() {
        let registry = MetricRegistry::new();
        registry.register("Broken", || {
            Err(MetricError::Invocation {
                metric: "Broken".to_string(),
                message: "model missing".to_string(),
            })
        });
        assert!(matches!(registry.get("Broken"), Err(RegistryError::Load(_))));
        assert!(!registry.is_loaded("Broken"));
    }

    #[test]
    fn test_reregister_keeps_position() {
        let registry = MetricRegistry::with_builtins();
        registry.get("ZeroEdit").unwrap();
        registry.register("ZeroEdit", || Ok(Arc::new(LengthRatio) as Arc<dyn MetricAdapter>));
        assert_eq!(registry.names(), vec!["ZeroEdit", "LengthRatio"]);
        assert!(!registry.is_loaded("ZeroEdit"));
        assert_eq!(registry.get("ZeroEdit").unwrap().name(), "LengthRatio");
    }

    #[test]
    fn test_register_external() {
        let registry = MetricRegistry::with_builtins();
        registry.register_external(ExternalMetricConfig {
            name: "BLEU".to_string(),
            command: "sacrebleu-json".to_string(),
            args: "{ref} {hyp}".to_string(),
            segment_level: false,
            system_score_is_segment_mean: false,
            languages: vec!["en".to_string()],
            timeout_secs: 600,
        });
        let bleu = registry.get("BLEU").unwrap();
        assert!(!bleu.segment_level());
        assert!(bleu.language_support("en"));
        assert!(!bleu.language_support("ja"));
    }

    #[test]
    fn test_global_is_shared() {
        assert!(std::ptr::eq(global(), global()));
        assert!(global().resolve("ZeroEdit").is_some());
    }
}
