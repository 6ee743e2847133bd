//! Burst Buffer Backends
//!
//! Provides the backend catalog and the built-in backends:
//! - generic: in-memory capacity pool with per-job reservations

pub mod generic;

pub use generic::*;

use crate::config::DriverConfig;
use crate::domain::ports::BoxedPlugin;
use crate::error::{Error, Result};
use indexmap::IndexMap;

/// Constructor for one backend type
pub type BackendConstructor = Box<dyn Fn(&DriverConfig) -> Result<BoxedPlugin> + Send + Sync>;

/// Factory resolving configured backend type names to implementations
pub struct BackendCatalog {
    constructors: IndexMap<String, BackendConstructor>,
}

impl BackendCatalog {
    /// Catalog with no backends
    pub fn empty() -> Self {
        Self {
            constructors: IndexMap::new(),
        }
    }

    /// Catalog with every built-in backend
    pub fn with_builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register(GENERIC_PLUGIN_TYPE, |config| {
            Ok(Box::new(GenericBackend::new(config.generic.clone())?) as BoxedPlugin)
        });
        catalog
    }

    /// Add or replace a backend type
    pub fn register<F>(&mut self, plugin_type: &str, constructor: F) -> &mut Self
    where
        F: Fn(&DriverConfig) -> Result<BoxedPlugin> + Send + Sync + 'static,
    {
        self.constructors
            .insert(plugin_type.to_lowercase(), Box::new(constructor));
        self
    }

    pub fn contains(&self, plugin_type: &str) -> bool {
        self.constructors.contains_key(&plugin_type.to_lowercase())
    }

    /// Registered type names in registration order
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Create a backend instance by type name
    pub fn create(&self, plugin_type: &str, config: &DriverConfig) -> Result<BoxedPlugin> {
        let full_name = format!("burst_buffer/{}", plugin_type);
        let constructor = self
            .constructors
            .get(&plugin_type.to_lowercase())
            .ok_or_else(|| Error::UnknownBackend {
                plugin: full_name.clone(),
            })?;

        constructor(config).map_err(|e| match e {
            Error::PluginLoad { .. } => e,
            other => Error::PluginLoad {
                plugin: full_name,
                reason: other.to_string(),
            },
        })
    }
}

impl Default for BackendCatalog {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl std::fmt::Debug for BackendCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendCatalog")
            .field("types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_builtin_catalog() {
        let catalog = BackendCatalog::default();
        assert!(catalog.contains("generic"));
        assert!(catalog.contains("GENERIC"));
        assert_eq!(catalog.types().collect::<Vec<_>>(), vec!["generic"]);

        let plugin = catalog.create("generic", &DriverConfig::default()).unwrap();
        assert_eq!(plugin.plugin_type(), "generic");
    }

    #[test]
    fn test_unknown_backend() {
        let catalog = BackendCatalog::default();
        let err = catalog
            .create("datawarp", &DriverConfig::default())
            .err()
            .unwrap();
        assert_matches!(err, Error::UnknownBackend { ref plugin } if plugin == "burst_buffer/datawarp");
    }

    #[test]
    fn test_constructor_error_becomes_load_error() {
        let mut catalog = BackendCatalog::empty();
        catalog.register("broken", |_| Err(Error::Configuration("no fabric".into())));

        let err = catalog
            .create("broken", &DriverConfig::default())
            .err()
            .unwrap();
        assert_matches!(err, Error::PluginLoad { ref plugin, .. } if plugin == "burst_buffer/broken");
        assert!(err.is_fatal_for_registry());
    }
}
