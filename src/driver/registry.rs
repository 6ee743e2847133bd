//! Plugin Registry
//!
//! Owns every loaded backend and the one lock that serializes registry
//! changes and all backend calls. Backends may block on fabric I/O while the
//! lock is held; staging throughput is therefore serialized across the whole
//! driver. [`PluginRegistry::with_plugins`] is the only way to reach a
//! backend, so that trade-off stays in one place.
//!
//! Lock order: callers may hold their job-table lock when entering the
//! driver. The registry lock is always taken last and never held while
//! acquiring anything else.

use super::aggregate::worst;
use crate::backends::BackendCatalog;
use crate::config::DriverConfig;
use crate::domain::ports::{BoxedPlugin, BurstBufferPlugin};
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Namespace prefix of backend names
pub const PLUGIN_PREFIX: &str = "burst_buffer/";

/// Split a comma-separated backend list into bare, lowercase type names.
/// Empty items are skipped and a redundant `burst_buffer/` prefix is dropped.
pub fn parse_plugin_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let item = item.to_ascii_lowercase();
            match item.strip_prefix(PLUGIN_PREFIX) {
                Some(bare) => bare.to_string(),
                None => item,
            }
        })
        .collect()
}

// =============================================================================
// Plugin Descriptor
// =============================================================================

/// One loaded backend
pub struct PluginDescriptor {
    name: String,
    plugin: BoxedPlugin,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, plugin: BoxedPlugin) -> Self {
        Self {
            name: name.into(),
            plugin,
        }
    }

    /// Fully qualified name, e.g. `burst_buffer/generic`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plugin(&self) -> &dyn BurstBufferPlugin {
        self.plugin.as_ref()
    }

    pub fn plugin_mut(&mut self) -> &mut dyn BurstBufferPlugin {
        self.plugin.as_mut()
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .finish()
    }
}

/// Tear down backends in order, reporting the worst teardown error
fn teardown(plugins: Vec<PluginDescriptor>) -> Result<()> {
    plugins.into_iter().fold(Ok(()), |acc, mut desc| {
        let rc = desc.plugin.fini();
        match &rc {
            Ok(()) => debug!(plugin = desc.name(), "Unloaded burst buffer backend"),
            Err(e) => warn!(plugin = desc.name(), error = %e, "Backend teardown failed"),
        }
        worst(acc, rc)
    })
}

// =============================================================================
// Registry State
// =============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    /// `None` until initialized; `Some(vec![])` is a valid empty registry
    plugins: Option<Vec<PluginDescriptor>>,
    /// Backend list the current plugins were loaded from
    plugin_list: Option<String>,
}

// =============================================================================
// Plugin Registry
// =============================================================================

/// Lazily initialized, explicitly torn down set of backends
pub struct PluginRegistry {
    catalog: BackendCatalog,
    config: RwLock<DriverConfig>,
    /// Fast-path flag mirroring `state.plugins.is_some()`
    initialized: AtomicBool,
    state: Mutex<RegistryState>,
}

impl PluginRegistry {
    pub fn new(config: DriverConfig, catalog: BackendCatalog) -> Self {
        Self {
            catalog,
            config: RwLock::new(config),
            initialized: AtomicBool::new(false),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Load every configured backend. Idempotent.
    ///
    /// On the first backend that fails to load, every backend loaded by this
    /// call is torn down again before the lock is released, so callers never
    /// observe a partially loaded registry.
    pub fn init(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut state = self.state.lock();
        if state.plugins.is_some() {
            return Ok(());
        }

        let config = self.config.read().clone();
        let plugin_list = config.burst_buffer_type.clone();
        let mut plugins = Vec::new();

        for plugin_type in parse_plugin_list(&plugin_list) {
            let name = format!("{}{}", PLUGIN_PREFIX, plugin_type);
            match self.catalog.create(&plugin_type, &config) {
                Ok(plugin) => {
                    debug!(plugin = %name, "Loaded burst buffer backend");
                    plugins.push(PluginDescriptor::new(name, plugin));
                }
                Err(e) => {
                    error!(plugin = %name, error = %e, "Cannot create burst_buffer context");
                    if let Err(rollback) = teardown(plugins) {
                        warn!(error = %rollback, "Rollback after failed load was not clean");
                    }
                    return Err(e);
                }
            }
        }

        info!(
            plugins = plugins.len(),
            burst_buffer_type = %plugin_list,
            "Burst buffer registry initialized"
        );
        state.plugins = Some(plugins);
        state.plugin_list = Some(plugin_list);
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Unload every backend and return to the uninitialized state. Idempotent.
    pub fn fini(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.initialized.store(false, Ordering::Release);
        state.plugin_list = None;

        match state.plugins.take() {
            Some(plugins) => {
                let count = plugins.len();
                let rc = teardown(plugins);
                info!(plugins = count, "Burst buffer registry torn down");
                rc
            }
            None => Ok(()),
        }
    }

    /// Run `f` over the loaded backends with the registry lock held.
    /// An uninitialized registry presents as zero backends.
    pub fn with_plugins<R>(&self, f: impl FnOnce(&mut [PluginDescriptor]) -> R) -> R {
        let mut state = self.state.lock();
        let plugins = state.plugins.as_deref_mut().unwrap_or(&mut []);
        f(plugins)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Number of loaded backends, `None` before initialization
    pub fn plugin_count(&self) -> Option<usize> {
        self.state.lock().plugins.as_ref().map(Vec::len)
    }

    /// Loaded backend names in configuration order
    pub fn plugin_names(&self) -> Vec<String> {
        self.state
            .lock()
            .plugins
            .iter()
            .flatten()
            .map(|desc| desc.name().to_string())
            .collect()
    }

    /// Backend list the loaded backends came from
    pub fn loaded_plugin_list(&self) -> Option<String> {
        self.state.lock().plugin_list.clone()
    }

    /// Current configuration
    pub fn config(&self) -> DriverConfig {
        self.config.read().clone()
    }

    /// Replace the configuration.
    ///
    /// A changed backend list is only picked up by the next `init` after a
    /// `fini`; backend parameters reach loaded backends on `reconfig`.
    pub fn update_config(&self, config: DriverConfig) -> Result<()> {
        config.validate()?;
        let list_changed = {
            let current = self.config.read();
            current.burst_buffer_type != config.burst_buffer_type
        };
        if list_changed && self.is_initialized() {
            warn!(
                burst_buffer_type = %config.burst_buffer_type,
                "Backend list changed; takes effect after registry teardown"
            );
        }
        *self.config.write() = config;
        Ok(())
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("initialized", &self.is_initialized())
            .field("catalog", &self.catalog)
            .finish()
    }
}
