// cd_engine/src/registry.rs

//! Defines `PluginRegistry`, a name-keyed, statically linked plugin loader.

use crate::core::plugin::{Plugin, PluginLoader};
use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Plugins registered in-process under the name steps refer to them by.
#[derive(Default)]
pub struct PluginRegistry {
  plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
}

impl PluginRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers `plugin` under `name`, replacing any previous registration.
  #[instrument(name = "PluginRegistry::register", skip(self, plugin))]
  pub fn register(&self, name: &str, plugin: Arc<dyn Plugin>) {
    let previous = self.plugins.write().insert(name.to_string(), plugin);
    if previous.is_some() {
      event!(Level::WARN, "Overwriting existing plugin registration.");
    } else {
      event!(Level::DEBUG, "Plugin registered.");
    }
  }

  /// Builder-style registration.
  pub fn with_plugin(self, name: &str, plugin: Arc<dyn Plugin>) -> Self {
    self.register(name, plugin);
    self
  }

  pub fn contains(&self, name: &str) -> bool {
    self.plugins.read().contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.plugins.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.plugins.read().is_empty()
  }
}

impl PluginLoader for PluginRegistry {
  fn load(&self, module_ref: &str) -> EngineResult<Arc<dyn Plugin>> {
    match self.plugins.read().get(module_ref) {
      Some(plugin) => Ok(Arc::clone(plugin)),
      None => {
        event!(Level::ERROR, plugin = module_ref, "No plugin registered under this name.");
        Err(EngineError::PluginNotFound {
          plugin: module_ref.to_string(),
        })
      }
    }
  }
}

impl std::fmt::Debug for PluginRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut names: Vec<String> = self.plugins.read().keys().cloned().collect();
    names.sort();
    f.debug_struct("PluginRegistry").field("plugins", &names).finish()
  }
}
