//! RAW engine runtime
//!
//! This module contains the serialized update worker that owns a RAW context
//! and the file-based engine configuration.

pub mod config;
pub mod dispatcher;

// Re-export main types
pub use config::{ConfigManager, EngineConfig, GeneralConfig, RawConfig, ValidationResult};
pub use dispatcher::{IeObserver, RawDispatcher};

use crate::context::RawContext;
use crate::Result;

use std::sync::Arc;

/// Dispatcher builder for easy configuration
#[derive(Default)]
pub struct DispatcherBuilder {
    config: Option<EngineConfig>,
    observers: Vec<Arc<dyn IeObserver>>,
}

impl std::fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("config", &self.config)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl DispatcherBuilder {
    /// Create new dispatcher builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set engine configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register an observer before the first pass runs
    pub fn with_observer(mut self, observer: Arc<dyn IeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Build and start the dispatcher
    pub async fn build(self) -> Result<RawDispatcher> {
        let config = self.config.unwrap_or_default();
        let mut context = RawContext::new(config.general.interface_kind, config.raw.to_options())?;

        context.trigger_update(false);
        let dispatcher = RawDispatcher::start_with_observers(context, self.observers);

        log::info!("RAW engine '{}' ready", config.general.name);
        Ok(dispatcher)
    }
}
