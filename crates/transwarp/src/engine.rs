//! The engine: connection parameters plus a raw-connect strategy.
//!
//! An [`Engine`] is a pure factory. Every call to [`Engine::connect`] opens a
//! brand-new driver connection; there is no pooling. A single process-wide
//! engine can be installed with [`create_engine`] and fetched back with
//! [`global_engine`].

use std::fmt;
use std::sync::{Arc, OnceLock};

use transwarp_core::{Connector, EngineConfig, EngineError, RawConnection, Result};

static ENGINE: OnceLock<Engine> = OnceLock::new();

/// Connection factory shared by every [`DbContext`](crate::DbContext).
///
/// Cloning is cheap; clones share the configuration and the connector.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    connector: Box<dyn Connector>,
}

impl Engine {
    /// Build an engine that is not installed globally.
    pub fn new(config: EngineConfig, connector: impl Connector + 'static) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                connector: Box::new(connector),
            }),
        }
    }

    /// The parameters handed to the connector on every connect.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Name reported by the connector.
    pub fn driver_name(&self) -> &str {
        self.inner.connector.driver_name()
    }

    /// Open a new raw connection.
    #[tracing::instrument(
        level = "debug",
        skip(self),
        fields(driver = %self.driver_name(), database = %self.config().database)
    )]
    pub fn connect(&self) -> Result<Box<dyn RawConnection>> {
        let raw = self.inner.connector.connect(&self.inner.config)?;
        tracing::debug!("Opened raw connection");
        Ok(raw)
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("driver", &self.driver_name())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Install the process-wide engine.
///
/// Fails with `AlreadyInitialized` if an engine was installed before,
/// including by a concurrent caller that won the race.
pub fn create_engine(config: EngineConfig, connector: impl Connector + 'static) -> Result<Engine> {
    init_engine(Engine::new(config, connector))
}

/// Install an already built engine as the process-wide engine.
pub fn init_engine(engine: Engine) -> Result<Engine> {
    if ENGINE.set(engine.clone()).is_err() {
        tracing::warn!("Engine is already initialized");
        return Err(EngineError::already_initialized().into());
    }

    let config = engine.config();
    tracing::info!(
        driver = %engine.driver_name(),
        host = %config.host,
        port = config.port,
        database = %config.database,
        "Initialized engine"
    );
    Ok(engine)
}

/// The process-wide engine, or `NotInitialized` before [`create_engine`].
pub fn global_engine() -> Result<Engine> {
    ENGINE
        .get()
        .cloned()
        .ok_or_else(|| EngineError::not_initialized().into())
}

/// Whether the process-wide engine has been installed.
pub fn has_engine() -> bool {
    ENGINE.get().is_some()
}
