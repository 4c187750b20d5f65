//! # Backend Registry
//!
//! Maps a host version key to a [`WorldBackend`] factory. The host reports
//! its version once at startup, the matching factory runs once, and the
//! resulting backend is injected into the scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use strata_queue::WorldBackend;

use crate::error::{StrataError, StrataResult};

/// Builds the backend for one host version.
pub type BackendFactory = Box<dyn Fn() -> Arc<dyn WorldBackend> + Send + Sync>;

/// Host version → backend factory.
#[derive(Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut versions: Vec<&str> = self.versions().collect();
        versions.sort_unstable();
        f.debug_struct("BackendRegistry")
            .field("versions", &versions)
            .finish()
    }
}

impl BackendRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for `version`, replacing any previous one.
    #[must_use]
    pub fn with<F>(mut self, version: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn WorldBackend> + Send + Sync + 'static,
    {
        self.register(version, factory);
        self
    }

    /// Registers `factory` for `version`. Returns true if it replaced one.
    pub fn register<F>(&mut self, version: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Arc<dyn WorldBackend> + Send + Sync + 'static,
    {
        self.factories
            .insert(version.into(), Box::new(factory))
            .is_some()
    }

    /// Registered version keys.
    pub fn versions(&self) -> impl Iterator<Item = &str> + '_ {
        self.factories.keys().map(String::as_str)
    }

    /// Builds the backend for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`StrataError::UnknownHostVersion`] if nothing is registered
    /// for `version`.
    pub fn resolve(&self, version: &str) -> StrataResult<Arc<dyn WorldBackend>> {
        let factory = self
            .factories
            .get(version)
            .ok_or_else(|| StrataError::UnknownHostVersion(version.to_owned()))?;
        tracing::info!("Resolved world backend for host version {}", version);
        Ok(factory())
    }
}
