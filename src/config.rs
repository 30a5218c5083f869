//! Configuration for palkv builders
//!
//! Centralized build options with sensible defaults.

use std::path::PathBuf;

use crate::error::{PalError, Result};

/// Default ratio of entries to slots in each partition index
pub const DEFAULT_LOAD_FACTOR: f64 = 0.75;

/// Default live-keys / values ratio below which a fresh store is compacted
pub const DEFAULT_COMPACTION_THRESHOLD: f64 = 0.7;

/// Options controlling how a store is built
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// Entries per slot, in (0, 1]. Lower values mean shorter probe chains
    /// and bigger indexes.
    pub load_factor: f64,

    /// Tolerate repeated keys (last write wins) instead of failing the build
    pub no_distinct: bool,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Minimum live-keys / values ratio for a build to be accepted as is.
    /// `0.0` disables compaction.
    pub compaction_threshold: f64,

    // -------------------------------------------------------------------------
    // Layout Configuration
    // -------------------------------------------------------------------------
    /// Opaque bytes embedded in the store (schemas, codec names, ...)
    pub metadata: Vec<u8>,

    /// Where to create the staging directory. Defaults to the destination's
    /// parent so the final rename stays on one filesystem.
    pub staging_dir: Option<PathBuf>,

    /// Build partition indexes on scoped threads
    pub parallel_build: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            load_factor: DEFAULT_LOAD_FACTOR,
            no_distinct: false,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            metadata: Vec::new(),
            staging_dir: None,
            parallel_build: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check every option, before any file is touched
    pub fn validate(&self) -> Result<()> {
        validate_load_factor(self.load_factor)?;

        if !(0.0..=1.0).contains(&self.compaction_threshold) {
            return Err(PalError::Config(format!(
                "compaction threshold must be in [0, 1], got {}",
                self.compaction_threshold
            )));
        }

        if self.metadata.len() > u32::MAX as usize {
            return Err(PalError::Config(format!(
                "metadata too large: {} bytes",
                self.metadata.len()
            )));
        }

        Ok(())
    }
}

/// Load factors must lie in (0, 1]; NaN is rejected too
pub(crate) fn validate_load_factor(load_factor: f64) -> Result<()> {
    if load_factor > 0.0 && load_factor <= 1.0 {
        Ok(())
    } else {
        Err(PalError::Config(format!(
            "load factor must be in (0, 1], got {}",
            load_factor
        )))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the index load factor
    pub fn load_factor(mut self, load_factor: f64) -> Self {
        self.config.load_factor = load_factor;
        self
    }

    /// Allow repeated keys (last write wins)
    pub fn no_distinct(mut self, no_distinct: bool) -> Self {
        self.config.no_distinct = no_distinct;
        self
    }

    /// Set the compaction threshold
    pub fn compaction_threshold(mut self, threshold: f64) -> Self {
        self.config.compaction_threshold = threshold;
        self
    }

    /// Set the opaque metadata blob
    pub fn metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.config.metadata = metadata.into();
        self
    }

    /// Set the staging directory root
    pub fn staging_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = Some(path.into());
        self
    }

    /// Enable or disable parallel partition builds
    pub fn parallel_build(mut self, parallel: bool) -> Self {
        self.config.parallel_build = parallel;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
