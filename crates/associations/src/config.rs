//! Configuration for association definition and eager-loading plans

use std::env;
use std::str::FromStr;

use crate::error::{AssociationError, AssociationResult};

const ENV_PREFIX: &str = "ELIF_ASSOCIATIONS_";

/// Registry-wide defaults applied when an association or include does not
/// say otherwise
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationConfig {
    /// Whether injected foreign keys carry REFERENCES / ON DELETE / ON UPDATE
    pub constraints: bool,
    /// Default for models that do not set `underscored` themselves
    pub underscored: bool,
    /// Maximum nesting of an include tree
    pub max_include_depth: usize,
    /// Maximum number of keys in a single IN list for key-driven fetches
    pub max_batch_size: usize,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            constraints: true,
            underscored: false,
            max_include_depth: 10,
            max_batch_size: 1000,
        }
    }
}

impl AssociationConfig {
    /// Load configuration from `ELIF_ASSOCIATIONS_*` environment variables,
    /// falling back to defaults for anything unset
    pub fn from_env() -> AssociationResult<Self> {
        let defaults = Self::default();
        let config = Self {
            constraints: read_env("CONSTRAINTS")?.unwrap_or(defaults.constraints),
            underscored: read_env("UNDERSCORED")?.unwrap_or(defaults.underscored),
            max_include_depth: read_env("MAX_INCLUDE_DEPTH")?
                .unwrap_or(defaults.max_include_depth),
            max_batch_size: read_env("MAX_BATCH_SIZE")?.unwrap_or(defaults.max_batch_size),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> AssociationResult<()> {
        if self.max_include_depth == 0 {
            return Err(AssociationError::Configuration(
                "max_include_depth must be at least 1".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(AssociationError::Configuration(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_constraints(mut self, constraints: bool) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_underscored(mut self, underscored: bool) -> Self {
        self.underscored = underscored;
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }
}

fn read_env<T: FromStr>(name: &str) -> AssociationResult<Option<T>> {
    let key = format!("{}{}", ENV_PREFIX, name);
    match env::var(&key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            AssociationError::Configuration(format!("Invalid value '{}' for {}", raw, key))
        }),
        Err(_) => Ok(None),
    }
}
