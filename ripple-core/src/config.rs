//! Runtime configuration.
//!
//! Configuration is plain data and can be loaded from JSON:
//!
//! ```rust
//! use ripple_core::{FlushMode, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_json(r#"{ "default_flush": "post" }"#).unwrap();
//! assert_eq!(config.default_flush, FlushMode::Post);
//! assert_eq!(config.max_recursive_updates, 100);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::watch::FlushMode;

/// Settings shared by every part of one runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Count job executions per flush and stop runaway jobs.
    pub check_recursive_updates: bool,

    /// How many times one job may run within a single flush.
    pub max_recursive_updates: u32,

    /// Flush timing used by watchers that do not pick one.
    pub default_flush: FlushMode,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            check_recursive_updates: cfg!(debug_assertions),
            max_recursive_updates: 100,
            default_flush: FlushMode::Pre,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
