use crate::core::{Result, VaultError};
use crate::sync::DEFAULT_SPIN_LIMIT;
use serde::{Deserialize, Serialize};

pub const MAX_POOL_CAPACITY: usize = 4096;

/// Vault configuration
///
/// Built with the builder methods or read from JSON. Missing JSON fields
/// take their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Name used in log events
    pub name: String,

    /// Busy-spins between scheduler yields while waiting for the action lock
    pub spin_limit: u32,

    /// Maximum number of idle transactions kept for reuse (0 disables pooling)
    pub pool_capacity: usize,

    /// Emit a DEBUG event for every mutation
    pub trace_mutations: bool,
}

impl VaultConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            spin_limit: DEFAULT_SPIN_LIMIT,
            pool_capacity: 16,
            trace_mutations: false,
        }
    }

    /// Set the vault name
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the spin limit
    pub fn spin_limit(mut self, spins: u32) -> Self {
        self.spin_limit = spins;
        self
    }

    /// Set the transaction pool capacity
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Enable or disable per-mutation tracing
    pub fn trace_mutations(mut self, enabled: bool) -> Self {
        self.trace_mutations = enabled;
        self
    }

    /// Parse from a JSON document
    ///
    /// # Examples
    ///
    /// ```
    /// # use rustvault::VaultConfig;
    /// let config = VaultConfig::from_json(r#"{ "name": "accounts", "pool_capacity": 4 }"#).unwrap();
    /// assert_eq!(config.name, "accounts");
    /// assert_eq!(config.pool_capacity, 4);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| VaultError::Config(e.to_string()))?;
        config.validate().map_err(VaultError::Config)?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| VaultError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name cannot be empty".to_string());
        }

        if self.pool_capacity > MAX_POOL_CAPACITY {
            return Err(format!(
                "pool_capacity cannot exceed {}",
                MAX_POOL_CAPACITY
            ));
        }

        Ok(())
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self::new("vault")
    }
}
