//! Configuration system.
//!
//! Loads loader configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

/// Root configuration for content loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundryConfig {
    /// Directory the module packs live in.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Pack loaded first, at module index 0.
    #[serde(default = "default_base_module")]
    pub base_module: String,
    /// Instances built per preset pool refill.
    #[serde(default = "default_pool_refill_batch")]
    pub pool_refill_batch: usize,
}

fn default_data_dir() -> String {
    "Data".to_string()
}

fn default_base_module() -> String {
    "Base.pack".to_string()
}

fn default_pool_refill_batch() -> usize {
    10
}

impl Default for FoundryConfig {
    fn default() -> Self {
        FoundryConfig {
            data_dir: default_data_dir(),
            base_module: default_base_module(),
            pool_refill_batch: default_pool_refill_batch(),
        }
    }
}

impl FoundryConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg = FoundryConfig::from_json_str("{\"base_module\": \"Core.pack\"}").unwrap();
        assert_eq!(cfg.base_module, "Core.pack");
        assert_eq!(cfg.data_dir, "Data");
        assert_eq!(cfg.pool_refill_batch, 10);
    }

    #[test]
    fn empty_object_parses_to_defaults() {
        let cfg = FoundryConfig::from_json_str("{}").unwrap();
        let def = FoundryConfig::default();
        assert_eq!(cfg.data_dir, def.data_dir);
        assert_eq!(cfg.base_module, def.base_module);
    }
}
