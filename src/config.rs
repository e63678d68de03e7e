//! Configuration loading helpers.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::arena::ArenaConfig;
use crate::index::{CellIndex, CellIndexConfig};

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading config files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid value for a key.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value string.
        value: String,
    },
    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OxitrunkConfig {
    /// Index configuration.
    pub index: Option<IndexConfigSpec>,
    /// Arena configuration.
    pub arena: Option<ArenaConfigSpec>,
}

impl OxitrunkConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration from the `OXITRUNK_CONFIG` env var (if set),
    /// then apply `OXITRUNK__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let config_path = env::var("OXITRUNK_CONFIG").ok();
        let mut config = match config_path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            if !key.starts_with("OXITRUNK__") {
                continue;
            }
            let path = key["OXITRUNK__".len()..].to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim().to_string();

            match parts.as_slice() {
                ["index", "bucket_count"] => {
                    self.index_mut().bucket_count = Some(parse_value(&key, &value)?);
                }
                ["index", "entry_capacity"] => {
                    self.index_mut().entry_capacity = Some(parse_value(&key, &value)?);
                }
                ["index", "cell_type_enabled"] => {
                    self.index_mut().cell_type_enabled = Some(parse_value(&key, &value)?);
                }
                ["arena", "inline_capacity"] => {
                    self.arena_mut().inline_capacity = Some(parse_value(&key, &value)?);
                }
                ["arena", "large_object_threshold"] => {
                    self.arena_mut().large_object_threshold = Some(parse_value(&key, &value)?);
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        Ok(())
    }

    /// Build a `CellIndexConfig` using defaults plus overrides.
    pub fn to_cell_index_config(&self) -> CellIndexConfig {
        let mut config = CellIndexConfig::default();
        if let Some(index) = &self.index {
            index.apply_to(&mut config);
        }
        if let Some(arena) = &self.arena {
            arena.apply_to(&mut config.arena);
        }
        config
    }

    /// Build a cell index from this configuration.
    pub fn open_index(&self) -> Result<CellIndex, ConfigError> {
        CellIndex::new(self.to_cell_index_config())
    }

    fn index_mut(&mut self) -> &mut IndexConfigSpec {
        self.index.get_or_insert_with(IndexConfigSpec::default)
    }

    fn arena_mut(&mut self) -> &mut ArenaConfigSpec {
        self.arena.get_or_insert_with(ArenaConfigSpec::default)
    }
}

/// Index configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfigSpec {
    /// Number of buckets (power of 2).
    pub bucket_count: Option<u32>,
    /// Number of entry slots.
    pub entry_capacity: Option<u32>,
    /// Whether cells carry type tags.
    pub cell_type_enabled: Option<bool>,
}

impl IndexConfigSpec {
    fn apply_to(&self, config: &mut CellIndexConfig) {
        if let Some(value) = self.bucket_count {
            config.bucket_count = value;
        }
        if let Some(value) = self.entry_capacity {
            config.entry_capacity = value;
        }
        if let Some(value) = self.cell_type_enabled {
            config.cell_type_enabled = value;
        }
    }
}

/// Arena configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArenaConfigSpec {
    /// Inline region size in bytes.
    pub inline_capacity: Option<usize>,
    /// Size at which cells become large objects.
    pub large_object_threshold: Option<usize>,
}

impl ArenaConfigSpec {
    fn apply_to(&self, config: &mut ArenaConfig) {
        if let Some(value) = self.inline_capacity {
            config.inline_capacity = value;
        }
        if let Some(value) = self.large_object_threshold {
            config.large_object_threshold = value;
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_env_overrides_index_and_arena() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::set_var("OXITRUNK__index__bucket_count", "2048");
        env::set_var("OXITRUNK__index__cell_type_enabled", "true");
        env::set_var("OXITRUNK__arena__large_object_threshold", "65536");

        let mut config = OxitrunkConfig::default();
        let result = config.apply_env_overrides();

        env::remove_var("OXITRUNK__index__bucket_count");
        env::remove_var("OXITRUNK__index__cell_type_enabled");
        env::remove_var("OXITRUNK__arena__large_object_threshold");
        result.unwrap();

        let index = config.index.clone().unwrap();
        assert_eq!(index.bucket_count, Some(2048));
        assert_eq!(index.cell_type_enabled, Some(true));

        let resolved = config.to_cell_index_config();
        assert_eq!(resolved.bucket_count, 2048);
        assert!(resolved.cell_type_enabled);
        assert_eq!(resolved.arena.large_object_threshold, 65536);
        assert_eq!(
            resolved.arena.inline_capacity,
            ArenaConfig::default().inline_capacity
        );
    }

    #[test]
    fn test_env_override_rejects_bad_value() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::set_var("OXITRUNK__index__entry_capacity", "lots");
        let mut config = OxitrunkConfig::default();
        let result = config.apply_env_overrides();
        env::remove_var("OXITRUNK__index__entry_capacity");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_env_override_rejects_unknown_key() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::set_var("OXITRUNK__index__table_size", "1");
        let mut config = OxitrunkConfig::default();
        let result = config.apply_env_overrides();
        env::remove_var("OXITRUNK__index__table_size");

        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn test_parse_toml() {
        let config: OxitrunkConfig = toml::from_str(
            r#"
            [index]
            bucket_count = 256
            entry_capacity = 1000

            [arena]
            inline_capacity = 1048576
            "#,
        )
        .unwrap();

        let resolved = config.to_cell_index_config();
        assert_eq!(resolved.bucket_count, 256);
        assert_eq!(resolved.entry_capacity, 1000);
        assert!(!resolved.cell_type_enabled);
        assert_eq!(resolved.arena.inline_capacity, 1 << 20);
    }

    #[test]
    fn test_open_index_validates() {
        let config: OxitrunkConfig = toml::from_str(
            r#"
            [index]
            bucket_count = 100
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.open_index(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
