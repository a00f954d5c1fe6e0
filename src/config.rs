//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/regiongroup/regiongroup.toml`
//! 3. Explicit config file passed by the caller
//! 4. Environment variables: `REGIONGROUP_*` prefix

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{ZincError, ZincResult};
use crate::field::SubelementHandlingMode;

/// Settings consumed by a `Context`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Subelement handling mode given to newly created groups
    pub default_subelement_handling_mode: SubelementHandlingMode,
    /// Non-contiguous labels are scanned in full when an identifier range
    /// spans more than `index_size / identifier_range_scan_divisor`
    pub identifier_range_scan_divisor: usize,
    /// Prefix of generated names for unnamed fields
    pub temporary_field_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_subelement_handling_mode: SubelementHandlingMode::None,
            identifier_range_scan_divisor: 10,
            temporary_field_prefix: "temp".into(),
        }
    }
}

/// Raw settings for intermediate parsing (`None` → not specified, inherit).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub default_subelement_handling_mode: Option<SubelementHandlingMode>,
    pub identifier_range_scan_divisor: Option<usize>,
    pub temporary_field_prefix: Option<String>,
}

/// Get the XDG config directory for regiongroup.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "regiongroup").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("regiongroup.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> ZincResult<RawSettings> {
    let content = std::fs::read_to_string(path).map_err(|e| ZincError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ZincError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            default_subelement_handling_mode: overlay
                .default_subelement_handling_mode
                .unwrap_or(self.default_subelement_handling_mode),
            identifier_range_scan_divisor: overlay
                .identifier_range_scan_divisor
                .unwrap_or(self.identifier_range_scan_divisor),
            temporary_field_prefix: overlay
                .temporary_field_prefix
                .clone()
                .unwrap_or_else(|| self.temporary_field_prefix.clone()),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `config_file` - Optional explicit config file; it must exist if given
    pub fn load(config_file: Option<&Path>) -> ZincResult<Self> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                current = current.merge_with(&load_raw_settings(&global_path)?);
            }
        }

        if let Some(path) = config_file {
            current = current.merge_with(&load_raw_settings(path)?);
        }

        current = Self::apply_env_overrides(current)?;
        current.validate()?;
        Ok(current)
    }

    /// Defaults overlaid with a single file; no global config, no env vars.
    pub fn from_file(path: &Path) -> ZincResult<Self> {
        let settings = Self::default().merge_with(&load_raw_settings(path)?);
        settings.validate()?;
        Ok(settings)
    }

    /// Apply REGIONGROUP_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> ZincResult<Self> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("REGIONGROUP")
                .separator("__")
                .list_separator(","),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("default_subelement_handling_mode") {
            settings.default_subelement_handling_mode = val.parse()?;
        }
        if let Ok(val) = config.get_string("identifier_range_scan_divisor") {
            settings.identifier_range_scan_divisor =
                val.trim().parse().map_err(|e| ZincError::Config {
                    message: format!("identifier_range_scan_divisor '{}': {}", val, e),
                })?;
        }
        if let Ok(val) = config.get_string("temporary_field_prefix") {
            settings.temporary_field_prefix = val;
        }

        Ok(settings)
    }

    fn validate(&self) -> ZincResult<()> {
        if self.identifier_range_scan_divisor == 0 {
            return Err(ZincError::Config {
                message: "identifier_range_scan_divisor must be at least 1".into(),
            });
        }
        if self.temporary_field_prefix.is_empty() {
            return Err(ZincError::Config {
                message: "temporary_field_prefix must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn to_toml(&self) -> ZincResult<String> {
        toml::to_string_pretty(self).map_err(|e| ZincError::Config {
            message: format!("serialize settings: {}", e),
        })
    }

    /// Commented template for a new config file.
    pub fn template() -> String {
        r#"# regiongroup configuration
# Location: ~/.config/regiongroup/regiongroup.toml (global)

# Subelement handling for new groups: "none" or "full".
# With "full", adding an element to a group also adds its faces and nodes.
# default_subelement_handling_mode = "none"

# Identifier range edits scan all labels of a non-contiguous nodeset or mesh
# when the range spans more than index_size / divisor.
# identifier_range_scan_divisor = 10

# Prefix for names of unnamed fields (temp1, temp2, ...).
# temporary_field_prefix = "temp"
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ZincError {
    ZincError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_no_config_when_default_then_uses_compiled_values() {
        let settings = Settings::default();
        assert_eq!(settings.identifier_range_scan_divisor, 10);
        assert_eq!(settings.temporary_field_prefix, "temp");
        assert_eq!(
            settings.default_subelement_handling_mode,
            SubelementHandlingMode::None
        );
    }

    #[test]
    fn given_partial_overlay_when_merged_then_unspecified_values_inherited() {
        let overlay = RawSettings {
            identifier_range_scan_divisor: Some(4),
            ..RawSettings::default()
        };
        let merged = Settings::default().merge_with(&overlay);
        assert_eq!(merged.identifier_range_scan_divisor, 4);
        assert_eq!(merged.temporary_field_prefix, "temp");
    }

    #[test]
    fn given_template_when_parsed_then_yields_defaults() {
        let raw: RawSettings = toml::from_str(&Settings::template()).unwrap();
        assert_eq!(Settings::default().merge_with(&raw), Settings::default());
    }

    #[test]
    fn given_zero_divisor_when_validated_then_config_error() {
        let settings = Settings {
            identifier_range_scan_divisor: 0,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ZincError::Config { .. })));
    }
}
