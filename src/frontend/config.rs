use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub host: RuntimeConfig,

    #[serde(default)]
    pub guest: RuntimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Dead slots are swept after this many proxy creations
    #[serde(default = "default_sweep_threshold")]
    pub sweep_threshold: usize,

    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Deepest aggregate nesting converted by value
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_threshold: default_sweep_threshold(),
            initial_capacity: default_initial_capacity(),
        }
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self { max_depth: default_max_depth() }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { max_call_depth: default_max_call_depth() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_level(), json: false }
    }
}

fn default_sweep_threshold() -> usize { 256 }
fn default_initial_capacity() -> usize { 64 }
fn default_max_depth() -> usize { 64 }
fn default_max_call_depth() -> usize { 150 }
fn default_level() -> String { "warn".to_string() }

impl BridgeConfig {
    /// Load configuration from a .crossbindrc file
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Find and load configuration file from current directory or parents
    pub fn discover() -> Self {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Self::default(),
        }
    }

    pub fn discover_from(start: &Path) -> Self {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            for name in [".crossbindrc", ".crossbindrc.toml"] {
                let config_path = dir.join(name);
                if config_path.exists() {
                    if let Ok(config) = Self::load(&config_path) {
                        return config;
                    }
                }
            }

            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.conversion.max_depth, 64);
        assert_eq!(config.host.max_call_depth, 150);
        assert_eq!(config.registry.sweep_threshold, 256);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[registry]
sweep_threshold = 8

[guest]
max_call_depth = 40
"#;

        let config = BridgeConfig::parse(toml).unwrap();
        assert_eq!(config.registry.sweep_threshold, 8);
        assert_eq!(config.registry.initial_capacity, 64);
        assert_eq!(config.guest.max_call_depth, 40);
        assert_eq!(config.host.max_call_depth, 150);
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        let err = BridgeConfig::parse("[conversion]\nmax_depth = \"deep\"\n").unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn test_generated_default_parses_back() {
        let text = BridgeConfig::generate_default();
        assert_eq!(BridgeConfig::parse(&text).unwrap(), BridgeConfig::default());
    }
}
