use crate::config::validation::ConfigValidator;
use crate::config::Config;
use crate::utils::errors::{GatewayError, GatewayResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Detect format from file extension, sniffing content when the extension is unknown
    pub fn detect(path: &Path, content: &str) -> Self {
        match Self::from_extension(path) {
            Some(format) => format,
            None => {
                let trimmed = content.trim_start();
                if trimmed.starts_with('{') {
                    ConfigFormat::Json
                } else if trimmed.starts_with('[') || content.contains(" = ") {
                    ConfigFormat::Toml
                } else {
                    ConfigFormat::Yaml
                }
            }
        }
    }

    fn from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Some(ConfigFormat::Json),
            Some("yml") | Some("yaml") => Some(ConfigFormat::Yaml),
            Some("toml") => Some(ConfigFormat::Toml),
            _ => None,
        }
    }

    pub fn parse(self, content: &str) -> GatewayResult<Config> {
        match self {
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| GatewayError::Config(format!("Failed to parse JSON config: {}", e))),
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| GatewayError::Config(format!("Failed to parse YAML config: {}", e))),
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| GatewayError::Config(format!("Failed to parse TOML config: {}", e))),
        }
    }

    pub fn render(self, config: &Config) -> GatewayResult<String> {
        match self {
            ConfigFormat::Json => serde_json::to_string_pretty(config)
                .map_err(|e| GatewayError::Config(format!("Failed to serialize JSON: {}", e))),
            ConfigFormat::Yaml => serde_yaml::to_string(config)
                .map_err(|e| GatewayError::Config(format!("Failed to serialize YAML: {}", e))),
            ConfigFormat::Toml => toml::to_string_pretty(config)
                .map_err(|e| GatewayError::Config(format!("Failed to serialize TOML: {}", e))),
        }
    }
}

/// Reads and validates gateway configuration files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Expand `~` in a user-supplied path
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    pub async fn load(path: impl AsRef<Path>) -> GatewayResult<Config> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::Config(format!("Failed to read config {}: {}", path.display(), e)))?;

        let format = ConfigFormat::detect(path, &content);
        debug!("Detected config format: {:?}", format);

        let config = Self::parse(&content, format)?;
        info!(
            "Loaded config from {} ({} servers)",
            path.display(),
            config.servers.len()
        );
        Ok(config)
    }

    /// Parse and validate config content
    pub fn parse(content: &str, format: ConfigFormat) -> GatewayResult<Config> {
        let config = format.parse(content)?;

        if let Err(errors) = ConfigValidator::new().validate(&config) {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(GatewayError::Config(joined));
        }

        Ok(config)
    }

    pub async fn save(path: impl AsRef<Path>, config: &Config) -> GatewayResult<()> {
        let path = path.as_ref();
        let format = ConfigFormat::from_extension(path).unwrap_or(ConfigFormat::Toml);
        let content = format.render(config)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| GatewayError::Config(format!("Failed to write config: {}", e)))
    }
}
