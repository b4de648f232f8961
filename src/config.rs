use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

fn default_code_theme() -> String {
    "base16-ocean.dark".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub window: WindowConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeminiConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RenderConfig {
    /// Name of a syntect default theme used for fenced code.
    #[serde(default = "default_code_theme")]
    pub code_theme: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            code_theme: default_code_theme(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gemini: GeminiConfig {
                endpoint: DEFAULT_ENDPOINT.to_string(),
                api_key: None,
            },
            window: WindowConfig {
                width: 1100,
                height: 760,
                min_width: 640,
                min_height: 420,
            },
            render: RenderConfig::default(),
        }
    }
}

impl Config {
    /// Loads the config file, falling back to defaults when it is missing or broken.
    /// Environment overrides are applied on top either way.
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        let mut config = if config_path.exists() {
            match Self::read_from(&config_path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("{:#}. Using defaults.", e);
                    Config::default()
                }
            }
        } else {
            // Create config directory if it doesn't exist
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            Config::default()
        };

        config.apply_env_overrides(
            std::env::var("GEMCHAT_ENDPOINT").ok(),
            std::env::var("GEMINI_API_KEY").ok(),
        );
        config
    }

    fn read_from(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Error reading {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Error parsing {}", path.display()))
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self, endpoint: Option<String>, api_key: Option<String>) {
        if let Some(endpoint) = endpoint.filter(|v| !v.trim().is_empty()) {
            self.gemini.endpoint = endpoint;
        }
        if let Some(key) = api_key.filter(|v| !v.trim().is_empty()) {
            self.gemini.api_key = Some(key);
        }
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/gemchat")
        } else {
            PathBuf::from(".")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::parse(
            r#"
[gemini]
endpoint = "http://localhost:9000/generate"

[window]
width = 800
height = 600
min_width = 400
min_height = 300
"#,
        )
        .unwrap();

        assert_eq!(config.gemini.endpoint, "http://localhost:9000/generate");
        assert_eq!(config.gemini.api_key, None);
        assert_eq!(config.render.code_theme, "base16-ocean.dark");
        assert_eq!(config.window.width, 800);
    }

    #[test]
    fn test_parse_rejects_missing_section() {
        assert!(Config::parse("[gemini]\nendpoint = \"x\"\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(Some("http://example.test/gen".into()), Some("secret".into()));
        assert_eq!(config.gemini.endpoint, "http://example.test/gen");
        assert_eq!(config.gemini.api_key.as_deref(), Some("secret"));

        let mut config = Config::default();
        config.apply_env_overrides(Some("  ".into()), None);
        assert_eq!(config.gemini.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.gemini.api_key, None);
    }
}
