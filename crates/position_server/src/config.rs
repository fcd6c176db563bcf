//! Configuration management for the position server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use anyhow::{bail, Context};
use position_system::{
    encode_data_uri, mime_for_path, utils::is_data_uri, AreaConfig, Point, ProximityPolicy,
    TriggerSet,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Shared area published to every client
    pub area: AreaSettings,
    /// Trigger radius, policy and starting triggers
    pub proximity: ProximitySettings,
    /// Client attachment settings
    #[serde(default)]
    pub client: ClientSettings,
    /// Simulated players
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Area bounds and optional background image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaSettings {
    /// `[min, max]` along x
    pub x_range: Vec<f64>,
    /// `[min, max]` along y
    pub y_range: Vec<f64>,
    /// Image file (relative to the config file) or an inline `data:` URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximitySettings {
    /// Trigger radius in area units
    pub radius: f64,
    /// "last" or "nearest"
    #[serde(default = "default_policy")]
    pub policy: String,
    #[serde(default)]
    pub initial_triggers: Vec<Point>,
}

fn default_policy() -> String {
    "last".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// How long a client waits for the area before giving up
    #[serde(default = "default_attach_timeout_ms")]
    pub attach_timeout_ms: u64,
}

fn default_attach_timeout_ms() -> u64 {
    5000
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            attach_timeout_ms: default_attach_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Number of simulated clients placed at random positions
    #[serde(default)]
    pub players: usize,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            area: AreaSettings {
                x_range: vec![0.0, 1.0],
                y_range: vec![0.0, 1.0],
                background_image: None,
            },
            proximity: ProximitySettings {
                radius: 0.1,
                policy: default_policy(),
                initial_triggers: Vec::new(),
            },
            client: ClientSettings::default(),
            simulation: SimulationSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the
    /// specified path and returns the default configuration.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        validate_range("x_range", &self.area.x_range)?;
        validate_range("y_range", &self.area.y_range)?;

        if !self.proximity.radius.is_finite() || self.proximity.radius <= 0.0 {
            return Err(format!(
                "Invalid radius: {}. Must be a positive number",
                self.proximity.radius
            ));
        }
        self.policy()?;

        if let Some(trigger) = self
            .proximity
            .initial_triggers
            .iter()
            .find(|trigger| !trigger.is_finite())
        {
            return Err(format!("Invalid initial trigger: {trigger:?}"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    pub fn policy(&self) -> Result<ProximityPolicy, String> {
        self.proximity.policy.parse()
    }

    pub fn attach_timeout(&self) -> Duration {
        Duration::from_millis(self.client.attach_timeout_ms)
    }

    /// Builds the raw area options handed to the store.
    ///
    /// A background image given as a file path is read and embedded as a
    /// `data:` URI; relative paths resolve against `base_dir`.
    ///
    /// # Errors
    ///
    /// Fails if the path is not a regular file, is not an image by extension,
    /// or cannot be read.
    pub async fn to_area_options(&self, base_dir: &Path) -> anyhow::Result<Value> {
        let background_image = match &self.area.background_image {
            None => Value::Null,
            Some(image) if is_data_uri(image) => Value::String(image.clone()),
            Some(image) => {
                let path = resolve(base_dir, image);
                let metadata = tokio::fs::metadata(&path)
                    .await
                    .with_context(|| format!("reading background image {}", path.display()))?;
                if !metadata.is_file() {
                    bail!("background image {} is not a file", path.display());
                }
                let Some(mime) = mime_for_path(&path) else {
                    bail!("background image {} is not an image", path.display());
                };
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading background image {}", path.display()))?;
                info!("🖼️ Embedded background image {} ({} bytes)", path.display(), bytes.len());
                Value::String(encode_data_uri(&bytes, mime))
            }
        };

        Ok(json!({
            "xRange": self.area.x_range,
            "yRange": self.area.y_range,
            "backgroundImage": background_image,
        }))
    }

    /// Starting trigger set over the published area.
    pub fn trigger_set(&self, area: &AreaConfig) -> TriggerSet {
        TriggerSet::new(area, self.proximity.radius)
            .with_triggers(self.proximity.initial_triggers.clone())
    }
}

fn validate_range(name: &str, range: &[f64]) -> Result<(), String> {
    match range {
        [min, max] if min.is_finite() && max.is_finite() && min < max => Ok(()),
        [min, max] => Err(format!("Area {name} min must be less than max, got [{min}, {max}]")),
        _ => Err(format!(
            "Area {name} must have exactly two values, got {}",
            range.len()
        )),
    }
}

fn resolve(base_dir: &Path, file: &str) -> PathBuf {
    let path = PathBuf::from(file);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.area.x_range, vec![0.0, 1.0]);
        assert_eq!(config.area.y_range, vec![0.0, 1.0]);
        assert!(config.area.background_image.is_none());
        assert_eq!(config.proximity.radius, 0.1);
        assert_eq!(config.policy(), Ok(ProximityPolicy::LastWins));
        assert_eq!(config.attach_timeout(), Duration::from_secs(5));
        assert_eq!(config.simulation.players, 0);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[area]
x_range = [-10.0, 10.0]
y_range = [0.0, 5.0]

[proximity]
radius = 1.5
policy = "nearest"
initial_triggers = [{ x = 0.0, y = 1.0 }]

[simulation]
players = 4

[logging]
level = "debug"
json_format = true
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();

        assert_eq!(config.area.x_range, vec![-10.0, 10.0]);
        assert_eq!(config.proximity.radius, 1.5);
        assert_eq!(config.policy(), Ok(ProximityPolicy::Nearest));
        assert_eq!(config.proximity.initial_triggers, vec![Point::new(0.0, 1.0)]);
        assert_eq!(config.client.attach_timeout_ms, 5000);
        assert_eq!(config.simulation.players, 4);
        assert!(config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[area\nx_range = ").unwrap();

        assert!(AppConfig::load_from_file(temp_file.path()).await.is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.area.x_range = vec![1.0, 1.0];
        assert!(config.validate().is_err());

        config.area.x_range = vec![0.0, 1.0, 2.0];
        assert!(config.validate().is_err());

        config.area.x_range = vec![0.0, 1.0];
        config.proximity.radius = 0.0;
        assert!(config.validate().is_err());

        config.proximity.radius = f64::NAN;
        assert!(config.validate().is_err());

        config.proximity.radius = 0.2;
        config.proximity.policy = "loudest".to_string();
        assert!(config.validate().is_err());

        config.proximity.policy = "nearest".to_string();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "warn".to_string();
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_area_options_embed_background_image() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("map.png"), b"hi").await.unwrap();

        let mut config = AppConfig::default();
        config.area.background_image = Some("map.png".to_string());

        let options = config.to_area_options(dir.path()).await.unwrap();
        assert_eq!(options["backgroundImage"], "data:image/png;base64,aGk=");
        assert_eq!(options["xRange"], json!([0.0, 1.0]));

        config.area.background_image = Some("missing.png".to_string());
        assert!(config.to_area_options(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_area_options_reject_non_image_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"secret").await.unwrap();
        tokio::fs::create_dir(dir.path().join("tiles.png")).await.unwrap();

        let mut config = AppConfig::default();
        config.area.background_image = Some("notes.txt".to_string());
        let error = config.to_area_options(dir.path()).await.unwrap_err();
        assert!(error.to_string().contains("is not an image"));

        config.area.background_image = Some("tiles.png".to_string());
        let error = config.to_area_options(dir.path()).await.unwrap_err();
        assert!(error.to_string().contains("is not a file"));
    }

    #[tokio::test]
    async fn test_area_options_pass_through_data_uri() {
        let mut config = AppConfig::default();
        config.area.background_image = Some("data:image/gif;base64,R0lG".to_string());

        let options = config.to_area_options(Path::new(".")).await.unwrap();
        assert_eq!(options["backgroundImage"], "data:image/gif;base64,R0lG");
        assert!(position_system::schema::validate_area_options(&options).is_ok());
    }

    #[test]
    fn test_trigger_set_uses_radius_and_initial_triggers() {
        let mut config = AppConfig::default();
        config.proximity.initial_triggers = vec![Point::new(0.5, 0.5)];

        let trigger_set = config.trigger_set(&AreaConfig::default());
        assert_eq!(trigger_set.radius, 0.1);
        assert_eq!(trigger_set.triggers, vec![Point::new(0.5, 0.5)]);
    }
}
