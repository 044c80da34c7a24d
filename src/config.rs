//! Configuration loaded from a TOML file

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::capture::DEFAULT_CAPTURE_FIFO;
use crate::constants::{DEFAULT_HOST, DEFAULT_PORT};
use crate::error::{Error, Result};
use crate::protocol::ModulationType;

const CONFIG_FILE: &str = "radio.toml";

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on, blank for all
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    pub modulation: ModulationType,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            modulation: ModulationType::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture device name, default device when unset
    pub input_device: Option<String>,
    /// Playback device name, default device when unset
    pub output_device: Option<String>,
    /// Samples buffered between the device callback and the stream
    pub fifo_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            fifo_capacity: DEFAULT_CAPTURE_FIFO,
        }
    }
}

impl AppConfig {
    /// Platform config location, e.g. `~/.config/radio-streamer/radio.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "radio-streamer").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load from `path`, or from [`default_path`](Self::default_path).
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::parse(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.client.host, DEFAULT_HOST);
        assert_eq!(config.client.modulation, ModulationType::None);
        assert!(config.audio.input_device.is_none());
    }

    #[test]
    fn test_partial_file() {
        let config = AppConfig::parse(
            r#"
            [client]
            name = "alice"
            modulation = "am-sc"

            [audio]
            fifo_capacity = 4096
            "#,
        )
        .unwrap();

        assert_eq!(config.client.name.as_deref(), Some("alice"));
        assert_eq!(config.client.modulation, ModulationType::AmSc);
        assert_eq!(config.client.port, DEFAULT_PORT);
        assert_eq!(config.audio.fifo_capacity, 4096);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_invalid_file() {
        assert!(matches!(AppConfig::parse("[server]\nport = 99999\n"), Err(Error::Config(_))));
        assert!(matches!(AppConfig::parse("[client]\nmodulation = \"fm\"\n"), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nhost = \"0.0.0.0\"\nport = 40000").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 40000);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = AppConfig::default();
        config.client.name = Some("bob".to_string());
        config.audio.output_device = Some("Speakers".to_string());

        let text = config.to_toml().unwrap();
        assert_eq!(AppConfig::parse(&text).unwrap(), config);
    }
}
