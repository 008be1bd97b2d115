use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simlink_client::{Endpoint, Weather};

/// Timesteps above this make the simulator's physics substepping unreliable.
const RECOMMENDED_MAX_TIMESTEP: f64 = 0.1;

/// Errors from loading or validating a session configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("timestep must be a positive number of seconds, got {0}")]
    InvalidTimestep(f64),
    #[error("timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),
    #[error("map name is empty")]
    EmptyMapName,
    #[error("display size must be non-zero, got {0}x{1}")]
    InvalidDisplay(u32, u32),
}

/// Which world the session loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapSource {
    /// A map already installed on the simulator.
    Name(String),
    /// Path to an OpenDRIVE file whose contents are streamed to the simulator.
    Track(PathBuf),
}

impl MapSource {
    pub fn label(&self) -> String {
        match self {
            Self::Name(name) => name.clone(),
            Self::Track(path) => path.display().to_string(),
        }
    }
}

/// Where the presentation camera is mounted on the primary entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraMount {
    /// Behind and above, looking slightly down.
    #[default]
    Chase,
    /// On the hood, looking forward.
    Hood,
}

/// Everything needed to open a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub address: String,
    pub port: u16,
    pub timeout_secs: f64,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub map: MapSource,
    /// Simulated seconds per tick.
    pub timestep: f64,
    pub weather: Option<Weather>,
    /// Attach a camera to the primary entity and present a frame every step.
    pub render: bool,
    /// Write presented frames to `record_dir`. Only meaningful with `render`.
    pub record: bool,
    pub record_dir: PathBuf,
    /// Presentation surface size in pixels.
    pub display: [u32; 2],
    pub camera: CameraMount,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: 2000,
            timeout_secs: 10.0,
            map: MapSource::Name("Town01".into()),
            timestep: 0.1,
            weather: None,
            render: false,
            record: false,
            record_dir: PathBuf::from("recording"),
            display: [1280, 720],
            camera: CameraMount::Chase,
        }
    }
}

impl SessionConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json` file, or YAML for any other extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&text)?
        } else {
            serde_yaml::from_str(&text)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.timestep.is_finite() || self.timestep <= 0.0 {
            return Err(ConfigError::InvalidTimestep(self.timestep));
        }
        if self.timeout_secs <= 0.0 || Duration::try_from_secs_f64(self.timeout_secs).is_err() {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }
        if let MapSource::Name(name) = &self.map {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyMapName);
            }
        }
        let [width, height] = self.display;
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidDisplay(width, height));
        }
        if self.timestep > RECOMMENDED_MAX_TIMESTEP {
            tracing::warn!(
                timestep = self.timestep,
                "timestep above {RECOMMENDED_MAX_TIMESTEP}s, physics may become unstable"
            );
        }
        if self.record && !self.render {
            tracing::warn!("record requested without render; no frames will be written");
        }
        Ok(())
    }

    /// Connection timeout. Out-of-range values, which `validate` rejects,
    /// saturate to `Duration::MAX`.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::MAX)
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            address: self.address.clone(),
            port: self.port,
            timeout: self.timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simlink_client::WeatherParameters;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.port, 2000);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(!config.render);
    }

    #[test]
    fn yaml_with_named_map_and_preset_weather() {
        let config = SessionConfig::from_yaml_str(
            "address: 10.0.0.5\nport: 3000\nmap:\n  name: Town05\ntimestep: 0.05\nweather: ClearSunset\n",
        )
        .unwrap();
        assert_eq!(config.address, "10.0.0.5");
        assert_eq!(config.port, 3000);
        assert_eq!(config.map, MapSource::Name("Town05".into()));
        assert_eq!(config.timestep, 0.05);
        assert_eq!(config.weather, Some(Weather::Preset("ClearSunset".into())));
    }

    #[test]
    fn yaml_with_track_and_weather_parameters() {
        let config = SessionConfig::from_yaml_str(
            "map:\n  track: maps/loop.xodr\nweather:\n  cloudiness: 80.0\n  fog_density: 10.0\ncamera: hood\n",
        )
        .unwrap();
        assert_eq!(config.map, MapSource::Track(PathBuf::from("maps/loop.xodr")));
        assert_eq!(config.camera, CameraMount::Hood);
        match config.weather {
            Some(Weather::Parameters(WeatherParameters {
                cloudiness,
                fog_density,
                ..
            })) => {
                assert_eq!(cloudiness, 80.0);
                assert_eq!(fog_density, 10.0);
            }
            other => panic!("expected weather parameters, got {other:?}"),
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            SessionConfig::from_yaml_str("hostname: localhost\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn non_positive_timestep_is_rejected() {
        assert!(matches!(
            SessionConfig::from_yaml_str("timestep: 0.0\n"),
            Err(ConfigError::InvalidTimestep(_))
        ));
        assert!(matches!(
            SessionConfig::from_yaml_str("timestep: -0.1\n"),
            Err(ConfigError::InvalidTimestep(_))
        ));
    }

    #[test]
    fn large_timestep_only_warns() {
        let config = SessionConfig::from_yaml_str("timestep: 0.5\n").unwrap();
        assert_eq!(config.timestep, 0.5);
    }

    #[test]
    fn empty_map_name_is_rejected() {
        assert!(matches!(
            SessionConfig::from_yaml_str("map:\n  name: \"  \"\n"),
            Err(ConfigError::EmptyMapName)
        ));
    }

    #[test]
    fn zero_timeout_and_display_are_rejected() {
        assert!(matches!(
            SessionConfig::from_yaml_str("timeout_secs: 0\n"),
            Err(ConfigError::InvalidTimeout(_))
        ));
        assert!(matches!(
            SessionConfig::from_yaml_str("display: [0, 720]\n"),
            Err(ConfigError::InvalidDisplay(0, 720))
        ));
    }

    #[test]
    fn timeout_beyond_duration_range_is_rejected() {
        assert!(matches!(
            SessionConfig::from_yaml_str("timeout_secs: 1.0e30\n"),
            Err(ConfigError::InvalidTimeout(_))
        ));
        let config = SessionConfig {
            timeout_secs: 1e30,
            ..SessionConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout(_))));
        assert_eq!(config.timeout(), Duration::MAX);
    }

    #[test]
    fn from_path_reads_json_and_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("session.json");
        std::fs::write(&json, r#"{"port": 2010, "render": true}"#).unwrap();
        let config = SessionConfig::from_path(&json).unwrap();
        assert_eq!(config.port, 2010);
        assert!(config.render);

        let yaml = dir.path().join("session.yaml");
        std::fs::write(&yaml, "port: 2020\n").unwrap();
        assert_eq!(SessionConfig::from_path(&yaml).unwrap().port, 2020);

        assert!(matches!(
            SessionConfig::from_path(dir.path().join("missing.yaml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
