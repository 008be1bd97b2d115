use serde::{Deserialize, Serialize};

/// World-wide simulation settings. Shared by every client of the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WorldSettings {
    /// When set, simulated time only advances on an explicit tick.
    pub synchronous_mode: bool,
    /// Simulated seconds per tick. `None` means variable timestep.
    pub fixed_delta_seconds: Option<f64>,
    pub no_rendering_mode: bool,
}

/// Weather either by simulator preset name or as explicit parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Weather {
    Preset(String),
    Parameters(WeatherParameters),
}

/// Explicit weather parameters. Percentages are 0..=100, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherParameters {
    pub cloudiness: f32,
    pub precipitation: f32,
    pub precipitation_deposits: f32,
    pub wind_intensity: f32,
    pub sun_azimuth_angle: f32,
    pub sun_altitude_angle: f32,
    pub fog_density: f32,
    pub wetness: f32,
}

impl Default for WeatherParameters {
    fn default() -> Self {
        Self {
            cloudiness: 0.0,
            precipitation: 0.0,
            precipitation_deposits: 0.0,
            wind_intensity: 0.0,
            sun_azimuth_angle: 0.0,
            sun_altitude_angle: 75.0,
            fog_density: 0.0,
            wetness: 0.0,
        }
    }
}

impl WeatherParameters {
    /// Look up one of the standard presets by name.
    pub fn preset(name: &str) -> Option<Self> {
        let base = Self::default();
        let params = match name {
            "ClearNoon" => base,
            "CloudyNoon" => Self {
                cloudiness: 60.0,
                ..base
            },
            "WetNoon" => Self {
                precipitation_deposits: 50.0,
                wetness: 50.0,
                ..base
            },
            "HardRainNoon" => Self {
                cloudiness: 100.0,
                precipitation: 100.0,
                precipitation_deposits: 90.0,
                wind_intensity: 100.0,
                wetness: 100.0,
                ..base
            },
            "ClearSunset" => Self {
                sun_altitude_angle: 15.0,
                ..base
            },
            "ClearNight" => Self {
                sun_altitude_angle: -90.0,
                ..base
            },
            _ => return None,
        };
        Some(params)
    }
}
