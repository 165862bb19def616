use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::projection::MapLevels;
use crate::source::{AuthorizationFlag, SimulatedSource, SourceHandle};
use crate::tracker::TrackerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tracker: TrackerSettings,
    #[serde(default)]
    pub map: MapLevels,
    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Insert the demo track when the store starts out empty
    #[serde(default)]
    pub seed_when_empty: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            seed_when_empty: false,
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("track-o-mat.db")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Simulated,
    Manual,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    /// Initial location permission
    #[serde(default = "default_authorized")]
    pub authorized: bool,
    /// "lat, lon" the simulated walk starts from
    #[serde(default = "default_start")]
    pub start: String,
    /// "dlat, dlon" per sample
    #[serde(default = "default_step")]
    pub step: String,
    #[serde(default = "default_accuracy")]
    pub accuracy_m: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            authorized: default_authorized(),
            start: default_start(),
            step: default_step(),
            accuracy_m: default_accuracy(),
        }
    }
}

fn default_authorized() -> bool {
    true
}

fn default_start() -> String {
    "48.856667, 2.351667".to_string()
}

fn default_step() -> String {
    "0.0001, 0.0001".to_string()
}

fn default_accuracy() -> f64 {
    5.0
}

impl SourceConfig {
    pub fn build(&self) -> Result<SourceHandle, ConfigError> {
        let authorization = AuthorizationFlag::new(self.authorized);
        match self.kind {
            SourceKind::Manual => Ok(SourceHandle::manual(authorization)),
            SourceKind::Simulated => {
                let start = parse_coordinates(&self.start)
                    .ok_or_else(|| ConfigError::Invalid(format!("source.start: {}", self.start)))?;
                let step = parse_coordinates(&self.step)
                    .ok_or_else(|| ConfigError::Invalid(format!("source.step: {}", self.step)))?;
                let source =
                    SimulatedSource::new(authorization.clone(), start, step, self.accuracy_m);
                Ok(SourceHandle::simulated(source, authorization))
            }
        }
    }
}

/// Parses "a, b" into a pair of floats.
pub fn parse_coordinates(s: &str) -> Option<(f64, f64)> {
    let parts: Vec<_> = s.split(',').map(|p| p.trim()).collect();
    if parts.len() != 2 {
        return None;
    }
    let a: f64 = parts[0].parse().ok()?;
    let b: f64 = parts[1].parse().ok()?;
    (a.is_finite() && b.is_finite()).then_some((a, b))
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // an empty document means all defaults
        if content.trim().is_empty() {
            return Ok(Config::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.tracker.owner_id.trim().is_empty() {
            return invalid("tracker.owner_id must not be empty".into());
        }
        if self.tracker.min_interval.is_zero() {
            return invalid("tracker.min_interval must be positive".into());
        }
        if self.tracker.fastest_interval > self.tracker.min_interval {
            return invalid(format!(
                "tracker.fastest_interval ({:?}) exceeds min_interval ({:?})",
                self.tracker.fastest_interval, self.tracker.min_interval
            ));
        }
        if self.tracker.queue_capacity == 0 {
            return invalid("tracker.queue_capacity must be at least 1".into());
        }

        if self.map.tile_size == 0 {
            return invalid("map.tile_size must be positive".into());
        }
        if self.map.min_level > self.map.max_level {
            return invalid(format!(
                "map.min_level ({}) above max_level ({})",
                self.map.min_level, self.map.max_level
            ));
        }
        self.map
            .full_size()
            .map_err(|e| ConfigError::Invalid(format!("map: {}", e)))?;

        if self.source.kind == SourceKind::Simulated {
            match parse_coordinates(&self.source.start) {
                Some((lat, lon)) if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) => {}
                _ => return invalid(format!("source.start: {}", self.source.start)),
            }
            if parse_coordinates(&self.source.step).is_none() {
                return invalid(format!("source.step: {}", self.source.step));
            }
        }

        Ok(())
    }
}
