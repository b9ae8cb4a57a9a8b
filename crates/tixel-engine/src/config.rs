//! Simulation configuration.
//!
//! [`SimConfig`] is plain data that can be built in code or loaded from JSON.
//! Nothing is coerced: [`SimConfig::validate`] rejects any out-of-range value
//! and [`Simulation::new`](crate::sim::Simulation::new) refuses to start with
//! an invalid configuration.

use std::path::Path;
use std::time::Duration;

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Configuration errors. All are raised at construction time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("tick_rate must be positive and finite, got {0}")]
    InvalidTickRate(f64),

    #[error("frame_rate must be positive and finite, got {0}")]
    InvalidFrameRate(f64),

    #[error("elasticity must be within [0, 1], got {0}")]
    InvalidElasticity(f64),

    #[error("cell size must be positive and finite on both axes, got {0}")]
    InvalidCellSize(DVec2),

    #[error("max_backlog must be positive and finite, got {0}")]
    InvalidBacklog(f64),

    #[error("axis_scale must be finite on both axes, got {0}")]
    InvalidAxisScale(DVec2),

    #[error("resolution must be non-zero, got {0}x{1}")]
    InvalidResolution(u32, u32),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Recognised configuration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Render target size in console cells. Passed through to the renderer.
    pub resolution: (u32, u32),
    /// Fixed simulation steps per second.
    pub tick_rate: f64,
    /// Render frames per second (frame limiter target).
    pub frame_rate: f64,
    /// Restitution used for every contact, 0 = inelastic, 1 = elastic.
    pub elasticity: f64,
    /// Spatial grid cell dimensions. Roughly the largest expected hitbox.
    pub cell_size: DVec2,
    /// Maximum simulated time (seconds) carried in the step accumulator.
    pub max_backlog: f64,
    /// Per-axis multiplier on displacement. Console cells are usually taller
    /// than wide, so games often halve vertical motion.
    pub axis_scale: DVec2,
    /// Headless mode: no frame limiting, renderer is still called.
    pub headless: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            resolution: (80, 24),
            tick_rate: 60.0,
            frame_rate: 30.0,
            elasticity: 0.8,
            cell_size: DVec2::new(3.0, 3.0),
            max_backlog: 0.2,
            axis_scale: DVec2::ONE,
            headless: false,
        }
    }
}

impl SimConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_rate > 0.0 && self.tick_rate.is_finite()) {
            return Err(ConfigError::InvalidTickRate(self.tick_rate));
        }
        if !(self.frame_rate > 0.0 && self.frame_rate.is_finite()) {
            return Err(ConfigError::InvalidFrameRate(self.frame_rate));
        }
        if !(0.0..=1.0).contains(&self.elasticity) {
            return Err(ConfigError::InvalidElasticity(self.elasticity));
        }
        let c = self.cell_size;
        if !(c.x > 0.0 && c.y > 0.0 && c.is_finite()) {
            return Err(ConfigError::InvalidCellSize(c));
        }
        if !(self.max_backlog > 0.0 && self.max_backlog.is_finite()) {
            return Err(ConfigError::InvalidBacklog(self.max_backlog));
        }
        if !self.axis_scale.is_finite() {
            return Err(ConfigError::InvalidAxisScale(self.axis_scale));
        }
        if self.resolution.0 == 0 || self.resolution.1 == 0 {
            return Err(ConfigError::InvalidResolution(
                self.resolution.0,
                self.resolution.1,
            ));
        }
        Ok(())
    }

    /// Seconds per fixed step.
    pub fn fixed_dt(&self) -> f64 {
        1.0 / self.tick_rate
    }

    /// Target wall-clock duration of one render frame.
    pub fn frame_budget(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
