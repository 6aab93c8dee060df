// Common types for the motion pipeline

use crate::config::ConfigError;
use crate::source::SourceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while driving the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No tokio runtime available to schedule timers")]
    NoRuntime,

    #[error("Invalid threshold: {0} (must be finite)")]
    InvalidThreshold(f64),

    #[error("Calibration already in progress (stage: {0})")]
    AlreadyCalibrating(CalibrationStage),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Controller already running")]
    AlreadyRunning,

    #[error("Motion source error: {0}")]
    Source(#[from] SourceError),
}

/// One reading of the 3-axis motion signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Sample {
    pub const ZERO: Sample = Sample {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// L1 norm of the three axes.
    pub fn magnitude(&self) -> f64 {
        self.x.abs() + self.y.abs() + self.z.abs()
    }
}

/// Position in the calibration cycle.
///
/// `Idle` is both the initial state and the "not calibrating" state the
/// cycle returns to after `Left`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStage {
    #[default]
    Idle,
    Up,
    Right,
    Down,
    Left,
}

impl CalibrationStage {
    pub const CYCLE: [CalibrationStage; 5] = [
        CalibrationStage::Idle,
        CalibrationStage::Up,
        CalibrationStage::Right,
        CalibrationStage::Down,
        CalibrationStage::Left,
    ];

    /// Next stage in cyclic order
    pub fn next(self) -> Self {
        match self {
            CalibrationStage::Idle => CalibrationStage::Up,
            CalibrationStage::Up => CalibrationStage::Right,
            CalibrationStage::Right => CalibrationStage::Down,
            CalibrationStage::Down => CalibrationStage::Left,
            CalibrationStage::Left => CalibrationStage::Idle,
        }
    }

    pub fn is_calibrating(self) -> bool {
        self != CalibrationStage::Idle
    }

    /// Label attached to samples captured during this stage.
    pub fn label(self) -> Option<&'static str> {
        match self {
            CalibrationStage::Idle => None,
            CalibrationStage::Up => Some("up"),
            CalibrationStage::Right => Some("right"),
            CalibrationStage::Down => Some("down"),
            CalibrationStage::Left => Some("left"),
        }
    }
}

impl fmt::Display for CalibrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationStage::Idle => write!(f, "idle"),
            CalibrationStage::Up => write!(f, "up"),
            CalibrationStage::Right => write!(f, "right"),
            CalibrationStage::Down => write!(f, "down"),
            CalibrationStage::Left => write!(f, "left"),
        }
    }
}

/// Point-in-time view of the pipeline's shared flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub is_calibrating: bool,
    pub is_waiting_for_motion_data: bool,
    pub stage: CalibrationStage,
    pub threshold: f64,
    /// Display-only magnitude of the most recent sample
    pub magnitude: f64,
}

/// Counters for a pipeline session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub samples_received: u64,
    pub events_fired: u64,
    pub labeled_sent: u64,
    pub unlabeled_sent: u64,
    pub send_failures: u64,
    pub predictions_received: u64,
    pub predictions_ignored: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_is_l1_norm() {
        let sample = Sample::new(-0.5, 0.25, -1.0);
        assert_eq!(sample.magnitude(), 1.75);
        assert_eq!(Sample::ZERO.magnitude(), 0.0);
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(CalibrationStage::Idle.label(), None);
        let labels: Vec<_> = CalibrationStage::CYCLE[1..]
            .iter()
            .filter_map(|s| s.label())
            .collect();
        assert_eq!(labels, vec!["up", "right", "down", "left"]);
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&CalibrationStage::Right).unwrap();
        assert_eq!(json, "\"right\"");
        let stage: CalibrationStage = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(stage, CalibrationStage::Left);
    }
}
