use crate::types::CalibrationStage;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::info;

/// Receives everything the pipeline wants shown to the operator
pub trait Presenter: Send + Sync {
    fn present_stage(&self, stage: CalibrationStage);

    /// Called for every sample; implementations should be cheap.
    fn present_magnitude(&self, value: f64);

    fn present_predicted_label(&self, label: &str);
}

/// Presenter that writes to the log.
///
/// Magnitudes arrive at the sampling rate, so only one per
/// `magnitude_interval` is logged.
pub struct LogPresenter {
    magnitude_interval: Duration,
    last_magnitude_log: Mutex<Option<Instant>>,
}

impl LogPresenter {
    pub fn new(magnitude_interval: Duration) -> Self {
        Self {
            magnitude_interval,
            last_magnitude_log: Mutex::new(None),
        }
    }
}

impl Default for LogPresenter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Presenter for LogPresenter {
    fn present_stage(&self, stage: CalibrationStage) {
        match stage {
            CalibrationStage::Idle => info!("Stage: idle (prediction mode)"),
            stage => info!("Stage: hold the device {} and move", stage),
        }
    }

    fn present_magnitude(&self, value: f64) {
        let mut last = self.last_magnitude_log.lock();
        let due = last.map_or(true, |t| t.elapsed() >= self.magnitude_interval);
        if due {
            info!("Magnitude: {:.3}", value);
            *last = Some(Instant::now());
        }
    }

    fn present_predicted_label(&self, label: &str) {
        info!("Predicted motion: {}", label);
    }
}
