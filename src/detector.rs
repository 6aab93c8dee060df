// Threshold detector for large-motion events

use crate::types::{PipelineError, PipelineResult, Sample};

pub const DEFAULT_THRESHOLD: f64 = 0.1;

/// Outcome of evaluating one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub magnitude: f64,
    /// A debounced confirmation should be scheduled
    pub trigger: bool,
}

/// Decides whether a sample starts a large-motion event.
///
/// The detector only evaluates. It does not deduplicate triggers; the
/// admission gate passed to [`EventDetector::evaluate`] is the only thing
/// that keeps one crossing from producing several confirmations.
#[derive(Debug, Clone)]
pub struct EventDetector {
    threshold: f64,
    last_magnitude: f64,
}

impl EventDetector {
    pub fn new(threshold: f64) -> PipelineResult<Self> {
        let mut detector = Self {
            threshold: DEFAULT_THRESHOLD,
            last_magnitude: 0.0,
        };
        detector.set_threshold(threshold)?;
        Ok(detector)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Takes effect on the next evaluation.
    pub fn set_threshold(&mut self, threshold: f64) -> PipelineResult<()> {
        if !threshold.is_finite() {
            return Err(PipelineError::InvalidThreshold(threshold));
        }
        self.threshold = threshold;
        Ok(())
    }

    /// Magnitude of the last evaluated sample (display only)
    pub fn last_magnitude(&self) -> f64 {
        self.last_magnitude
    }

    pub fn evaluate(&mut self, sample: &Sample, gate_open: bool) -> Detection {
        let magnitude = sample.magnitude();
        self.last_magnitude = magnitude;

        // NaN compares false, but an infinite reading must not fire either.
        let trigger = gate_open && magnitude.is_finite() && magnitude > self.threshold;

        Detection { magnitude, trigger }
    }
}

impl Default for EventDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            last_magnitude: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triggers_above_threshold_when_gate_open() {
        let mut detector = EventDetector::new(0.5).unwrap();

        let below = detector.evaluate(&Sample::new(0.1, 0.1, 0.1), true);
        assert!(!below.trigger);

        let above = detector.evaluate(&Sample::new(0.3, -0.3, 0.0), true);
        assert!(above.trigger);
        assert_eq!(above.magnitude, 0.6);
    }

    #[test]
    fn test_equal_to_threshold_does_not_trigger() {
        let mut detector = EventDetector::new(1.0).unwrap();
        assert!(!detector.evaluate(&Sample::new(1.0, 0.0, 0.0), true).trigger);
    }

    #[test]
    fn test_closed_gate_never_triggers() {
        let mut detector = EventDetector::default();
        let detection = detector.evaluate(&Sample::new(100.0, 100.0, 100.0), false);
        assert!(!detection.trigger);
        assert_eq!(detector.last_magnitude(), 300.0);
    }

    #[test]
    fn test_non_finite_magnitude_is_no_event() {
        let mut detector = EventDetector::default();
        assert!(!detector.evaluate(&Sample::new(f64::NAN, 0.0, 0.0), true).trigger);
        assert!(!detector.evaluate(&Sample::new(f64::INFINITY, 0.0, 0.0), true).trigger);
    }

    #[test]
    fn test_threshold_change_applies_to_next_sample() {
        let mut detector = EventDetector::default();
        let sample = Sample::new(0.2, 0.0, 0.0);
        assert!(detector.evaluate(&sample, true).trigger);

        detector.set_threshold(0.5).unwrap();
        assert!(!detector.evaluate(&sample, true).trigger);

        detector.set_threshold(-1.0).unwrap();
        assert!(detector.evaluate(&Sample::ZERO, true).trigger);
    }

    #[test]
    fn test_rejects_non_finite_threshold() {
        let mut detector = EventDetector::default();
        assert!(matches!(
            detector.set_threshold(f64::NAN),
            Err(PipelineError::InvalidThreshold(_))
        ));
        assert!(EventDetector::new(f64::INFINITY).is_err());
        assert_eq!(detector.threshold(), DEFAULT_THRESHOLD);
    }
}
