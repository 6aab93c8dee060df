// Five-stage calibration sequence: Idle -> Up -> Right -> Down -> Left -> Idle

use crate::types::{CalibrationStage, PipelineError, PipelineResult};
use std::time::Duration;

pub const DEFAULT_STAGE_ARM_DELAY: Duration = Duration::from_secs(1);

/// A stage change and the work it requires from the caller.
///
/// Every transition, including the one back into `Idle`, asks for the
/// admission gate to be re-armed after `arm_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTransition {
    pub from: CalibrationStage,
    pub to: CalibrationStage,
    pub arm_after: Duration,
}

impl StageTransition {
    pub fn is_calibrating(&self) -> bool {
        self.to.is_calibrating()
    }

    /// The transition closed a calibration run
    pub fn completes_cycle(&self) -> bool {
        self.to == CalibrationStage::Idle
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationStateMachine {
    stage: CalibrationStage,
    arm_delay: Duration,
    cycles_completed: u64,
}

impl CalibrationStateMachine {
    pub fn new(arm_delay: Duration) -> Self {
        Self {
            stage: CalibrationStage::Idle,
            arm_delay,
            cycles_completed: 0,
        }
    }

    pub fn stage(&self) -> CalibrationStage {
        self.stage
    }

    pub fn is_calibrating(&self) -> bool {
        self.stage.is_calibrating()
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Move to the next stage in cyclic order
    pub fn advance(&mut self) -> StageTransition {
        let from = self.stage;
        self.stage = from.next();
        if self.stage == CalibrationStage::Idle {
            self.cycles_completed += 1;
        }

        StageTransition {
            from,
            to: self.stage,
            arm_after: self.arm_delay,
        }
    }

    /// Begin a calibration run. Only valid from `Idle`.
    pub fn start(&mut self) -> PipelineResult<StageTransition> {
        if self.stage.is_calibrating() {
            return Err(PipelineError::AlreadyCalibrating(self.stage));
        }
        Ok(self.advance())
    }
}

impl Default for CalibrationStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_STAGE_ARM_DELAY)
    }
}
