// Pipeline coordinator - wires history, detection and calibration together
//
// Two timing domains meet here:
// - the sampling domain calls `on_sample` at the source rate
// - the timer domain runs debounce, cooldown and stage-arm callbacks
//
// Every piece of mutable state (history buffer, detector, state machine,
// admission gate, timer slots) sits behind one `parking_lot::Mutex`. Timer
// callbacks re-enter through the same lock and confirm their id against
// the slot before acting, so a superseded timer is inert even if it already
// woke up. Sends to the data sink and presenter calls happen outside the
// lock.

use crate::buffer::CircularHistoryBuffer;
use crate::calibration::{CalibrationStateMachine, StageTransition};
use crate::config::PipelineConfig;
use crate::detector::EventDetector;
use crate::presenter::Presenter;
use crate::sink::{DataSink, Prediction, SinkResult};
use crate::timer::{TimerId, TimerKind, TimerSlot};
use crate::types::{
    CalibrationStage, PipelineError, PipelineResult, PipelineState, PipelineStats, Sample,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

struct Shared {
    buffer: CircularHistoryBuffer,
    detector: EventDetector,
    machine: CalibrationStateMachine,
    /// Admission gate: a crossing is only considered while this is set
    waiting_for_motion_data: bool,
    debounce: TimerSlot,
    /// Stage-arm delay and prediction cooldown share a slot; whichever was
    /// scheduled last is the one that re-opens the gate.
    rearm: TimerSlot,
}

#[derive(Default)]
struct Counters {
    samples_received: AtomicU64,
    events_fired: AtomicU64,
    labeled_sent: AtomicU64,
    unlabeled_sent: AtomicU64,
    send_failures: AtomicU64,
    predictions_received: AtomicU64,
    predictions_ignored: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            events_fired: self.events_fired.load(Ordering::Relaxed),
            labeled_sent: self.labeled_sent.load(Ordering::Relaxed),
            unlabeled_sent: self.unlabeled_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            predictions_received: self.predictions_received.load(Ordering::Relaxed),
            predictions_ignored: self.predictions_ignored.load(Ordering::Relaxed),
        }
    }
}

/// What a confirmed event turned into
enum FireAction {
    Labeled {
        vector: Vec<f64>,
        label: &'static str,
        transition: StageTransition,
    },
    Unlabeled {
        vector: Vec<f64>,
    },
}

pub struct Pipeline {
    config: PipelineConfig,
    runtime: Handle,
    shared: Mutex<Shared>,
    sink: Arc<dyn DataSink>,
    presenter: Arc<dyn Presenter>,
    counters: Arc<Counters>,
    weak_self: Weak<Pipeline>,
}

impl Pipeline {
    /// Create a pipeline that schedules its timers on the current tokio runtime
    pub fn new(
        config: PipelineConfig,
        sink: Arc<dyn DataSink>,
        presenter: Arc<dyn Presenter>,
    ) -> PipelineResult<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;
        Self::with_runtime(config, sink, presenter, runtime)
    }

    /// Create a pipeline bound to an explicit runtime, for feeding samples
    /// from a thread outside of it.
    pub fn with_runtime(
        config: PipelineConfig,
        sink: Arc<dyn DataSink>,
        presenter: Arc<dyn Presenter>,
        runtime: Handle,
    ) -> PipelineResult<Arc<Self>> {
        config.validate()?;

        let shared = Shared {
            buffer: CircularHistoryBuffer::new(config.buffer_capacity),
            detector: EventDetector::new(config.threshold)?,
            machine: CalibrationStateMachine::new(config.stage_arm_delay),
            waiting_for_motion_data: config.gate_open_on_start,
            debounce: TimerSlot::new(TimerKind::Debounce),
            rearm: TimerSlot::new(TimerKind::Rearm),
        };

        info!(
            capacity = config.buffer_capacity,
            threshold = config.threshold,
            "Motion pipeline created"
        );

        Ok(Arc::new_cyclic(|weak_self| Self {
            config,
            runtime,
            shared: Mutex::new(shared),
            sink,
            presenter,
            counters: Arc::new(Counters::default()),
            weak_self: weak_self.clone(),
        }))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Record a sample and, if the gate is open and the magnitude crosses
    /// the threshold, schedule a debounced confirmation.
    pub fn on_sample(&self, sample: Sample) {
        let detection = {
            let mut shared = self.shared.lock();
            shared.buffer.push(sample);

            let gate_open = shared.waiting_for_motion_data;
            let detection = shared.detector.evaluate(&sample, gate_open);

            if detection.trigger {
                // Closing the gate here keeps one crossing from arming
                // several confirmations while the debounce runs.
                shared.waiting_for_motion_data = false;
                let weak = self.weak_self.clone();
                let id = shared
                    .debounce
                    .arm(&self.runtime, self.config.debounce_delay, move |id| {
                        if let Some(pipeline) = weak.upgrade() {
                            pipeline.fire(id);
                        }
                    });
                debug!(id, magnitude = detection.magnitude, "Threshold crossed");
            }

            detection
        };

        Counters::bump(&self.counters.samples_received);
        if detection.magnitude.is_finite() {
            self.presenter.present_magnitude(detection.magnitude);
        } else {
            debug!("Ignoring non-finite magnitude");
        }
    }

    /// Confirm the event scheduled as debounce timer `id`.
    ///
    /// The confirmation does not re-check the threshold: once scheduled, it
    /// snapshots whatever history has accumulated.
    fn fire(&self, id: TimerId) {
        let action = {
            let mut shared = self.shared.lock();
            if !shared.debounce.complete(id) {
                debug!(id, "Stale debounce timer ignored");
                return;
            }
            shared.waiting_for_motion_data = false;

            let vector = shared.buffer.export();
            let stage = shared.machine.stage();

            match stage.label() {
                Some(label) if shared.machine.is_calibrating() => {
                    let transition = shared.machine.advance();
                    self.apply_transition(&mut shared, transition);
                    FireAction::Labeled {
                        vector,
                        label,
                        transition,
                    }
                }
                _ => {
                    let weak = self.weak_self.clone();
                    shared
                        .rearm
                        .arm(&self.runtime, self.config.cooldown, move |id| {
                            if let Some(pipeline) = weak.upgrade() {
                                pipeline.rearm(id);
                            }
                        });
                    FireAction::Unlabeled { vector }
                }
            }
        };

        Counters::bump(&self.counters.events_fired);

        match action {
            FireAction::Labeled {
                vector,
                label,
                transition,
            } => {
                info!(label, next = %transition.to, "Sending labeled snapshot");
                self.spawn_labeled_send(vector, label);
                self.presenter.present_stage(transition.to);
                if transition.completes_cycle() {
                    info!("Calibration cycle complete");
                }
            }
            FireAction::Unlabeled { vector } => {
                info!("Sending unlabeled snapshot for prediction");
                self.spawn_unlabeled_send(vector);
            }
        }
    }

    fn rearm(&self, id: TimerId) {
        let mut shared = self.shared.lock();
        if !shared.rearm.complete(id) {
            debug!(id, "Stale rearm timer ignored");
            return;
        }
        shared.waiting_for_motion_data = true;
        debug!(stage = %shared.machine.stage(), "Detection re-armed");
    }

    /// Close the gate and schedule the arm timer a stage change asks for.
    /// The new timer supersedes any pending stage-arm or cooldown.
    fn apply_transition(&self, shared: &mut Shared, transition: StageTransition) {
        shared.waiting_for_motion_data = false;
        let weak = self.weak_self.clone();
        shared
            .rearm
            .arm(&self.runtime, transition.arm_after, move |id| {
                if let Some(pipeline) = weak.upgrade() {
                    pipeline.rearm(id);
                }
            });
        debug!(from = %transition.from, to = %transition.to, "Stage transition");
    }

    fn spawn_labeled_send(&self, vector: Vec<f64>, label: &'static str) {
        let sink = Arc::clone(&self.sink);
        let counters = Arc::clone(&self.counters);
        self.runtime.spawn(async move {
            match sink.send_labeled(vector, label).await {
                Ok(()) => Counters::bump(&counters.labeled_sent),
                Err(e) => {
                    Counters::bump(&counters.send_failures);
                    warn!(label, "Labeled send failed: {}", e);
                }
            }
        });
    }

    fn spawn_unlabeled_send(&self, vector: Vec<f64>) {
        let sink = Arc::clone(&self.sink);
        let presenter = Arc::clone(&self.presenter);
        let counters = Arc::clone(&self.counters);
        self.runtime.spawn(async move {
            let result = sink.send_unlabeled(vector).await;
            handle_prediction(result, presenter.as_ref(), &counters);
        });
    }

    /// Begin a calibration run from `Idle`.
    ///
    /// Cancels any pending confirmation so that a crossing captured in
    /// prediction mode is not sent with the `up` label.
    pub fn start_calibration(&self) -> PipelineResult<StageTransition> {
        let transition = {
            let mut shared = self.shared.lock();
            let transition = shared.machine.start()?;
            if shared.debounce.cancel() {
                debug!("Pending confirmation cancelled by calibration start");
            }
            self.apply_transition(&mut shared, transition);
            transition
        };

        info!("Calibration started");
        self.presenter.present_stage(transition.to);
        Ok(transition)
    }

    pub fn set_threshold(&self, threshold: f64) -> PipelineResult<()> {
        self.shared.lock().detector.set_threshold(threshold)?;
        info!(threshold, "Threshold updated");
        Ok(())
    }

    pub fn threshold(&self) -> f64 {
        self.shared.lock().detector.threshold()
    }

    /// Force the admission gate open or closed. Any pending stage-arm or
    /// cooldown timer is cancelled. Returns the previous value.
    pub fn set_waiting_for_motion_data(&self, waiting: bool) -> bool {
        let mut shared = self.shared.lock();
        shared.rearm.cancel();
        std::mem::replace(&mut shared.waiting_for_motion_data, waiting)
    }

    pub fn stage(&self) -> CalibrationStage {
        self.shared.lock().machine.stage()
    }

    pub fn state(&self) -> PipelineState {
        let shared = self.shared.lock();
        PipelineState {
            is_calibrating: shared.machine.is_calibrating(),
            is_waiting_for_motion_data: shared.waiting_for_motion_data,
            stage: shared.machine.stage(),
            threshold: shared.detector.threshold(),
            magnitude: shared.detector.last_magnitude(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Copy of the history, oldest to newest, taken under the state lock
    pub fn export_history(&self) -> Vec<f64> {
        self.shared.lock().buffer.export()
    }

    /// Whether a debounced confirmation is outstanding
    pub fn confirmation_pending(&self) -> bool {
        self.shared.lock().debounce.is_pending()
    }

    /// Cancel all pending timers. Sends already in flight are not affected.
    pub fn shutdown(&self) {
        let mut shared = self.shared.lock();
        let debounce = shared.debounce.cancel();
        let rearm = shared.rearm.cancel();
        info!(debounce, rearm, "Pipeline timers cancelled");
    }
}

fn handle_prediction(result: SinkResult<Prediction>, presenter: &dyn Presenter, counters: &Counters) {
    match result {
        Ok(prediction) => match prediction.recognized_label() {
            Some(label) => {
                Counters::bump(&counters.unlabeled_sent);
                Counters::bump(&counters.predictions_received);
                presenter.present_predicted_label(label);
            }
            None => {
                Counters::bump(&counters.unlabeled_sent);
                Counters::bump(&counters.predictions_ignored);
                debug!("Prediction without a recognizable label ignored");
            }
        },
        Err(e) => {
            Counters::bump(&counters.send_failures);
            warn!("Unlabeled send failed: {}", e);
        }
    }
}
