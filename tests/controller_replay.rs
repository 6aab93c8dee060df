use async_trait::async_trait;
use motion_calibrator::{
    create_source, CalibrationStage, DataSink, MotionController, Pipeline, PipelineConfig,
    PipelineError, Prediction, Presenter, SinkResult, SourceConfig,
};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct CountingSink {
    labeled: Mutex<Vec<String>>,
    unlabeled: Mutex<usize>,
}

#[async_trait]
impl DataSink for CountingSink {
    async fn send_labeled(&self, _vector: Vec<f64>, label: &str) -> SinkResult<()> {
        self.labeled.lock().push(label.to_string());
        Ok(())
    }

    async fn send_unlabeled(&self, _vector: Vec<f64>) -> SinkResult<Prediction> {
        *self.unlabeled.lock() += 1;
        Ok(Prediction::new("up"))
    }
}

struct SilentPresenter;

impl Presenter for SilentPresenter {
    fn present_stage(&self, _stage: CalibrationStage) {}
    fn present_magnitude(&self, _value: f64) {}
    fn present_predicted_label(&self, _label: &str) {}
}

fn recording(quiet_before: usize, quiet_after: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "x,y,z").unwrap();
    for _ in 0..quiet_before {
        writeln!(file, "0.01,0.0,-0.01").unwrap();
    }
    writeln!(file, "0.6,-0.4,0.3").unwrap();
    for _ in 0..quiet_after {
        writeln!(file, "0.0,0.01,0.0").unwrap();
    }
    file
}

fn csv_controller(path: &std::path::Path, sink: Arc<CountingSink>) -> MotionController {
    let pipeline = Pipeline::new(
        PipelineConfig::default(),
        sink as Arc<dyn DataSink>,
        Arc::new(SilentPresenter),
    )
    .unwrap();
    let source = create_source(SourceConfig::Csv {
        path: path.display().to_string(),
        rate_hz: 100.0,
        loop_playback: false,
    })
    .unwrap();
    MotionController::new(source, pipeline)
}

#[tokio::test(start_paused = true)]
async fn test_replay_drives_one_prediction() {
    let file = recording(40, 40);
    let sink = Arc::new(CountingSink::default());
    let mut controller = csv_controller(file.path(), Arc::clone(&sink));

    controller.start().await.unwrap();
    assert!(controller.is_running());
    assert_eq!(controller.metadata().source_type, "csv");

    let token = controller.cancellation_token();
    controller.wait().await;
    assert!(token.is_cancelled());
    assert!(!controller.is_running());

    let stats = controller.pipeline().stats();
    assert_eq!(stats.samples_received, 81);
    assert_eq!(stats.events_fired, 1);
    assert_eq!(*sink.unlabeled.lock(), 1);
    assert_eq!(stats.predictions_received, 1);

    controller.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_replay_during_calibration_sends_labeled() {
    // Shake lands at 1.5s, after the first stage is armed.
    let file = recording(150, 20);
    let sink = Arc::new(CountingSink::default());
    let mut controller = csv_controller(file.path(), Arc::clone(&sink));

    controller.start().await.unwrap();
    controller.pipeline().start_calibration().unwrap();
    controller.wait().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*sink.labeled.lock(), vec!["up".to_string()]);
    assert_eq!(*sink.unlabeled.lock(), 0);
    assert_eq!(controller.pipeline().stage(), CalibrationStage::Right);

    controller.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_metadata_available_while_streaming() {
    let file = recording(5000, 0);
    let sink = Arc::new(CountingSink::default());
    let mut controller = csv_controller(file.path(), sink);

    controller.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(controller.pipeline().stats().samples_received > 0);

    let metadata = controller.metadata();
    assert_eq!(metadata.source_type, "csv");
    assert_eq!(metadata.sample_rate, 100.0);
    assert_eq!(
        metadata.properties.get("loop_playback").map(String::as_str),
        Some("false")
    );

    tokio::time::timeout(Duration::from_secs(5), controller.stop())
        .await
        .expect("stop should not wait for the replay to finish")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_start_twice_is_rejected() {
    let file = recording(500, 0);
    let sink = Arc::new(CountingSink::default());
    let mut controller = csv_controller(file.path(), sink);

    controller.start().await.unwrap();
    assert!(matches!(
        controller.start().await,
        Err(PipelineError::AlreadyRunning)
    ));

    controller.stop().await.unwrap();
    assert!(!controller.is_running());
}
