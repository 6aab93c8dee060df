pub mod buffer;
pub mod calibration;
pub mod config;
pub mod controller;
pub mod detector;
pub mod pipeline;
pub mod presenter;
pub mod sink;
pub mod source;
pub mod timer;
pub mod types;

pub use buffer::CircularHistoryBuffer;
pub use calibration::{CalibrationStateMachine, StageTransition};
pub use config::{ConfigError, PipelineConfig, SinkConfig};
pub use controller::MotionController;
pub use detector::{Detection, EventDetector};
pub use pipeline::Pipeline;
pub use presenter::{LogPresenter, Presenter};
pub use sink::{DataSink, HttpDataSink, Prediction, SinkError, SinkResult};
pub use source::{create_source, MotionSource, SourceConfig, SourceError, SourceMetadata};
pub use timer::{TimerId, TimerKind, TimerSlot};
pub use types::*;
