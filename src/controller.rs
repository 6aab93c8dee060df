// Motion controller - owns a source and feeds its samples into the pipeline
//
// The controller manages:
// - Source lifecycle (connect, start, stop)
// - The producer task (source -> channel) and receiver task (channel -> pipeline)
// - Task cancellation via CancellationToken for graceful shutdown

use crate::pipeline::Pipeline;
use crate::source::{MotionSource, SourceMetadata};
use crate::types::{PipelineError, PipelineResult, Sample};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::RwLock as TokioRwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub struct MotionController {
    source: Arc<TokioRwLock<Box<dyn MotionSource>>>,
    /// Refreshed on every `start`; the producer holds the source lock while streaming.
    metadata: SourceMetadata,
    pipeline: Arc<Pipeline>,
    channel_capacity: usize,
    is_running: Arc<AtomicBool>,
    cancel_token: CancellationToken,
    receiver_task: Option<JoinHandle<()>>,
}

impl MotionController {
    pub fn new(source: Box<dyn MotionSource>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            metadata: source.metadata(),
            source: Arc::new(TokioRwLock::new(source)),
            pipeline,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            is_running: Arc::new(AtomicBool::new(false)),
            cancel_token: CancellationToken::new(),
            receiver_task: None,
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn metadata(&self) -> SourceMetadata {
        self.metadata.clone()
    }

    /// Connect the source and start streaming samples into the pipeline
    pub async fn start(&mut self) -> PipelineResult<()> {
        if self.is_running.load(Ordering::Relaxed) {
            return Err(PipelineError::AlreadyRunning);
        }

        self.cancel_token = CancellationToken::new();

        let metadata = {
            let mut source = self.source.write().await;
            source.connect().await?;
            source.metadata()
        };
        info!(
            source = %metadata.source_type,
            sample_rate = metadata.sample_rate,
            "Motion source connected"
        );
        self.metadata = metadata;

        let (tx, rx) = mpsc::channel::<Sample>(self.channel_capacity);
        self.spawn_producer(tx);
        self.receiver_task = Some(self.spawn_receiver(rx));

        self.is_running.store(true, Ordering::Relaxed);
        info!("Motion controller started");
        Ok(())
    }

    fn spawn_producer(&self, tx: mpsc::Sender<Sample>) {
        let source = Arc::clone(&self.source);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            let mut source = source.write().await;
            tokio::select! {
                result = source.start(tx) => {
                    match result {
                        Ok(()) => info!("Motion source finished"),
                        Err(e) => error!("Motion source error: {}", e),
                    }
                }
                _ = cancel_token.cancelled() => {
                    info!("Motion source cancelled");
                }
            }
        });
    }

    fn spawn_receiver(&self, mut rx: mpsc::Receiver<Sample>) -> JoinHandle<()> {
        let pipeline = Arc::clone(&self.pipeline);
        let cancel_token = self.cancel_token.clone();
        let is_running = Arc::clone(&self.is_running);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancel_token.cancelled() => {
                        info!("Sample receiver cancelled");
                        break;
                    }

                    sample = rx.recv() => {
                        match sample {
                            Some(sample) => pipeline.on_sample(sample),
                            None => {
                                info!("Sample channel closed");
                                // Lets anyone holding the token see the session ended.
                                cancel_token.cancel();
                                break;
                            }
                        }
                    }
                }
            }
            is_running.store(false, Ordering::Relaxed);
        })
    }

    /// Wait until the source is exhausted or the controller is stopped
    pub async fn wait(&mut self) {
        if let Some(task) = self.receiver_task.take() {
            if let Err(e) = task.await {
                error!("Sample receiver task failed: {}", e);
            }
        }
    }

    /// Stop streaming and cancel the pipeline's pending timers
    pub async fn stop(&mut self) -> PipelineResult<()> {
        info!("Stopping motion controller");

        self.cancel_token.cancel();
        self.wait().await;

        {
            let mut source = self.source.write().await;
            source.stop().await?;
        }

        self.pipeline.shutdown();
        self.is_running.store(false, Ordering::Relaxed);
        info!("Motion controller stopped");
        Ok(())
    }

    /// Cancellation token for the current session; also cancelled when the
    /// source runs dry.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }
}

impl Drop for MotionController {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
