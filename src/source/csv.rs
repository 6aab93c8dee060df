// Replays a recorded motion session from a CSV file
//
// Each non-empty line holds `x,y,z`. A first line with no numeric field is
// treated as a header; lines starting with `#` are comments.

use super::{parse_sample, sample_interval, MotionSource, SourceError, SourceMetadata, SourceResult};
use crate::types::Sample;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

pub struct CsvReplaySource {
    path: PathBuf,
    rate_hz: f64,
    interval: Duration,
    loop_playback: bool,
    samples: Vec<Sample>,
    position: usize,
    is_connected: bool,
}

impl CsvReplaySource {
    pub fn new(path: impl Into<PathBuf>, rate_hz: f64, loop_playback: bool) -> SourceResult<Self> {
        Ok(Self {
            path: path.into(),
            rate_hz,
            interval: sample_interval(rate_hz)?,
            loop_playback,
            samples: Vec::new(),
            position: 0,
            is_connected: false,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn parse_recording(contents: &str) -> SourceResult<Vec<Sample>> {
        let mut samples = Vec::new();
        let lines = contents
            .lines()
            .enumerate()
            .map(|(idx, line)| (idx, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        for (position, (idx, line)) in lines.enumerate() {
            match parse_sample(line) {
                Ok(sample) => samples.push(sample),
                Err(_) if position == 0 && is_header(line) => {
                    debug!("Skipping CSV header: {}", line);
                }
                Err(e) => {
                    return Err(SourceError::Parse(format!("line {}: {}", idx + 1, e)));
                }
            }
        }

        Ok(samples)
    }

    fn next_sample(&mut self) -> Option<Sample> {
        if self.position >= self.samples.len() {
            if !self.loop_playback || self.samples.is_empty() {
                return None;
            }
            self.position = 0;
        }
        let sample = self.samples[self.position];
        self.position += 1;
        Some(sample)
    }
}

fn is_header(line: &str) -> bool {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|field| !field.is_empty())
        .all(|field| field.parse::<f64>().is_err())
}

#[async_trait]
impl MotionSource for CsvReplaySource {
    async fn connect(&mut self) -> SourceResult<()> {
        if self.is_connected {
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&self.path).await?;
        self.samples = Self::parse_recording(&contents)?;
        self.position = 0;
        self.is_connected = true;

        info!(
            "Loaded {} samples from {}",
            self.samples.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn start(&mut self, sender: mpsc::Sender<Sample>) -> SourceResult<()> {
        if !self.is_connected {
            self.connect().await?;
        }

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        while let Some(sample) = self.next_sample() {
            ticker.tick().await;
            if sender.send(sample).await.is_err() {
                info!("Sample receiver closed, stopping replay");
                return Ok(());
            }
        }

        info!("Replay of {} finished", self.path.display());
        Ok(())
    }

    async fn stop(&mut self) -> SourceResult<()> {
        self.is_connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected
    }

    fn metadata(&self) -> SourceMetadata {
        SourceMetadata {
            source_type: "csv".to_string(),
            sample_rate: self.rate_hz,
            properties: [
                ("path".to_string(), self.path.display().to_string()),
                ("loop_playback".to_string(), self.loop_playback.to_string()),
            ]
            .into_iter()
            .collect(),
        }
    }
}
