// Synthetic motion source
//
// Produces low-amplitude resting noise at a fixed rate and, every
// `burst_every_secs`, a short sinusoidal swing along one axis. Useful for
// exercising the pipeline without a device.

use super::{sample_interval, MotionSource, SourceError, SourceMetadata, SourceResult};
use crate::types::Sample;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

const NOISE_AMPLITUDE: f64 = 0.02;
const BURST_AMPLITUDE: f64 = 1.0;
const BURST_DURATION_SECS: f64 = 0.3;

pub struct SimulatedSource {
    rate_hz: f64,
    interval: Duration,
    burst_every_secs: f64,
    rng: StdRng,
    tick: u64,
    is_connected: bool,
}

impl SimulatedSource {
    pub fn new(rate_hz: f64, burst_every_secs: f64, seed: u64) -> SourceResult<Self> {
        if !burst_every_secs.is_finite() || burst_every_secs <= BURST_DURATION_SECS {
            return Err(SourceError::Parse(format!(
                "Burst period must exceed {}s, got {}",
                BURST_DURATION_SECS, burst_every_secs
            )));
        }

        Ok(Self {
            rate_hz,
            interval: sample_interval(rate_hz)?,
            burst_every_secs,
            rng: StdRng::seed_from_u64(seed),
            tick: 0,
            is_connected: false,
        })
    }

    /// Generate the next sample and advance the synthetic clock
    pub fn next_sample(&mut self) -> Sample {
        let t = self.tick as f64 / self.rate_hz;
        self.tick += 1;

        let mut sample = Sample::new(
            self.rng.gen_range(-NOISE_AMPLITUDE..NOISE_AMPLITUDE),
            self.rng.gen_range(-NOISE_AMPLITUDE..NOISE_AMPLITUDE),
            self.rng.gen_range(-NOISE_AMPLITUDE..NOISE_AMPLITUDE),
        );

        let burst_index = (t / self.burst_every_secs).floor();
        let phase = t - burst_index * self.burst_every_secs;
        // Skip the burst at t=0 so the stream opens at rest.
        if burst_index >= 1.0 && phase < BURST_DURATION_SECS {
            let swing = BURST_AMPLITUDE * (PI * phase / BURST_DURATION_SECS).sin();
            match burst_index as u64 % 3 {
                0 => sample.x += swing,
                1 => sample.y += swing,
                _ => sample.z += swing,
            }
        }

        sample
    }
}

#[async_trait]
impl MotionSource for SimulatedSource {
    async fn connect(&mut self) -> SourceResult<()> {
        self.is_connected = true;
        Ok(())
    }

    async fn start(&mut self, sender: mpsc::Sender<Sample>) -> SourceResult<()> {
        if !self.is_connected {
            self.connect().await?;
        }

        info!(
            rate_hz = self.rate_hz,
            burst_every_secs = self.burst_every_secs,
            "Simulated motion source started"
        );

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.is_connected {
            ticker.tick().await;
            let sample = self.next_sample();
            if sender.send(sample).await.is_err() {
                info!("Sample receiver closed, stopping simulated source");
                break;
            }
        }

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
            source_type: "simulated".to_string(),
            sample_rate: self.rate_hz,
            properties: [(
                "burst_every_secs".to_string(),
                self.burst_every_secs.to_string(),
            )]
            .into_iter()
            .collect(),
        }
    }
}
