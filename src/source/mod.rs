// Pluggable motion sources
//
// A source delivers `Sample`s at an approximately fixed rate through an
// async channel. New sources are added by:
// 1. Implementing the MotionSource trait
// 2. Adding a variant to SourceConfig
// 3. Registering it in `create_source`
//
// Current implementations:
// - Simulated: synthetic resting noise with periodic motion bursts
// - UDP: one sample per datagram (JSON object or `x,y,z` text)
// - CSV: replays a recorded `x,y,z` file at a fixed rate

mod csv;
mod simulated;
mod udp;

use crate::types::Sample;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

pub use self::csv::CsvReplaySource;
pub use simulated::SimulatedSource;
pub use udp::UdpSource;

pub type SourceResult<T> = Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Configuration for the available source types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceConfig {
    #[serde(rename = "simulated")]
    Simulated {
        rate_hz: f64,
        /// Seconds between synthetic motion bursts
        burst_every_secs: f64,
        #[serde(default)]
        seed: Option<u64>,
    },

    #[serde(rename = "udp")]
    Udp {
        bind_addr: String,
        #[serde(default)]
        buffer_size: Option<usize>,
    },

    #[serde(rename = "csv")]
    Csv {
        path: String,
        rate_hz: f64,
        #[serde(default)]
        loop_playback: bool,
    },
}

/// Metadata about a motion source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub source_type: String,
    /// Nominal sample rate in Hz, 0 when unknown
    pub sample_rate: f64,
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

#[async_trait]
pub trait MotionSource: Send + Sync {
    /// Prepare the underlying device or socket
    async fn connect(&mut self) -> SourceResult<()>;

    /// Stream samples into `sender` until stopped, exhausted, or the
    /// receiver goes away.
    async fn start(&mut self, sender: mpsc::Sender<Sample>) -> SourceResult<()>;

    async fn stop(&mut self) -> SourceResult<()>;

    fn is_connected(&self) -> bool;

    fn metadata(&self) -> SourceMetadata;
}

pub fn create_source(config: SourceConfig) -> SourceResult<Box<dyn MotionSource>> {
    match config {
        SourceConfig::Simulated {
            rate_hz,
            burst_every_secs,
            seed,
        } => Ok(Box::new(SimulatedSource::new(
            rate_hz,
            burst_every_secs,
            seed.unwrap_or(0x5eed),
        )?)),

        SourceConfig::Udp {
            bind_addr,
            buffer_size,
        } => Ok(Box::new(UdpSource::new(bind_addr, buffer_size.unwrap_or(1024)))),

        SourceConfig::Csv {
            path,
            rate_hz,
            loop_playback,
        } => Ok(Box::new(CsvReplaySource::new(path, rate_hz, loop_playback)?)),
    }
}

/// Parse one sample from text: either a JSON object with `x`, `y`, `z`
/// or three comma/whitespace separated numbers.
pub fn parse_sample(text: &str) -> SourceResult<Sample> {
    let text = text.trim();
    if text.starts_with('{') {
        return serde_json::from_str(text)
            .map_err(|e| SourceError::Parse(format!("Invalid JSON sample: {}", e)));
    }

    let values = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f64>()
                .map_err(|_| SourceError::Parse(format!("Invalid number: {}", part)))
        })
        .collect::<SourceResult<Vec<f64>>>()?;

    match values.as_slice() {
        [x, y, z] => Ok(Sample::new(*x, *y, *z)),
        _ => Err(SourceError::Parse(format!(
            "Expected 3 values, got {}",
            values.len()
        ))),
    }
}

pub(crate) fn sample_interval(rate_hz: f64) -> SourceResult<std::time::Duration> {
    if !rate_hz.is_finite() || rate_hz <= 0.0 {
        return Err(SourceError::Parse(format!(
            "Sample rate must be positive, got {}",
            rate_hz
        )));
    }
    Ok(std::time::Duration::from_secs_f64(1.0 / rate_hz))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sample_formats() {
        assert_eq!(parse_sample("1,2,3").unwrap(), Sample::new(1.0, 2.0, 3.0));
        assert_eq!(
            parse_sample(" -0.5  0.25\t1e-2 \n").unwrap(),
            Sample::new(-0.5, 0.25, 0.01)
        );
        assert_eq!(
            parse_sample(r#"{"x":0.1,"y":-0.2,"z":0.3}"#).unwrap(),
            Sample::new(0.1, -0.2, 0.3)
        );
    }

    #[test]
    fn test_parse_sample_rejects_garbage() {
        assert!(parse_sample("1,2").is_err());
        assert!(parse_sample("1,2,3,4").is_err());
        assert!(parse_sample("a,b,c").is_err());
        assert!(parse_sample(r#"{"x":1}"#).is_err());
    }

    #[test]
    fn test_source_config_tagging() {
        let config: SourceConfig =
            serde_json::from_str(r#"{"type":"udp","bind_addr":"0.0.0.0:9000"}"#).unwrap();
        assert!(matches!(config, SourceConfig::Udp { buffer_size: None, .. }));
    }

    #[test]
    fn test_sample_interval() {
        assert_eq!(
            sample_interval(200.0).unwrap(),
            std::time::Duration::from_millis(5)
        );
        assert!(sample_interval(0.0).is_err());
        assert!(sample_interval(f64::NAN).is_err());
    }
}
