// Remote consumer of exported history snapshots
//
// Labeled snapshots feed model training; unlabeled snapshots ask the server
// for a prediction. `HttpDataSink` talks JSON over HTTP; tests and embedders
// can plug in anything implementing `DataSink`.

use crate::config::SinkConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Sink closed")]
    Closed,
}

/// Server response to an unlabeled snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub label: Option<String>,
}

impl Prediction {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }

    /// The predicted label, or `None` when the server gave nothing usable
    pub fn recognized_label(&self) -> Option<&str> {
        self.label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
    }
}

#[async_trait]
pub trait DataSink: Send + Sync {
    /// Submit a snapshot captured during a calibration stage
    async fn send_labeled(&self, vector: Vec<f64>, label: &str) -> SinkResult<()>;

    /// Submit a snapshot and ask for the label the server infers
    async fn send_unlabeled(&self, vector: Vec<f64>) -> SinkResult<Prediction>;
}

#[derive(Debug, Serialize)]
struct LabeledRequest<'a> {
    data: &'a [f64],
    label: &'a str,
}

#[derive(Debug, Serialize)]
struct UnlabeledRequest<'a> {
    data: &'a [f64],
}

pub struct HttpDataSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDataSink {
    pub fn new(config: &SinkConfig) -> SinkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl DataSink for HttpDataSink {
    async fn send_labeled(&self, vector: Vec<f64>, label: &str) -> SinkResult<()> {
        let url = self.endpoint("train");
        debug!(%url, label, values = vector.len(), "Sending labeled snapshot");

        let response = self
            .client
            .post(&url)
            .json(&LabeledRequest {
                data: &vector,
                label,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SinkError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn send_unlabeled(&self, vector: Vec<f64>) -> SinkResult<Prediction> {
        let url = self.endpoint("predict");
        debug!(%url, values = vector.len(), "Sending unlabeled snapshot");

        let response = self
            .client
            .post(&url)
            .json(&UnlabeledRequest { data: &vector })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SinkError::Status(response.status().as_u16()));
        }

        let body = response.text().await?;
        parse_prediction(&body)
    }
}

/// Decode a prediction body. A body without a `label` field decodes to an
/// empty prediction rather than an error.
pub fn parse_prediction(body: &str) -> SinkResult<Prediction> {
    serde_json::from_str(body).map_err(|e| SinkError::Parse(format!("Invalid prediction: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_prediction() {
        let prediction = parse_prediction(r#"{"label":"left"}"#).unwrap();
        assert_eq!(prediction.recognized_label(), Some("left"));

        let missing = parse_prediction("{}").unwrap();
        assert_eq!(missing.recognized_label(), None);

        let blank = parse_prediction(r#"{"label":"  "}"#).unwrap();
        assert_eq!(blank.recognized_label(), None);

        assert!(matches!(
            parse_prediction("not json"),
            Err(SinkError::Parse(_))
        ));
    }

    #[test]
    fn test_request_shapes() {
        let data = [1.0, 2.0, 3.0];
        let labeled = serde_json::to_value(LabeledRequest {
            data: &data,
            label: "up",
        })
        .unwrap();
        assert_eq!(labeled, serde_json::json!({"data": [1.0, 2.0, 3.0], "label": "up"}));

        let unlabeled = serde_json::to_value(UnlabeledRequest { data: &data }).unwrap();
        assert_eq!(unlabeled, serde_json::json!({"data": [1.0, 2.0, 3.0]}));
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let sink = HttpDataSink::new(&SinkConfig {
            server_url: "http://192.168.1.20:5000/".to_string(),
            request_timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(sink.endpoint("train"), "http://192.168.1.20:5000/train");
    }
}
