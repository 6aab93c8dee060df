use std::env;
use std::time::Duration;

/// Pipeline tuning, loaded from environment variables or built in code
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Number of samples kept in the rolling history
    pub buffer_capacity: usize,
    /// Initial magnitude threshold (runtime-mutable on the pipeline)
    pub threshold: f64,
    /// Delay between a threshold crossing and its snapshot
    pub debounce_delay: Duration,
    /// Delay after a prediction send before detection re-arms
    pub cooldown: Duration,
    /// Delay after a stage change before detection re-arms
    pub stage_arm_delay: Duration,
    /// Whether the admission gate starts open
    pub gate_open_on_start: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 50,
            threshold: 0.1,
            debounce_delay: Duration::from_millis(50),
            cooldown: Duration::from_secs(2),
            stage_arm_delay: Duration::from_secs(1),
            gate_open_on_start: true,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            buffer_capacity: parse_var("MOTION_BUFFER_CAPACITY")?
                .unwrap_or(defaults.buffer_capacity),
            threshold: parse_var("MOTION_THRESHOLD")?.unwrap_or(defaults.threshold),
            debounce_delay: seconds_var("MOTION_DEBOUNCE_SECONDS")?
                .unwrap_or(defaults.debounce_delay),
            cooldown: seconds_var("MOTION_COOLDOWN_SECONDS")?.unwrap_or(defaults.cooldown),
            stage_arm_delay: seconds_var("MOTION_STAGE_ARM_SECONDS")?
                .unwrap_or(defaults.stage_arm_delay),
            gate_open_on_start: env::var("MOTION_GATE_OPEN_ON_START")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(defaults.gate_open_on_start),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "buffer capacity must be at least 1".to_string(),
            ));
        }
        if !self.threshold.is_finite() {
            return Err(ConfigError::InvalidValue(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Where snapshots are sent
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    /// Base URL of the training/prediction server
    pub server_url: String,
    pub request_timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl SinkConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let server_url = env::var("MOTION_SERVER_URL").unwrap_or(defaults.server_url);
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(format!(
                "MOTION_SERVER_URL must be an http(s) URL, got {}",
                server_url
            )));
        }

        Ok(Self {
            server_url,
            request_timeout: seconds_var("MOTION_REQUEST_TIMEOUT_SECONDS")?
                .unwrap_or(defaults.request_timeout),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidEnvVar { name: String, value: String },

    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn seconds_var(name: &str) -> Result<Option<Duration>, ConfigError> {
    let Some(seconds) = parse_var::<f64>(name)? else {
        return Ok(None);
    };
    Duration::try_from_secs_f64(seconds)
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnvVar {
            name: name.to_string(),
            value: seconds.to_string(),
        })
}
