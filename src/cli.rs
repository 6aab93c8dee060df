use clap::{Parser, ValueEnum};
use std::future::Future;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(
    name = "motion-calibrator",
    version,
    about = "Sample a 3-axis motion signal, detect large motions and run calibration",
    long_about = "Streams motion samples from a source, sends labeled snapshots to the \
                  training server during calibration and unlabeled snapshots for \
                  prediction otherwise. Pipeline tuning is read from MOTION_* \
                  environment variables (a .env file is honored)."
)]
pub struct Cli {
    /// Where samples come from
    #[arg(long, value_enum, default_value_t = SourceKind::Simulated)]
    pub source: SourceKind,

    /// Training/prediction server base URL
    #[arg(long, env = "MOTION_SERVER_URL")]
    pub server_url: Option<String>,

    /// UDP bind address (udp source)
    #[arg(long, default_value = "0.0.0.0:9750")]
    pub bind: String,

    /// Recording to replay (csv source)
    #[arg(long)]
    pub file: Option<String>,

    /// Loop the recording (csv source)
    #[arg(long)]
    pub loop_playback: bool,

    /// Sample rate for simulated and csv sources
    #[arg(long, default_value_t = 200.0)]
    pub rate_hz: f64,

    /// Seconds between synthetic motion bursts (simulated source)
    #[arg(long, default_value_t = 3.0)]
    pub burst_every: f64,

    /// Override the initial threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Begin a calibration run immediately
    #[arg(long)]
    pub calibrate: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Simulated,
    Udp,
    Csv,
}

/// Commands an operator can type while the pipeline runs
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Calibrate,
    Threshold(f64),
    Status,
    Quit,
}

impl OperatorCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut parts = line.split_whitespace();
        let command = parts.next().ok_or_else(|| "empty command".to_string())?;

        match command.to_lowercase().as_str() {
            "calibrate" | "c" => Ok(OperatorCommand::Calibrate),
            "status" | "s" => Ok(OperatorCommand::Status),
            "quit" | "q" | "exit" => Ok(OperatorCommand::Quit),
            "threshold" | "t" => {
                let value = parts
                    .next()
                    .ok_or_else(|| "usage: threshold <value>".to_string())?;
                value
                    .parse()
                    .map(OperatorCommand::Threshold)
                    .map_err(|_| format!("not a number: {}", value))
            }
            other => Err(format!("unknown command: {}", other)),
        }
    }
}

/// Why the run loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    Interrupted,
    SessionEnded,
}

/// Wait for an interrupt or for the session to end on its own, whichever
/// comes first. Used once stdin is closed and no more commands can arrive.
pub async fn wait_for_shutdown<F>(
    cancel_token: &CancellationToken,
    interrupt: F,
) -> std::io::Result<Shutdown>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = interrupt => result.map(|()| Shutdown::Interrupted),
        _ = cancel_token.cancelled() => Ok(Shutdown::SessionEnded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operator_commands() {
        assert_eq!(OperatorCommand::parse("calibrate"), Ok(OperatorCommand::Calibrate));
        assert_eq!(OperatorCommand::parse("  T 0.25 "), Ok(OperatorCommand::Threshold(0.25)));
        assert_eq!(OperatorCommand::parse("q"), Ok(OperatorCommand::Quit));
        assert!(OperatorCommand::parse("threshold").is_err());
        assert!(OperatorCommand::parse("threshold abc").is_err());
        assert!(OperatorCommand::parse("jump").is_err());
        assert!(OperatorCommand::parse("").is_err());
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from([
            "motion-calibrator",
            "--source",
            "csv",
            "--file",
            "session.csv",
            "--threshold",
            "0.4",
            "--calibrate",
        ]);
        assert_eq!(cli.source, SourceKind::Csv);
        assert_eq!(cli.file.as_deref(), Some("session.csv"));
        assert_eq!(cli.threshold, Some(0.4));
        assert!(cli.calibrate);
    }

    #[tokio::test]
    async fn test_session_end_releases_closed_stdin() {
        let token = CancellationToken::new();
        token.cancel();
        let reason = wait_for_shutdown(&token, std::future::pending::<std::io::Result<()>>())
            .await
            .unwrap();
        assert_eq!(reason, Shutdown::SessionEnded);
    }

    #[tokio::test]
    async fn test_interrupt_ends_wait() {
        let token = CancellationToken::new();
        let reason = wait_for_shutdown(&token, async { Ok(()) }).await.unwrap();
        assert_eq!(reason, Shutdown::Interrupted);
        assert!(!token.is_cancelled());
    }
}
