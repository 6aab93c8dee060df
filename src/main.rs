mod cli;

use anyhow::{bail, Context};
use clap::Parser;
use cli::{wait_for_shutdown, Cli, OperatorCommand, Shutdown, SourceKind};
use motion_calibrator::{
    create_source, HttpDataSink, LogPresenter, MotionController, Pipeline, PipelineConfig,
    SinkConfig, SourceConfig,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "motion_calibrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = PipelineConfig::from_env().context("Failed to load pipeline configuration")?;
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }

    let mut sink_config = SinkConfig::from_env().context("Failed to load sink configuration")?;
    if let Some(url) = cli.server_url.clone() {
        sink_config.server_url = url;
    }

    let source_config = match cli.source {
        SourceKind::Simulated => SourceConfig::Simulated {
            rate_hz: cli.rate_hz,
            burst_every_secs: cli.burst_every,
            seed: None,
        },
        SourceKind::Udp => SourceConfig::Udp {
            bind_addr: cli.bind.clone(),
            buffer_size: None,
        },
        SourceKind::Csv => {
            let Some(path) = cli.file.clone() else {
                bail!("--file is required for the csv source");
            };
            SourceConfig::Csv {
                path,
                rate_hz: cli.rate_hz,
                loop_playback: cli.loop_playback,
            }
        }
    };

    info!("Starting motion calibrator");
    info!("Server: {}", sink_config.server_url);

    let sink = HttpDataSink::new(&sink_config).context("Failed to create HTTP client")?;
    let pipeline = Pipeline::new(config, Arc::new(sink), Arc::new(LogPresenter::default()))?;
    let source = create_source(source_config)?;

    let mut controller = MotionController::new(source, Arc::clone(&pipeline));
    controller.start().await?;

    if cli.calibrate {
        pipeline.start_calibration()?;
    }

    info!("Commands: calibrate | threshold <value> | status | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let cancel_token = controller.cancellation_token();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = cancel_token.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    // stdin closed: run until Ctrl-C or the source is exhausted
                    match wait_for_shutdown(&cancel_token, tokio::signal::ctrl_c()).await? {
                        Shutdown::Interrupted => info!("Interrupted"),
                        Shutdown::SessionEnded => info!("Motion source exhausted"),
                    }
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match OperatorCommand::parse(&line) {
                    Ok(OperatorCommand::Calibrate) => {
                        if let Err(e) = pipeline.start_calibration() {
                            warn!("{}", e);
                        }
                    }
                    Ok(OperatorCommand::Threshold(value)) => {
                        if let Err(e) = pipeline.set_threshold(value) {
                            warn!("{}", e);
                        }
                    }
                    Ok(OperatorCommand::Status) => {
                        let state = pipeline.state();
                        let stats = pipeline.stats();
                        info!(
                            stage = %state.stage,
                            waiting = state.is_waiting_for_motion_data,
                            threshold = state.threshold,
                            samples = stats.samples_received,
                            events = stats.events_fired,
                            labeled = stats.labeled_sent,
                            unlabeled = stats.unlabeled_sent,
                            failures = stats.send_failures,
                            "Status"
                        );
                    }
                    Ok(OperatorCommand::Quit) => break,
                    Err(e) => warn!("{}", e),
                }
            }
        }
    }

    controller.stop().await?;
    Ok(())
}
