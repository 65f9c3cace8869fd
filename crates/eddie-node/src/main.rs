//! Eddie control board node
//!
//! Opens the board (or the simulator with `--demo`), then either polls the
//! ping and ADC sensors until Ctrl-C or runs a single operation. Readings
//! and results go to stdout as JSON; logs go to stderr.
//!
//! Usage:
//!   eddie-node [--config FILE] [--port PORT] [--baud RATE] [--rate HZ] [--demo] [run]
//!   eddie-node [--demo] distance
//!   eddie-node [--hold SECS] drive-power -40 40
//!
//! Drive commands keep the wheels moving until Ctrl-C, or until `--hold`
//! seconds have passed, then the board is stopped.

mod commands;
mod poller;

use anyhow::Context;
use clap::{Parser, Subcommand};
use eddie_core::board::Board;
use eddie_core::config::DriverConfig;
use eddie_core::demo::SimulatedBoard;
use eddie_core::protocol::{CancelFlag, SerialIo};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use commands::Operation;

#[derive(Debug, Parser)]
#[command(name = "eddie-node", version, about = "Drive the Parallax Eddie control board")]
struct Cli {
    /// JSON configuration file
    #[arg(long, env = "EDDIE_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device (overrides the config file)
    #[arg(long, env = "EDDIE_PORT")]
    port: Option<String>,

    /// Baud rate (overrides the config file)
    #[arg(long)]
    baud: Option<u32>,

    /// Sensor polling rate in Hz (overrides the config file)
    #[arg(long)]
    rate: Option<f64>,

    /// Talk to a simulated board instead of a serial device
    #[arg(long)]
    demo: bool,

    /// After a drive command, stop the board after this many seconds
    /// instead of waiting for Ctrl-C
    #[arg(long, value_name = "SECS")]
    hold: Option<u64>,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Poll ping and ADC sensors until interrupted (default)
    Run,
    #[command(flatten)]
    Once(Operation),
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<DriverConfig> {
    let mut config = match &cli.config {
        Some(path) => DriverConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DriverConfig::default(),
    };
    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.baud_rate = baud;
    }
    if let Some(rate) = cli.rate {
        config.poll_rate_hz = rate;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();
    let config = load_config(&cli)?;
    let mode = cli.mode.clone().unwrap_or(Mode::Run);
    let hold = cli.hold.map(Duration::from_secs);

    tracing::info!(version = eddie_core::VERSION, "eddie node booting up");
    if cli.demo {
        tracing::info!("using simulated board");
        let board = Board::with_port(SimulatedBoard::new(), config.response_window());
        serve(Arc::new(board), config.poll_period(), mode, hold).await
    } else {
        let open_config = config.clone();
        let board = tokio::task::spawn_blocking(move || Board::open(&open_config))
            .await?
            .with_context(|| format!("opening {}", config.port))?;
        serve(Arc::new(board), config.poll_period(), mode, hold).await
    }
}

async fn serve<T: SerialIo + 'static>(
    board: Arc<Board<T>>,
    poll_period: Duration,
    mode: Mode,
    hold: Option<Duration>,
) -> anyhow::Result<()> {
    let result = match mode {
        Mode::Run => {
            let cancel = CancelFlag::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("failed to listen for Ctrl-C: {}", e);
                }
                tracing::info!("interrupt received, shutting down");
                trigger.cancel();
            });
            poller::run(
                Arc::clone(&board),
                poll_period,
                cancel,
                std::io::stdout(),
            )
            .await
            .map(|_| ())
        }
        Mode::Once(operation) => {
            let motion = operation.is_motion();
            let worker = Arc::clone(&board);
            let outcome = tokio::task::spawn_blocking(move || operation.execute(&worker)).await?;
            match outcome {
                Ok(value) => {
                    println!("{}", value);
                    if motion {
                        hold_motion(hold).await;
                    }
                    Ok(())
                }
                Err(e) => Err(anyhow::Error::new(e).context("board operation failed")),
            }
        }
    };

    let counters = board.counters();
    tracing::debug!(
        tx_bytes = counters.tx_bytes,
        rx_bytes = counters.rx_bytes,
        timeouts = counters.timeouts,
        "exchange counters"
    );
    tokio::task::spawn_blocking(move || board.shutdown()).await?;
    result
}

/// Keep a drive command in effect until Ctrl-C or until `limit` elapses
async fn hold_motion(limit: Option<Duration>) {
    match limit {
        Some(limit) => {
            tracing::info!(seconds = limit.as_secs_f64(), "holding drive command");
            tokio::select! {
                _ = tokio::time::sleep(limit) => {}
                _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received, stopping"),
            }
        }
        None => {
            tracing::info!("holding drive command until Ctrl-C");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for Ctrl-C: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eddie_core::protocol::ResponseWindow;

    fn demo_board() -> Arc<Board<SimulatedBoard>> {
        Arc::new(Board::with_port(
            SimulatedBoard::with_seed(5),
            ResponseWindow::default(),
        ))
    }

    #[tokio::test]
    async fn test_drive_command_holds_then_stops() {
        let board = demo_board();
        let mode = Mode::Once(Operation::DrivePower { left: 60, right: 60 });
        let task = tokio::spawn(serve(
            Arc::clone(&board),
            Duration::from_millis(100),
            mode,
            Some(Duration::from_millis(300)),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let worker = Arc::clone(&board);
        let speed = tokio::task::spawn_blocking(move || worker.get_speed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(speed, (240, 240));
        assert!(!board.is_shut_down());

        task.await.unwrap().unwrap();
        assert!(board.is_shut_down());
    }

    #[tokio::test]
    async fn test_query_command_shuts_down_at_once() {
        let board = demo_board();
        serve(
            Arc::clone(&board),
            Duration::from_millis(100),
            Mode::Once(Operation::Heading),
            None,
        )
        .await
        .unwrap();
        assert!(board.is_shut_down());
    }
}
