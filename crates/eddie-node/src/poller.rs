//! Periodic sensor polling
//!
//! Reads the ping and ADC arrays at a fixed rate and publishes each reading
//! as one JSON line. The poller contends for the serial channel like any
//! other caller.

use chrono::{DateTime, Utc};
use eddie_core::board::{Board, SensorArray};
use eddie_core::protocol::{CancelFlag, ProtocolError, SerialIo};
use eddie_core::sensors::{interpret_adc, AdcSummary};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// One published sensor snapshot
#[derive(Debug, Clone, Serialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub ping: SensorArray,
    pub adc: SensorArray,
    /// IR voltages and battery level, present when the ADC read succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adc_summary: Option<AdcSummary>,
}

/// Read both sensor arrays once
pub fn poll_once<T: SerialIo>(
    board: &Board<T>,
    cancel: &CancelFlag,
) -> Result<Reading, ProtocolError> {
    let ping = board.get_ping_array_cancellable(cancel)?;
    let adc = board.get_adc_array_cancellable(cancel)?;
    let adc_summary = interpret_adc(&adc);
    if adc_summary.is_none() {
        tracing::debug!(status = %adc.status, "ADC read not usable");
    }
    Ok(Reading {
        timestamp: Utc::now(),
        ping,
        adc,
        adc_summary,
    })
}

/// Poll until `cancel` is raised, writing readings to `out`
///
/// Returns how many readings were published.
pub async fn run<T, W>(
    board: Arc<Board<T>>,
    period: Duration,
    cancel: CancelFlag,
    mut out: W,
) -> anyhow::Result<u64>
where
    T: SerialIo + 'static,
    W: Write,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut published = 0u64;

    tracing::info!(period_ms = period.as_millis() as u64, "sensor poller started");
    loop {
        ticker.tick().await;
        if cancel.is_cancelled() {
            break;
        }

        let board = Arc::clone(&board);
        let flag = cancel.clone();
        match tokio::task::spawn_blocking(move || poll_once(&board, &flag)).await? {
            Ok(reading) => {
                serde_json::to_writer(&mut out, &reading)?;
                writeln!(out)?;
                out.flush()?;
                published += 1;
            }
            Err(ProtocolError::Cancelled) => break,
            Err(e) => tracing::warn!("sensor poll failed: {}", e),
        }
    }
    tracing::info!(published, "sensor poller stopped");
    Ok(published)
}
