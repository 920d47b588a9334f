use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::config::Settings;
use crate::lifecycle::ExamEngine;

pub(crate) async fn run(engine: ExamEngine, settings: &Settings) -> Result<()> {
    let period = Duration::from_secs(settings.sweep().interval_seconds.max(1));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tracing::info!(interval_seconds = period.as_secs(), "Lifecycle sweep scheduled");
    let handle = tokio::spawn(sweep_loop(engine, period, shutdown_rx));

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    if let Err(err) = handle.await {
        tracing::error!(error = %err, "Background task join failed");
    }

    Ok(())
}

async fn sweep_loop(engine: ExamEngine, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = engine.sweep().await {
                    tracing::error!(error = %err, "Lifecycle sweep failed");
                }
            }
        }
    }
}
