use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use plex_webhook::{
    Dispatcher, HealthSupervisor, Listener, ListenerConfig, StatusBoard, Tick, params_from_env,
};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting Plex webhook service");

    let config = ListenerConfig::from_params(&params_from_env());
    let status = StatusBoard::new();
    let dispatcher = Arc::new(Dispatcher::new(config.rapid_trigger_secs, status.clone()));
    let listener = Listener::new(config.clone(), Arc::clone(&dispatcher), status.clone());
    let mut supervisor = HealthSupervisor::new(listener, dispatcher, status.clone());

    // Failure is logged; the service keeps running so the health ticks stay observable.
    let _ = supervisor.start().await;

    let mut status_rx = status.subscribe();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let current = status_rx.borrow_and_update().clone();
            info!(
                online = current.online,
                port = current.port,
                client_count = current.client_count,
                rapid_trigger = ?current.rapid_trigger,
                "Status changed"
            );
        }
    });

    let (tick_tx, tick_rx) = mpsc::channel(8);
    tokio::spawn(drive_ticks(config.short_poll(), config.long_poll(), tick_tx));

    tokio::select! {
        _ = supervisor.run(tick_rx) => {
            warn!("Tick driver stopped");
        }
        res = wait_for_shutdown_signal() => {
            if let Err(e) = res {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Received interrupt or exit");
        }
    }

    supervisor.shutdown().await;

    Ok(())
}

async fn drive_ticks(short_poll: Duration, long_poll: Duration, ticks: mpsc::Sender<Tick>) {
    let mut short = interval_at(Instant::now() + short_poll, short_poll);
    let mut long = interval_at(Instant::now() + long_poll, long_poll);
    short.set_missed_tick_behavior(MissedTickBehavior::Delay);
    long.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let tick = tokio::select! {
            _ = short.tick() => Tick::ShortPoll,
            _ = long.tick() => Tick::LongPoll,
        };
        if ticks.send(tick).await.is_err() {
            break;
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
