use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use nag_core::calendar::CalendarService;
use nag_core::timezone;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::app::App;
use crate::cli::ServeCommand;
use crate::server::{router, AppState};

const PLANNER_INTERVAL: Duration = Duration::from_secs(60);

pub async fn serve(app: App, command: ServeCommand) -> Result<()> {
    let listen = command.listen.unwrap_or_else(|| app.config.server.listen.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = app.dispatcher.clone();
    let poll_interval = Duration::from_secs(app.config.server.poll_interval_secs.max(1));
    let dispatcher_rx = shutdown_rx.clone();
    let dispatcher_task = tokio::spawn(async move { dispatcher.run(poll_interval, dispatcher_rx).await });

    let planner_task = tokio::spawn(run_planner(
        app.calendar.clone(),
        app.owner_id.clone(),
        shutdown_rx,
    ));

    let state = AppState {
        owner_id: app.owner_id.clone(),
        calendar: app.calendar.clone(),
        machine: app.machine.clone(),
    };
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {}", listen))?;
    tracing::info!(addr = %listener.local_addr()?, owner_id = %app.owner_id, "nag listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = tokio::join!(dispatcher_task, planner_task);
    Ok(())
}

/// Plans the owner-local day at startup and again each time the date changes.
async fn run_planner(calendar: Arc<CalendarService>, owner_id: String, mut shutdown: watch::Receiver<bool>) {
    let mut planned: Option<NaiveDate> = None;
    let mut ticker = tokio::time::interval(PLANNER_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = timezone::now();
                let today = calendar.today(now);
                if planned == Some(today) {
                    continue;
                }
                match calendar.plan_day(&owner_id, today, now).await {
                    Ok(_) => planned = Some(today),
                    Err(e) => tracing::error!(%today, error = %e, "daily planning failed; will retry"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("planner stopped");
                    break;
                }
            }
        }
    }
}
