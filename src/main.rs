use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info};
use simplelog::*;
use sqlx::mysql::MySqlPool;
use tokio::time::{interval, MissedTickBehavior};

use gamehub::config::{Settings, SweepSettings};
use gamehub::controllers;
use gamehub::identity::MySqlDirectory;
use gamehub::protocol::sweep::sweep_inactive;
use gamehub::store::MySqlSessionStore;
use gamehub::tasks::TaskControl;
use gamehub::{AppState, Directory, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    // set up tracing facility
    let _ = SimpleLogger::init(settings.log_level, Config::default());
    info!("Starting..");
    debug!("database_url: {:?}", settings.database_url);

    let pool = MySqlPool::connect(&settings.database_url).await?;
    let sessions = MySqlSessionStore::new(pool.clone());
    sessions.ensure_schema().await?;
    let store: Store = Arc::new(sessions);
    let directory: Directory = Arc::new(MySqlDirectory::new(pool));

    // Shared immutable state
    let state = AppState {
        jwt_secret: settings.jwt_secret.clone(),
        token_duration: settings.token_duration,
        sweep_timeout: settings.sweep.timeout,
    };

    let sweeper = spawn_sweeper(store.clone(), settings.sweep);
    let app = controllers::routes(state, store, directory);

    // Start the server
    debug!("Listening on {}", settings.listen_addr);
    let served = axum::Server::bind(&settings.listen_addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down..");
        })
        .await;

    sweeper.stop().await;
    served?;
    Ok(())
}

// Periodically resolves games abandoned by both or one of their players
fn spawn_sweeper(store: Store, sweep: SweepSettings) -> TaskControl {
    TaskControl::spawn("inactivity sweep", move |mut stopped| async move {
        let mut ticker = interval(sweep.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut stopped => break,
                _ = ticker.tick() => match sweep_inactive(store.as_ref(), Utc::now(), sweep.timeout).await {
                    Ok(report) if report.total > 0 => info!("Inactivity sweep resolved {} games", report.total),
                    Ok(_) => {}
                    Err(err) => error!("Error sweeping inactive games: {:?}", err),
                },
            }
        }
    })
}
