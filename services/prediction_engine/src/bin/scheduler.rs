use anyhow::Result;
use chrono::Utc;
use dotenv::dotenv;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use bounty_prediction_engine::config::EngineConfig;
use bounty_prediction_engine::metrics::MetricsCollector;
use bounty_prediction_engine::web::{self, AppState};
use bounty_prediction_engine::Engine;

/// Runs `job` every `period`, starting immediately. A slow run delays the
/// next tick instead of stacking runs.
fn every<F, Fut>(name: &'static str, period: Duration, engine: Engine, job: F) -> JoinHandle<()>
where
    F: Fn(Engine) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Scheduling {} every {:?}", name, period);
        loop {
            ticker.tick().await;
            job(engine.clone()).await;
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = EngineConfig::from_env();
    let engine = Engine::from_config(&config, MetricsCollector::new()).await?;
    let schedule = &config.schedule;

    let jobs = vec![
        every(
            "fixture-ingestion",
            Duration::from_secs(schedule.fixture_ingestion_secs),
            engine.clone(),
            |engine| async move {
                let report = engine.run_fixture_ingestion(Utc::now()).await;
                info!("Fixture ingestion: {:?}", report);
            },
        ),
        every(
            "live-refresh",
            Duration::from_secs(schedule.live_refresh_secs),
            engine.clone(),
            |engine| async move {
                let report = engine.run_live_refresh().await;
                info!("Live refresh: {:?}", report);
            },
        ),
        every(
            "result-refresh",
            Duration::from_secs(schedule.result_refresh_secs),
            engine.clone(),
            |engine| async move {
                let report = engine.run_result_refresh(Utc::now()).await;
                info!("Result refresh: {:?}", report);
            },
        ),
        every(
            "event-housekeeping",
            Duration::from_secs(schedule.housekeeping_secs),
            engine.clone(),
            |engine| async move {
                let finished = engine.run_event_housekeeping(Utc::now()).await;
                info!("Event housekeeping finished {} events", finished);
            },
        ),
    ];

    let state = AppState { engine };
    let bind_addr = config.web.bind_addr.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = web::serve(state, &bind_addr).await {
            error!("Web server stopped: {}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    for job in jobs {
        job.abort();
    }
    server.abort();

    Ok(())
}
