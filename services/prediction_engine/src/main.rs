use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::info;

use bounty_prediction_engine::config::EngineConfig;
use bounty_prediction_engine::metrics::MetricsCollector;
use bounty_prediction_engine::pg_store::PgStore;
use bounty_prediction_engine::types::{EventId, LeagueId, MatchId, ScorePick, UserId};
use bounty_prediction_engine::utils::{parse_outcome, parse_score_pick};
use bounty_prediction_engine::Engine;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Pull fixtures for the day after tomorrow
    IngestFixtures,
    /// Refresh in-play matches and score the ones that just finished
    RefreshLive,
    /// Check started matches for their final result
    RefreshResults,
    /// Mark events whose end has passed as finished
    FinishEvents,
    /// Print an event leaderboard as JSON
    Leaderboard {
        #[arg(short, long)]
        event_id: EventId,
    },
    /// Submit or update a prediction
    Predict {
        #[arg(short, long)]
        user_id: UserId,
        #[arg(short, long)]
        match_id: MatchId,
        /// HOME, DRAW or AWAY
        #[arg(short, long)]
        outcome: String,
        /// Exact score pick such as 2-1
        #[arg(short, long)]
        score: Option<String>,
    },
    /// Print yesterday's, today's and tomorrow's matches for a user as JSON
    DayFeed {
        #[arg(short, long)]
        user_id: UserId,
        #[arg(short, long = "league")]
        leagues: Vec<LeagueId>,
    },
    /// Create the database tables
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    if let Commands::Migrate = cli.command {
        let store = PgStore::connect(&config)
            .await
            .context("Failed to connect to the database")?;
        store.ensure_schema().await.context("Failed to create the schema")?;
        info!("Schema is up to date");
        return Ok(());
    }

    let engine = Engine::from_config(&config, MetricsCollector::new()).await?;

    match cli.command {
        Commands::IngestFixtures => {
            let report = engine.run_fixture_ingestion(Utc::now()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::RefreshLive => {
            let report = engine.run_live_refresh().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::RefreshResults => {
            let report = engine.run_result_refresh(Utc::now()).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::FinishEvents => {
            let finished = engine.run_event_housekeeping(Utc::now()).await;
            println!("Finished {} events", finished);
        }
        Commands::Leaderboard { event_id } => {
            let leaderboard = engine.compute_event_leaderboard(event_id).await?;
            println!("{}", serde_json::to_string_pretty(&leaderboard)?);
        }
        Commands::Predict {
            user_id,
            match_id,
            outcome,
            score,
        } => {
            let outcome = parse_outcome(&outcome)?;
            let score_pick = match score {
                Some(score) => parse_score_pick(&score)?,
                None => ScorePick::None,
            };
            let prediction = engine
                .predictions()
                .submit_prediction(user_id, match_id, outcome, score_pick, Utc::now())
                .await?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        Commands::DayFeed { user_id, leagues } => {
            let selected = (!leagues.is_empty()).then_some(leagues.as_slice());
            let feeds = engine.day_feeds(user_id, selected, Utc::now().date_naive()).await?;
            println!("{}", serde_json::to_string_pretty(&feeds)?);
        }
        Commands::Migrate => {}
    }

    Ok(())
}
