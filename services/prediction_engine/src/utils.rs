use anyhow::{Context, Result};

use crate::types::{Outcome, ScorePick};

/// Parses an exact score pick written as `home-away`, e.g. `2-1`.
pub fn parse_score_pick(score: &str) -> Result<ScorePick> {
    let parts: Vec<&str> = score.split('-').collect();
    if parts.len() != 2 {
        anyhow::bail!("Invalid score format: {}", score);
    }

    let home = parts[0]
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid home score: {}", parts[0]))?;
    let away = parts[1]
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid away score: {}", parts[1]))?;

    Ok(ScorePick::Exact { home, away })
}

pub fn parse_outcome(value: &str) -> Result<Outcome> {
    Outcome::parse(value)
        .ok_or_else(|| anyhow::anyhow!("Invalid outcome: {} (expected HOME, DRAW or AWAY)", value))
}
