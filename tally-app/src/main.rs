use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tally_common::observability::init_logging;
use tally_config::{TallyConfig, TallyConfigLoader};
use tally_http::HttpClient;
use tally_social::twitter::{ConsumerCredentials, TwitterApi, TwitterAuth};

use checkin::CheckinStats;
use prompt::StdinPrompt;
use roster::Roster;

mod checkin;
mod prompt;
mod roster;

const DEFAULT_CONFIG_FILE: &str = "tally.yaml";

/// Collect public tweet counts for a team roster or a list of usernames.
#[derive(Debug, Parser)]
#[command(name = "tally", version, about)]
struct Cli {
    /// Roster JSON (teams → sub_teams → members) to annotate with stats.
    #[arg(short, long, required_unless_present = "users", conflicts_with = "users")]
    input: Option<PathBuf>,

    /// Comma-separated usernames to look up instead of a roster.
    #[arg(short, long, value_delimiter = ',')]
    users: Vec<String>,

    /// Check-in log for the week.
    #[arg(short, long, requires = "input")]
    checkin: Option<PathBuf>,

    /// Write the result here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file; `tally.yaml` in the working directory is used if present.
    #[arg(long, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Load config (env wins)
    let loader = match &cli.config {
        Some(path) => TallyConfigLoader::new().with_file(path),
        None => TallyConfigLoader::new().with_optional_file(DEFAULT_CONFIG_FILE),
    };
    let cfg = loader.load().context("failed to load configuration")?;

    let log_file = init_logging(cfg.logging.log_config())?;
    tracing::info!(log_file = %log_file.display(), twitter = ?cfg.twitter, "tally.start");
    cfg.validate()?;

    run(cli, cfg).await
}

async fn run(cli: Cli, cfg: TallyConfig) -> Result<()> {
    // Input problems should surface before the interactive step.
    let mut roster = match &cli.input {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read roster {}", path.display()))?;
            Some(Roster::from_json(&raw)?)
        }
        None => None,
    };
    let checkins = match &cli.checkin {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read check-in log {}", path.display()))?;
            CheckinStats::parse(&raw)?
        }
        None => CheckinStats::default(),
    };
    let users = match &roster {
        Some(r) => r.twitter_handles(),
        None => cli
            .users
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect(),
    };
    tracing::info!(users = users.len(), checkins = checkins.len(), "tally.inputs_loaded");

    let tw = &cfg.twitter;
    let http = HttpClient::new(&tw.api_base)?.with_timeout(tw.timeout());
    let consumer = ConsumerCredentials::new(tw.consumer_key.clone(), tw.consumer_secret.clone());

    let token = TwitterAuth::new(consumer.clone(), http.clone())
        .authorize(&StdinPrompt)
        .await?;

    let api = TwitterApi::new(http, consumer, &token)
        .with_batch_size(tw.batch_size)
        .with_pause(tw.pause());
    let counts = api.fetch_tweet_counts(&users).await?;
    tracing::info!(found = counts.len(), requested = users.len(), "tally.counts_fetched");

    let rendered = match roster.as_mut() {
        Some(r) => {
            r.append_stats(&chrono::Local::now(), &counts, &checkins);
            serde_json::to_string_pretty(r)?
        }
        None => {
            let sorted: BTreeMap<&String, &u64> = counts.iter().collect();
            serde_json::to_string_pretty(&sorted)?
        }
    };

    match &cli.output {
        Some(path) => {
            std::fs::write(path, rendered + "\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(output = %path.display(), "tally.report_written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}
