//! Vouch CLI
//!
//! Replays judgment scenarios through the trust-weighted recommender.

mod scenario;
mod settings;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use vouch_core::TimePeriod;
use vouch_store::Clock;
use vouch_engine::{RecommendationRequest, SourceTypeFilter};

use crate::scenario::{Replay, Scenario};
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "vouch")]
#[command(author, version, about = "Vouch: learned trust between sources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,

    /// Settings file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario and print recommendations for a user
    Simulate {
        /// Scenario file (TOML)
        #[arg(short, long)]
        scenario: PathBuf,

        /// User to recommend to
        #[arg(short, long)]
        user: String,

        /// Time period (hour, day, week, month, year, all, recent)
        #[arg(short, long, default_value = "day")]
        period: TimePeriod,

        /// Maximum number of recommendations
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Category name created by the scenario
        #[arg(long, conflicts_with = "any_category")]
        category: Option<String>,

        /// Use connections from every category of the user
        #[arg(long)]
        any_category: bool,

        /// Count every endorsement, trusted or not
        #[arg(long)]
        popular: bool,

        /// Multiplier applied once per older item from the same source (1.0 disables)
        #[arg(long, default_value = "1.0")]
        decay_rate: f64,

        /// Candidate streams (any, user, feed)
        #[arg(long, default_value = "any")]
        source_type: SourceTypeFilter,

        /// Avoid consecutive items from the same sources
        #[arg(long)]
        diversify: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Replay a scenario and print what a user learned to trust
    Weights {
        /// Scenario file (TOML)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Subscriber to inspect
        #[arg(short, long)]
        user: String,
    },

    /// Replay a scenario and print the pages a user was shown
    History {
        /// Scenario file (TOML)
        #[arg(short, long)]
        scenario: PathBuf,

        /// User whose visits to show
        #[arg(short, long)]
        user: String,

        /// Time period of the visits
        #[arg(short, long, default_value = "day")]
        period: TimePeriod,
    },

    /// Print effective settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate {
            scenario,
            user,
            period,
            limit,
            category,
            any_category,
            popular,
            decay_rate,
            source_type,
            diversify,
            json,
        } => {
            let replay = Replay::run(&Scenario::load(&scenario)?, &settings).await?;

            let mut request = RecommendationRequest::new(user.as_str())
                .with_time_period(period)
                .with_limit(limit)
                .with_decay_rate(decay_rate)
                .with_source_type(source_type);
            if let Some(name) = category {
                request = request.with_category(Some(replay.category(&user, &name)?));
            }
            if any_category {
                request = request.any_category();
            }
            if popular {
                request = request.include_popular();
            }
            if diversify {
                request = request.diversify();
            }

            let recommendations = replay.recommender.recommend(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&recommendations)?);
            } else if recommendations.is_empty() {
                println!("No recommendations for {} ({})", user, period);
            } else {
                println!("{:>4}  {:>10}  {:>5}  {:>5}  url", "#", "weight", "users", "feeds");
                for (rank, r) in recommendations.iter().enumerate() {
                    println!(
                        "{:>4}  {:>10.6}  {:>5}  {:>5}  {}",
                        rank + 1,
                        r.weight,
                        r.user_count,
                        r.feed_count,
                        r.destination_url.as_deref().unwrap_or("?")
                    );
                }
            }
        }
        Commands::Weights { scenario, user } => {
            let replay = Replay::run(&Scenario::load(&scenario)?, &settings).await?;
            let connections = replay.store.connections_of(&user);
            if connections.is_empty() {
                bail!("{} has no connections after replay", user);
            }
            let now = replay.clock.now();
            println!(
                "{:>10}  {:>6}  pol  {:<12}  publisher",
                "weight", "shared", "active (d)"
            );
            for connection in connections {
                let active = connection
                    .active_days(now)
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                println!(
                    "{:>10.6}  {:>6}  {:>3}  {:<12}  {} (as {})",
                    connection.weight,
                    connection.num_shared_items,
                    connection.key.polarity,
                    if active.is_empty() { "-" } else { active.as_str() },
                    connection.publisher(),
                    connection.subscriber()
                );
            }
        }
        Commands::History {
            scenario,
            user,
            period,
        } => {
            let replay = Replay::run(&Scenario::load(&scenario)?, &settings).await?;
            let past = replay.store.past_recommendations();
            let sessions: Vec<_> = past
                .sessions(&user)
                .into_iter()
                .filter(|s| s.time_period == period)
                .collect();
            if sessions.is_empty() {
                println!("{} has no {} visits", user, period);
                return Ok(());
            }
            for session in &sessions {
                println!(
                    "session {}: {} shown, weight min {:.6} / median {:.6} / max {:.6}",
                    session.session_number,
                    session.recommendation_count,
                    session.min_weight,
                    session.median_weight,
                    session.max_weight
                );
            }
            println!("\nLast page:");
            for (rank, r) in past.last_page(&user, period)?.iter().enumerate() {
                println!(
                    "{:>4}  {:>10.6}  {}",
                    rank + 1,
                    r.weight,
                    r.destination_url.as_deref().unwrap_or("?")
                );
            }
        }
        Commands::Config => {
            print!("{}", settings.to_toml()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_decay_rate_help_describes_per_source_decay() {
        let command = Cli::command();
        let simulate = command.find_subcommand("simulate").unwrap();
        let decay = simulate
            .get_arguments()
            .find(|arg| arg.get_id() == "decay_rate")
            .unwrap();
        let help = decay.get_help().unwrap().to_string();
        assert!(help.contains("older item from the same source"));
        assert!(!help.contains("hour"));
    }
}
