use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures::future::join_all;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quotagate::config::QuotagateConfig;
use quotagate::duration::{format_duration, parse_duration};
use quotagate::ratelimit::RateLimitResult;
use quotagate::store;
use quotagate::strategy::StrategyRegistry;
use quotagate::RateLimiter;

#[derive(Debug, Parser)]
#[command(name = "quotagate", version, about = "Windowed admission control")]
struct Cli {
    /// YAML settings file, overlaid with QUOTAGATE__* environment variables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run admission checks against a key and print each result
    Check {
        key: String,

        /// Number of checks to issue
        #[arg(short = 'n', long, default_value_t = 1)]
        times: usize,

        /// Issue all checks at once instead of one after another
        #[arg(long)]
        concurrent: bool,

        #[arg(long)]
        limit: Option<u64>,

        #[arg(long)]
        duration: Option<String>,

        #[arg(long)]
        strategy: Option<String>,
    },

    /// List registered strategy names
    Strategies,

    /// Convert duration text to milliseconds
    Duration { text: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Check {
            key,
            times,
            concurrent,
            limit,
            duration,
            strategy,
        } => {
            let mut config = QuotagateConfig::load(cli.config.as_deref())?;
            if let Some(limit) = limit {
                config.limiter.limit = limit;
            }
            if let Some(duration) = duration {
                config.limiter.duration = duration;
            }
            if let Some(strategy) = strategy {
                config.limiter.strategy = strategy;
            }
            config.limiter.validate()?;

            let store = store::connect(&config.store).await?;
            let limiter = RateLimiter::new(store, config.limiter.to_options());
            info!(
                limit = config.limiter.limit,
                duration = %config.limiter.duration,
                strategy = %config.limiter.strategy,
                "Rate limiter initialized"
            );

            let results = if concurrent {
                join_all((0..times).map(|_| limiter.check(&key)))
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                let mut results = Vec::with_capacity(times);
                for _ in 0..times {
                    results.push(limiter.check(&key).await?);
                }
                results
            };

            for result in &results {
                println!("{}", serde_json::to_string(result)?);
            }
            summarize(&results);
        }
        Command::Strategies => {
            for name in StrategyRegistry::new().names() {
                println!("{}", name);
            }
        }
        Command::Duration { text } => {
            let millis = parse_duration(&text)?;
            println!("{} ({})", millis, format_duration(millis));
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn summarize(results: &[RateLimitResult]) {
    let allowed = results.iter().filter(|r| r.allowed).count();
    info!(
        allowed,
        denied = results.len() - allowed,
        "Checks complete"
    );
}
