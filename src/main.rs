//! STALK ORACLE: turnip price pattern prediction
//!
//! Entry point. Loads configuration and the rate table, initialises
//! structured logging, and either predicts a week from the command line or
//! a week file, or simulates a week and predicts it from a prefix.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{debug, info, warn};

use stalk_oracle::config::{self, AppConfig};
use stalk_oracle::engine::Predictor;
use stalk_oracle::rates::RateTable;
use stalk_oracle::sim;
use stalk_oracle::storage::{self, WeekRecord};
use stalk_oracle::types::{Observations, Pattern, PredictionSet, PriceRange, SLOT_COUNT, SLOT_LABELS};

#[derive(Debug, Parser)]
#[command(name = "stalk-oracle", version, about = "Predict turnip prices for the week")]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(long, env = "STALK_CONFIG", default_value = config::DEFAULT_CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Predict patterns and prices from a purchase price and quotes.
    Predict(PredictArgs),
    /// Sample a week from the rate table and predict it from a prefix.
    Simulate(SimulateArgs),
}

#[derive(Debug, Args)]
struct PredictArgs {
    /// Purchase price paid on Sunday.
    #[arg(long)]
    buy: Option<u32>,

    /// Quotes seen so far, Monday AM onwards (comma separated).
    #[arg(long, value_delimiter = ',')]
    quotes: Vec<u32>,

    /// Last week's pattern.
    #[arg(long)]
    previous: Option<Pattern>,

    /// First week buying on this island.
    #[arg(long)]
    first_buy: bool,

    /// Only consider this pattern.
    #[arg(long)]
    pattern: Option<Pattern>,

    /// Week file to read; updated when --buy or --quotes are given.
    #[arg(long)]
    week: Option<String>,

    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct SimulateArgs {
    /// RNG seed; random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Last week's pattern.
    #[arg(long)]
    previous: Option<Pattern>,

    #[arg(long)]
    first_buy: bool,

    /// Number of quotes revealed to the predictor.
    #[arg(long, default_value_t = 6)]
    observed: usize,

    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load_or_default(&cli.config)?;

    init_logging(&cfg);

    let table = match cfg.engine.rate_table.as_deref() {
        Some(path) => RateTable::load(path)
            .with_context(|| format!("Failed to load rate table {path}"))?,
        None => RateTable::builtin().context("Built-in rate table is invalid")?,
    };
    info!(
        version = %table.version(),
        max_tolerance = cfg.engine.max_tolerance,
        "Stalk oracle starting up"
    );

    let predictor = Predictor::new(Arc::new(table)).with_max_tolerance(cfg.engine.max_tolerance);

    match cli.command {
        Command::Predict(args) => predict(&predictor, args),
        Command::Simulate(args) => simulate(&predictor, args),
    }
}

fn predict(predictor: &Predictor, args: PredictArgs) -> Result<()> {
    let obs = match args.week.as_deref() {
        Some(path) => {
            let today = Local::now().date_naive();
            let mut record = storage::load_week(Some(path))?.unwrap_or_else(|| WeekRecord::new(today));
            let updated = apply_overrides(&mut record, &args);
            if updated {
                storage::save_week(&record, Some(path))?;
                info!(path, id = %record.id, "Week file updated");
            }
            record.observations()
        }
        None => {
            let mut obs = Observations::new()
                .with_previous_pattern(args.previous)
                .with_first_buy(args.first_buy)
                .with_pattern_filter(args.pattern);
            if let Some(buy) = args.buy {
                obs = obs.with_buy_price(buy);
            }
            if args.quotes.len() > SLOT_COUNT {
                warn!(given = args.quotes.len(), "More than twelve quotes, extra ignored");
            }
            for &price in args.quotes.iter().take(SLOT_COUNT) {
                obs.push_quote(price);
            }
            obs
        }
    };

    let set = predictor.predict(&obs);
    debug!(results = set.results.len(), fallback = set.is_fallback(), "Prediction ready");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&set)?);
    } else {
        print_prediction(&obs, &set);
    }
    Ok(())
}

/// Fold command-line values into a stored week. Returns true if anything
/// changed.
fn apply_overrides(record: &mut WeekRecord, args: &PredictArgs) -> bool {
    let mut changed = false;
    if let Some(buy) = args.buy {
        record.buy_price = Some(buy);
        changed = true;
    }
    if !args.quotes.is_empty() {
        record.prices = (0..SLOT_COUNT).map(|i| args.quotes.get(i).copied()).collect();
        changed = true;
    }
    if args.previous.is_some() {
        record.previous_pattern = args.previous;
        changed = true;
    }
    if args.first_buy && !record.first_buy {
        record.first_buy = true;
        changed = true;
    }
    if args.pattern.is_some() {
        record.pattern_filter = args.pattern;
        changed = true;
    }
    changed
}

fn simulate(predictor: &Predictor, args: SimulateArgs) -> Result<()> {
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let week = sim::sample_week(predictor.table(), args.previous, args.first_buy, &mut rng);
    let obs = week.observations(args.observed, args.previous, args.first_buy);
    let set = predictor.predict(&obs);

    info!(seed, pattern = %week.pattern, observed = obs.observed_count(), "Week simulated");

    if args.json {
        let out = serde_json::json!({
            "seed": seed,
            "week": week,
            "prediction": set,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Seed {seed}: {} week, bought at {}", week.pattern, week.buy_price);
    let quotes: Vec<String> = week.quotes.iter().map(u32::to_string).collect();
    println!("Quotes: {}", quotes.join(", "));
    println!();
    print_prediction(&obs, &set);
    Ok(())
}

fn print_prediction(obs: &Observations, set: &PredictionSet) {
    let Some(buy) = obs.buy_price() else {
        println!("No purchase price, nothing to predict.");
        return;
    };

    println!(
        "Bought at {buy}, {} of {SLOT_COUNT} quotes observed",
        obs.observed_count()
    );
    if set.tolerance > 0 && !set.is_fallback() {
        println!("(matched with {} Bell tolerance)", set.tolerance);
    }
    if let Some(pattern) = obs.pattern_filter() {
        println!("(only considering {pattern})");
    }
    println!();
    println!("{:<14} {:>7}  {:>9}  {}", "Pattern", "Chance", "Range", "Outlook");
    for result in &set.results {
        println!(
            "{:<14} {:>6.1}%  {:>9}  {}",
            result.pattern.to_string(),
            result.probability * 100.0,
            result.range().to_string(),
            result.range().outlook(buy)
        );
    }
    if let Some(envelope) = set.envelope {
        println!("{:<14} {:>7}  {:>9}", "Overall", "", envelope.to_string());
    }

    let Some(top) = set.most_likely() else {
        return;
    };
    println!();
    println!("Most likely: {}. {}", top.pattern, top.description);
    println!("  {:<8} {:>9}  {:>9}", "", top.pattern.to_string(), "Any");
    for (slot, label) in SLOT_LABELS.iter().enumerate() {
        let cell = |slots: &[PriceRange]| slots.get(slot).map(ToString::to_string).unwrap_or_default();
        let seen = obs.quote(slot).map(|q| format!("  (saw {q})")).unwrap_or_default();
        println!("  {label:<8} {:>9}  {:>9}{seen}", cell(&top.slots), cell(&set.slot_envelope));
    }
}

fn init_logging(cfg: &AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.filter));

    let json_logging = cfg.logging.json || std::env::var("STALK_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
