//! SC-GHG sweep runner
//!
//! Values a sweep of sectors, discount rates, recipes and pulse years with
//! engine outputs archived in the damage function library and writes the
//! SC-GHGs per gas.
//!
//! # Usage
//!
//! ```bash
//! scghg --config scghg.toml \
//!   --sector CAMEL_m1_c0.20 \
//!   --pulse-year 2020,2030 \
//!   --full-distribution
//! ```

use clap::Parser;
use scghg_core::config::{Config, DiscountRatePair};
use scghg_core::engine::{ArchiveEngine, RecipeDiscount, ValuationScope};
use scghg_core::provenance::RunContext;
use scghg_core::sweep::{Sweep, SweepRequest};
use scghg_core::ScghgResult;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Run a Social Cost of Greenhouse Gases sweep
#[derive(Parser, Debug)]
#[command(name = "scghg")]
#[command(about = "Aggregate SC-GHG estimates over a parameter sweep")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "scghg.toml")]
    config: PathBuf,

    /// Comma-separated sector identifiers (default: every configured sector)
    #[arg(short, long, value_delimiter = ',')]
    sector: Vec<String>,

    /// Discount rate pair as ETA:RHO, repeatable (default: configured presets)
    #[arg(short, long, value_parser = parse_pair)]
    discount_rate: Vec<DiscountRatePair>,

    /// Comma-separated pulse years (default: configured pulse years)
    #[arg(short, long, value_delimiter = ',')]
    pulse_year: Vec<i64>,

    /// Recipe and discounting type as RECIPE:DISCOUNTING, repeatable
    /// (default: risk_aversion:euler_ramsey)
    #[arg(short, long)]
    recipe: Vec<RecipeDiscount>,

    /// Value US damages only
    #[arg(long)]
    domestic: bool,

    /// Also write run-level results
    #[arg(long)]
    full_distribution: bool,

    /// Also write the un-pulsed consumption paths
    #[arg(long)]
    consumption_path: bool,
}

fn parse_pair(raw: &str) -> Result<DiscountRatePair, String> {
    let (eta, rho) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected ETA:RHO, got {:?}", raw))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid number {:?} in {:?}: {}", v, raw, e))
    };
    Ok(DiscountRatePair::new(parse(eta)?, parse(rho)?))
}

fn run(args: Args) -> ScghgResult<()> {
    let config = Config::load(&args.config)?;

    let sectors = if args.sector.is_empty() {
        config.sectors.keys().cloned().collect()
    } else {
        args.sector
    };
    let mut request = SweepRequest::from_config(&config, sectors);
    if !args.discount_rate.is_empty() {
        request.discount_rates = args.discount_rate;
    }
    if !args.pulse_year.is_empty() {
        request.pulse_years = args.pulse_year;
    }
    if !args.recipe.is_empty() {
        request.recipe_discounts = args.recipe;
    }
    if args.domestic {
        request.scope = ValuationScope::Domestic;
    }
    request.full_distribution = args.full_distribution;
    request.consumption_path = args.consumption_path;

    let engine = ArchiveEngine;
    let mut sweep = Sweep::new(&config, &engine, RunContext::detect(&config.units));
    if request
        .recipe_discounts
        .iter()
        .any(|c| c.discounting.is_ramsey())
    {
        sweep = sweep.with_population(config.load_population()?);
    }

    let outputs = sweep.run(&request)?;
    let files: usize = outputs.groups.iter().map(|g| g.files.len()).sum();
    info!(groups = outputs.groups.len(), files, "sweep complete");
    println!(
        "SC-GHGs are available in {}",
        config
            .output_root
            .join(format!("{}_scghgs", request.scope))
            .display()
    );
    Ok(())
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
