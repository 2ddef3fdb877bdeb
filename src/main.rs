//! Cross-venue prediction-market arbitrage engine — CLI entry point.
//!
//! Grounded on the teacher's entrypoint shape (`dotenv` + `tracing_subscriber` init at the top of
//! `main`) and `scanner/runner.py::main`'s responsibility split: parse config, build both venue
//! clients, build the matcher/finder/executor, and hand off to the runner loop. The `--paper` flag
//! selects which `TradeExecutor` implementation the runner drives (design note 9's executor
//! factory), so the scan/match/find pipeline is identical in both modes.

use anyhow::{Context, Result};
use clap::Parser;
use dualmkt_arb::config::Config;
use dualmkt_arb::executor::{ArbExecutor, TradeExecutor};
use dualmkt_arb::paper::PaperExecutor;
use dualmkt_arb::persistence::Store;
use dualmkt_arb::runner::Runner;
use dualmkt_arb::schedule::{CachedScheduleValidator, HttpScheduleOracle};
use dualmkt_arb::venues::venue_a::VenueAClient;
use dualmkt_arb::venues::venue_b::VenueBClient;
use dualmkt_arb::venues::{OrderClient, VenueClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "dualmkt-arb", about = "Cross-venue prediction-market arbitrage scanner")]
struct Cli {
    /// Run against a virtual wallet instead of placing live orders.
    #[arg(long, env = "ARB_PAPER")]
    paper: bool,

    #[arg(long, default_value = "arb.log")]
    log_file: PathBuf,

    #[arg(long, default_value = "arb_opportunities.log")]
    opportunities_log_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dualmkt_arb::logging::init(&cli.log_file, &cli.opportunities_log_file)
        .context("failed to initialize logging")?;

    let cfg = Config::from_env();
    info!(paper_mode = cli.paper, "starting arbitrage engine");

    let venue_a = Arc::new(
        VenueAClient::new(&cfg).context("venue-a credentials missing from environment")?,
    );
    let venue_b = Arc::new(VenueBClient::new(&cfg));

    let paper_handle = cli.paper.then(|| Arc::new(PaperExecutor::new(cfg.clone())));
    let executor: Arc<dyn TradeExecutor> = match &paper_handle {
        Some(paper) => paper.clone(),
        None => {
            let order_a: Arc<dyn OrderClient> = venue_a.clone();
            let order_b: Arc<dyn OrderClient> = venue_b.clone();
            Arc::new(ArbExecutor::new(order_a, order_b, cfg.clone()))
        }
    };

    let db_path = if cli.paper { &cfg.paper_db_path } else { &cfg.live_db_path };
    let store = Store::open(db_path).context("failed to open trades database")?;

    let schedule = Arc::new(CachedScheduleValidator::new(Box::new(HttpScheduleOracle::new(&cfg))));

    let client_a: Arc<dyn VenueClient> = venue_a;
    let client_b: Arc<dyn VenueClient> = venue_b;
    let runner = Runner::new(cfg, client_a, client_b, executor, store, Some(schedule));

    tokio::select! {
        _ = runner.run_forever() => unreachable!("runner loop never returns"),
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, exiting");
        }
    }

    if let Some(paper) = paper_handle {
        let report = paper.report();
        info!(
            total_trades = report.total_trades,
            total_invested_usd = report.total_invested_usd,
            total_gross_profit_usd = report.total_gross_profit_usd,
            total_fees_usd = report.total_fees_usd,
            total_profit_usd = report.total_profit_usd,
            average_profit_usd = report.average_profit_usd,
            deployed_pct = report.deployed_pct,
            roi_pct = report.roi_pct,
            ending_venue_a_cash = report.ending_venue_a_cash,
            ending_venue_b_cash = report.ending_venue_b_cash,
            "paper session summary"
        );
    }

    Ok(())
}
