//! hb-probe: runs one header-bidding auction against simulated demand
//! sources and prints the decision as JSON.

use clap::Parser;
use hb_bidders::{CannedTransport, DirectDemandRequester, BidOrchestrator, HeaderBiddingAuction};
use hb_core::config::{AppConfig, DirectDemandConfig};
use hb_core::SlotConfiguration;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hb-probe")]
#[command(about = "Run a simulated header-bidding auction for one ad slot")]
#[command(version)]
struct Cli {
    /// Slot placement identifier
    #[arg(long, default_value = "slot-home-banner")]
    config_id: String,

    /// Slot width in pixels
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Slot height in pixels
    #[arg(long, default_value_t = 50)]
    height: u32,

    /// Per-request deadline in milliseconds (overrides config)
    #[arg(long, env = "HEADER_BIDDING__BIDDING__DEFAULT_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Simulated primary auction price (omit for no-fill)
    #[arg(long)]
    prebid_price: Option<f64>,

    /// Simulated primary auction latency in milliseconds
    #[arg(long, default_value_t = 150)]
    prebid_latency_ms: u64,

    /// Simulated direct-demand price (omit for no-fill)
    #[arg(long)]
    direct_price: Option<f64>,

    /// Simulated direct-demand latency in milliseconds
    #[arg(long, default_value_t = 90)]
    direct_latency_ms: u64,

    /// Flag the direct-demand bid as owned-and-operated
    #[arg(long, default_value_t = false)]
    owned_operated: bool,
}

fn canned_body(bidder_code: &str, price: Option<f64>, owned_operated: bool, width: u32, height: u32) -> String {
    let Some(price) = price else {
        return String::new();
    };
    json!({
        "id": format!("{bidder_code}-response"),
        "seatbid": [{
            "seat": bidder_code,
            "bid": [{
                "id": format!("{bidder_code}-bid-1"),
                "impid": "1",
                "price": price,
                "w": width,
                "h": height,
                "adm": "<div>creative</div>",
                "ext": { bidder_code: { "oo": owned_operated } }
            }]
        }]
    })
    .to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hb_probe=info,hb_bidders=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(timeout_ms) = cli.timeout_ms {
        config.bidding.default_timeout_ms = timeout_ms;
    }

    info!(
        node_id = %config.node_id,
        timeout_ms = config.bidding.default_timeout_ms,
        direct_enabled = config.direct_demand.enabled,
        "Configuration loaded"
    );

    let slot = SlotConfiguration::banner(cli.config_id.clone(), cli.width, cli.height);
    slot.validate()?;

    let tmax = config.bidding.default_timeout();
    let mut auction = HeaderBiddingAuction::new(BidOrchestrator::new(config.bidding.clone()));

    let prebid = DirectDemandConfig {
        bidder_code: "prebid".to_string(),
        ..DirectDemandConfig::default()
    };
    let prebid_body = canned_body(&prebid.bidder_code, cli.prebid_price, false, cli.width, cli.height);
    auction.register(Arc::new(DirectDemandRequester::new(
        prebid,
        Arc::new(CannedTransport::ok(prebid_body, Duration::from_millis(cli.prebid_latency_ms))),
        tmax,
    )));

    if config.direct_demand.enabled {
        let direct_body = canned_body(
            &config.direct_demand.bidder_code,
            cli.direct_price,
            cli.owned_operated,
            cli.width,
            cli.height,
        );
        auction.register(Arc::new(DirectDemandRequester::new(
            config.direct_demand.clone(),
            Arc::new(CannedTransport::ok(direct_body, Duration::from_millis(cli.direct_latency_ms))),
            tmax,
        )));
    }

    let result = auction.run(slot, None).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
