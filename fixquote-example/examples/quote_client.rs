/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Quote Client Example
//!
//! Logs on, asks for one BTC-USDC call quote and logs out.
//!
//! Settings come from the environment:
//! `SOCKET_CONNECT_HOST`, `SOCKET_CONNECT_PORT`, `SENDER_COMP_ID`,
//! `TARGET_COMP_ID` (default `STS`), `USERNAME`, `CREDENTIAL` (the bearer
//! token), and optionally `ACCOUNT`, `STRIKE_PRICE` (default 150000) and
//! `MATURITY` (`YYYYMMDD`, default 20251231).

use anyhow::{Context, bail};
use chrono::NaiveDate;
use fixquote::prelude::*;
use rust_decimal::Decimal;
use std::env;
use tracing::{info, warn};

const DEFAULT_TARGET: &str = "STS";
const DEFAULT_STRIKE: &str = "150000";
const DEFAULT_MATURITY: &str = "20251231";

/// Example configuration loaded from environment variables.
#[derive(Debug)]
struct ExampleConfig {
    host: String,
    port: u16,
    sender_comp_id: String,
    target_comp_id: String,
    username: String,
    credential: String,
    account: Option<String>,
    strike: Decimal,
    maturity: NaiveDate,
}

impl ExampleConfig {
    fn from_env() -> anyhow::Result<Self> {
        let required = [
            "SOCKET_CONNECT_HOST",
            "SOCKET_CONNECT_PORT",
            "SENDER_COMP_ID",
            "USERNAME",
            "CREDENTIAL",
        ];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|name| env::var(name).map_or(true, |v| v.is_empty()))
            .collect();
        if !missing.is_empty() {
            bail!("missing environment variables: {}", missing.join(", "));
        }

        let strike = env::var("STRIKE_PRICE").unwrap_or_else(|_| DEFAULT_STRIKE.to_string());
        let maturity = env::var("MATURITY").unwrap_or_else(|_| DEFAULT_MATURITY.to_string());
        Ok(Self {
            host: env::var("SOCKET_CONNECT_HOST")?,
            port: env::var("SOCKET_CONNECT_PORT")?
                .parse()
                .context("SOCKET_CONNECT_PORT is not a port number")?,
            sender_comp_id: env::var("SENDER_COMP_ID")?,
            target_comp_id: env::var("TARGET_COMP_ID")
                .unwrap_or_else(|_| DEFAULT_TARGET.to_string()),
            username: env::var("USERNAME")?,
            credential: env::var("CREDENTIAL")?,
            account: env::var("ACCOUNT").ok().filter(|a| !a.is_empty()),
            strike: strike
                .parse()
                .with_context(|| format!("STRIKE_PRICE {strike:?} is not a number"))?,
            maturity: NaiveDate::parse_from_str(&maturity, "%Y%m%d")
                .with_context(|| format!("MATURITY {maturity:?} is not YYYYMMDD"))?,
        })
    }
}

/// Initializes logging for examples.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cfg = ExampleConfig::from_env()?;

    let session = SessionConfigBuilder::new()
        .sender_comp_id(cfg.sender_comp_id.as_str())
        .target_comp_id(cfg.target_comp_id.as_str())
        .username(cfg.username.as_str())
        .build()?;
    let mut quote_config = QuoteConfig::new();
    if let Some(account) = &cfg.account {
        quote_config = quote_config.with_account(account.as_str());
    }
    let config = ClientBuilder::new()
        .with_endpoint(cfg.host.as_str(), cfg.port)
        .with_credentials(ClientCredentials::new(
            cfg.username.as_str(),
            cfg.credential.as_str(),
        ))
        .with_session(session)
        .with_quote_config(quote_config)
        .build()?;

    info!("Connecting to {}", config.addr());
    let tokens = StaticTokenProvider::new(cfg.credential.as_str());
    let mut client = QuoteClient::connect(config, &tokens)
        .await
        .context("logon failed")?;

    let mut events = client.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::Disconnected(reason) => info!(%reason, "session ended"),
                other => warn!(event = ?other, "session event"),
            }
        }
    });

    let params = QuoteRequestParams::builder("BTC-USDC", cfg.strike, cfg.maturity)
        .side(Side::Sell)
        .build()?;
    info!(
        "Requesting {} call, strike {}, expiry {}",
        params.underlying_symbol, params.strike, params.maturity
    );

    match client.quote(params).await {
        Ok(quote) => {
            info!("Quote {} received", quote.quote_id.as_deref().unwrap_or("-"));
            match (quote.fee, quote.fee_source) {
                (Some(fee), Some(source)) => info!("Fee: {fee} from {source}"),
                _ => warn!("Quote carried no fee field"),
            }
            if let Some(valid_until) = &quote.valid_until {
                info!("Valid until {valid_until}");
            }
        }
        Err(err) => warn!(error = %err, "no quote"),
    }

    client.logout(None).await?;
    Ok(())
}
