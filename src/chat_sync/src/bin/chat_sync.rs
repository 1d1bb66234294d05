use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use market_datafeed::{
    Datafeed, PeriodParams, models::resolution::Resolution, providers::rest::RestProvider,
};
use shared_utils::config::{DashboardConfig, load_config_path};

use chat_sync::{
    ChatService, Notifier,
    resources::{ResourceStore, memory::InMemoryStore, rest::RestResourceClient},
    transport::HttpChatTransport,
};

#[derive(Parser)]
#[command(version, about = "Chat-to-dashboard sync CLI")]
struct Cli {
    /// TOML config; defaults apply when omitted.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run one chat turn and print the commit report.
    Ask {
        #[arg(long)]
        chat_id: String,
        #[arg(long)]
        message: String,
        /// Commit to an in-memory store instead of the resource backend.
        #[arg(long)]
        offline: bool,
    },
    /// Page bars through the caching datafeed.
    Bars {
        #[arg(long)]
        chart_id: String,
        #[arg(long, value_name = "EX:SYM")]
        symbol: String,
        #[arg(long, default_value = "1D")]
        resolution: Resolution,
        #[arg(long)]
        from: DateTime<Utc>,
        #[arg(long)]
        to: DateTime<Utc>,
    },
    /// Resolve EXCHANGE:SYMBOL against upstream search.
    Resolve {
        #[arg(long, value_name = "EX:SYM")]
        symbol: String,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<DashboardConfig> {
    let mut config = match path {
        Some(p) => load_config_path(p).with_context(|| format!("loading {}", p.display()))?,
        None => DashboardConfig::default(),
    };
    config.apply_env_overrides();
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn datafeed(config: &DashboardConfig, chart_id: &str) -> Result<Datafeed> {
    let provider = RestProvider::from_config(&config.market_data).context("creating market data provider")?;
    Ok(Datafeed::with_lookback(
        chart_id,
        Arc::new(provider),
        config.market_data.lookback_bars,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.cmd {
        Cmd::Ask {
            chat_id,
            message,
            offline,
        } => {
            let store: Arc<dyn ResourceStore> = if offline {
                Arc::new(InMemoryStore::new())
            } else {
                Arc::new(RestResourceClient::new(&config.resources.base_url))
            };
            let transport = Arc::new(HttpChatTransport::new(config.chat.endpoint.clone()));
            let notifier = Notifier::default();
            let mut notifications = notifier.subscribe();

            let service = ChatService::new(store, transport, notifier)
                .with_inactivity_timeout(config.chat.inactivity_timeout());
            if let Err(e) = service.load_chat(&chat_id).await {
                tracing::warn!(chat_id = %chat_id, error = %e, "could not load chat history");
            }

            let report = service
                .submit_message(&chat_id, &message)
                .await
                .context("chat turn failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            while let Ok(n) = notifications.try_recv() {
                println!("{}", serde_json::to_string(&n)?);
            }
        }
        Cmd::Bars {
            chart_id,
            symbol,
            resolution,
            from,
            to,
        } => {
            let feed = datafeed(&config, &chart_id)?;
            let info = feed.resolve_symbol(&symbol).await?;
            let response = feed
                .get_bars(
                    &info,
                    resolution,
                    PeriodParams {
                        from,
                        to,
                        first_data_request: true,
                    },
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            feed.teardown().await;
        }
        Cmd::Resolve { symbol } => {
            let feed = datafeed(&config, "cli")?;
            let info = feed.resolve_symbol(&symbol).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
    }

    Ok(())
}
