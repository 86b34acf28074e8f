//! Watch one Binance USD-M futures market until Ctrl-C
//!
//! The symbol comes from `MARKET_SYMBOL` (default BTCUSDT); log verbosity from
//! `RUST_LOG`.

use anyhow::Result;
use market_stream::{BinanceRestClient, MarketView, StreamConfig, StreamSession, WsTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("watch_market=info".parse()?)
                .add_directive("market_stream=info".parse()?),
        )
        .with_target(false)
        .init();

    let symbol = std::env::var("MARKET_SYMBOL").unwrap_or_else(|_| "BTCUSDT".to_string());
    let config = StreamConfig::new(symbol);
    config.validate()?;

    let source = Arc::new(BinanceRestClient::from_config(&config)?);
    let transport = Arc::new(WsTransport::new(config.ws_base_url.clone()));

    let mut session = StreamSession::new(config.clone(), transport, source.clone())?;
    let mut view = MarketView::new(config, source);
    view.attach(&session);

    view.load_initial().await?;
    session.start().await?;

    let mut report = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = report.tick() => {
                let state = view.snapshot();
                let price = state.ticker().map_or(0.0, |t| t.price);
                let bid = state.order_book().best_bid().map_or(0.0, |l| l.price);
                let ask = state.order_book().best_ask().map_or(0.0, |l| l.price);
                info!(
                    "{} last {:.2} | bid {:.2} ask {:.2} | {} trades, {} candles",
                    state.symbol(),
                    price,
                    bid,
                    ask,
                    state.trades().len(),
                    state.candles().len()
                );
            }
        }
    }

    session.stop().await;
    Ok(())
}
