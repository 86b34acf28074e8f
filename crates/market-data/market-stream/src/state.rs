//! Consumer-side market state
//!
//! [`MarketState`] is a plain container with the bounded-history rules of the
//! view. [`MarketView`] shares one behind a lock, seeds it from the bootstrap
//! loader and keeps it current by subscribing to a [`StreamSession`].

use crate::config::StreamConfig;
use crate::errors::Result;
use crate::models::{Candle, ChannelKind, OrderBookSnapshot, Ticker, Trade};
use crate::rest::MarketDataSource;
use crate::session::{SessionHandle, StreamSession};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Trades kept on the tape
pub const MAX_TRADES: usize = 500;
/// Candles kept in the series
pub const MAX_CANDLES: usize = 500;

/// Snapshot of everything known about one market
#[derive(Debug, Clone, Default, Serialize)]
pub struct MarketState {
    symbol: String,
    ticker: Option<Ticker>,
    order_book: OrderBookSnapshot,
    /// Newest first
    trades: VecDeque<Trade>,
    /// Oldest first
    candles: VecDeque<Candle>,
}

impl MarketState {
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub const fn ticker(&self) -> Option<&Ticker> {
        self.ticker.as_ref()
    }

    #[must_use]
    pub const fn order_book(&self) -> &OrderBookSnapshot {
        &self.order_book
    }

    #[must_use]
    pub const fn trades(&self) -> &VecDeque<Trade> {
        &self.trades
    }

    #[must_use]
    pub const fn candles(&self) -> &VecDeque<Candle> {
        &self.candles
    }

    /// Tickers without a positive price are ignored
    pub fn set_ticker(&mut self, ticker: Ticker) {
        if ticker.price.is_finite() && ticker.price > 0.0 {
            self.ticker = Some(ticker);
        }
    }

    /// An empty book never replaces the current one
    pub fn set_order_book(&mut self, book: OrderBookSnapshot) {
        if !book.is_empty() {
            self.order_book = book;
        }
    }

    pub fn push_trade(&mut self, trade: Trade) {
        if !is_valid_trade(&trade) {
            return;
        }
        self.trades.push_front(trade);
        self.trades.truncate(MAX_TRADES);
    }

    /// Replace the tape with `trades`, given oldest first
    pub fn replace_trades(&mut self, trades: impl IntoIterator<Item = Trade>) {
        self.trades.clear();
        for trade in trades {
            self.push_trade(trade);
        }
    }

    /// Replace the series with `candles`, given oldest first
    pub fn set_candles(&mut self, candles: impl IntoIterator<Item = Candle>) {
        self.candles.clear();
        for candle in candles {
            self.apply_candle(candle);
        }
    }

    /// Merge one candle into the series
    ///
    /// Same bucket as the last candle replaces it in place, a newer bucket is
    /// appended, and an older one is ignored since earlier bars are final.
    pub fn apply_candle(&mut self, candle: Candle) {
        if !(candle.close.is_finite() && candle.close > 0.0) {
            return;
        }
        match self.candles.back_mut() {
            Some(last) if last.time == candle.time => *last = candle,
            Some(last) if last.time > candle.time => {}
            _ => {
                self.candles.push_back(candle);
                if self.candles.len() > MAX_CANDLES {
                    self.candles.pop_front();
                }
            }
        }
    }
}

fn is_valid_trade(trade: &Trade) -> bool {
    trade.price.is_finite()
        && trade.price > 0.0
        && trade.quantity.is_finite()
        && trade.quantity > 0.0
}

/// Shared market state kept in sync with a bootstrap loader and a stream session
#[derive(Clone)]
pub struct MarketView {
    config: StreamConfig,
    source: Arc<dyn MarketDataSource>,
    state: Arc<RwLock<MarketState>>,
    session: Option<SessionHandle>,
}

impl MarketView {
    pub fn new(config: StreamConfig, source: Arc<dyn MarketDataSource>) -> Self {
        let state = MarketState::new(config.symbol.clone());
        Self {
            config,
            source,
            state: Arc::new(RwLock::new(state)),
            session: None,
        }
    }

    /// Read access to the current state
    pub fn state(&self) -> RwLockReadGuard<'_, MarketState> {
        self.state.read()
    }

    /// Owned copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> MarketState {
        self.state.read().clone()
    }

    /// Fetch ticker, book, trades and candles concurrently and install them
    ///
    /// Either everything is installed or nothing is.
    ///
    /// # Errors
    ///
    /// Returns the first loader error.
    pub async fn load_initial(&self) -> Result<()> {
        let symbol = self.config.symbol.as_str();
        let loaded = tokio::try_join!(
            self.source.fetch_ticker(symbol),
            self.source.fetch_order_book(symbol, self.config.depth),
            self.source.fetch_trades(symbol, self.config.bootstrap_trade_limit),
            self.source.fetch_candles(
                symbol,
                &self.config.kline_interval,
                self.config.bootstrap_candle_limit
            ),
        );
        let (ticker, book, trades, candles) = loaded
            .inspect_err(|e| error!("Initial load for {} failed: {}", symbol, e))?;

        {
            let mut state = self.state.write();
            if let Some(ticker) = ticker {
                state.set_ticker(ticker);
            }
            state.set_order_book(book.clone());
            state.replace_trades(trades);
            state.set_candles(candles);
        }
        self.seed_reconstructor(book).await;

        info!("Loaded initial market data for {}", symbol);
        Ok(())
    }

    /// Re-fetch the REST resource backing `kind` after its channel reconnected
    ///
    /// Candles need nothing: the poll and the stream keep the last bar current.
    ///
    /// # Errors
    ///
    /// Returns the loader error; the state is left untouched in that case.
    pub async fn refresh(&self, kind: ChannelKind) -> Result<()> {
        let symbol = self.config.symbol.as_str();
        match kind {
            ChannelKind::Ticker => {
                if let Some(ticker) = self.source.fetch_ticker(symbol).await? {
                    self.state.write().set_ticker(ticker);
                }
            }
            ChannelKind::OrderBook => {
                let book = self
                    .source
                    .fetch_order_book(symbol, self.config.depth)
                    .await?;
                self.state.write().set_order_book(book.clone());
                self.seed_reconstructor(book).await;
            }
            ChannelKind::Trades => {
                let trades = self
                    .source
                    .fetch_trades(symbol, self.config.refresh_trade_limit)
                    .await?;
                self.state.write().replace_trades(trades);
            }
            ChannelKind::Candles => {
                debug!("No refresh needed for candles");
                return Ok(());
            }
        }
        info!("Refreshed {} for {} after reconnect", kind, symbol);
        Ok(())
    }

    /// Feed the session's live updates into this view
    ///
    /// Reconnects trigger a background [`MarketView::refresh`] for the affected
    /// channel, and REST book snapshots are forwarded to the session's
    /// reconstructor from then on.
    pub fn attach(&mut self, session: &StreamSession) {
        self.session = Some(session.handle());

        let state = Arc::clone(&self.state);
        session.subscribe_ticker(move |ticker| state.write().set_ticker(*ticker));

        let state = Arc::clone(&self.state);
        session.subscribe_order_book(move |book| state.write().set_order_book(book.clone()));

        let state = Arc::clone(&self.state);
        session.subscribe_trades(move |trade| state.write().push_trade(*trade));

        let state = Arc::clone(&self.state);
        session.subscribe_candles(move |candle| state.write().apply_candle(*candle));

        let view = self.clone();
        session.subscribe_reconnect(move |kind| {
            let view = view.clone();
            let kind = *kind;
            tokio::spawn(async move {
                // loader errors are logged where they happen
                let _ = view.refresh(kind).await;
            });
        });
    }

    async fn seed_reconstructor(&self, book: OrderBookSnapshot) {
        let Some(handle) = &self.session else {
            return;
        };
        if book.is_empty() {
            return;
        }
        if let Err(e) = handle.apply_order_book_snapshot(book).await {
            debug!("Could not seed order book reconstructor: {}", e);
        }
    }
}
