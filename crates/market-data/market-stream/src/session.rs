//! Stream session: four channels, one dispatcher, one candle poll
//!
//! Channel tasks and the poll task push [`SessionEvent`]s into a single bounded
//! queue. The dispatcher task drains it, owns the order book reconstructor and
//! fans decoded values out to the subscriber callbacks. The queue and the
//! reconstructor outlive a single run, so a session can be stopped and started
//! again and [`SessionHandle`]s stay valid across restarts.

use crate::channel::ChannelConnection;
use crate::config::StreamConfig;
use crate::errors::{Result, StreamError};
use crate::models::{Candle, ChannelKind, OrderBookSnapshot, Ticker, Trade};
use crate::orderbook::OrderBookReconstructor;
use crate::rest::MarketDataSource;
use crate::subscribers::Subscribers;
use crate::transport::Transport;
use crate::wire;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, trace, warn};

/// Everything that flows into the dispatcher
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A channel finished opening; `resync` is set when the open ends an outage
    Opened { kind: ChannelKind, resync: bool },
    /// A JSON frame received on a channel
    Frame { kind: ChannelKind, payload: Value },
    /// Latest in-progress candle from the REST poll
    PolledCandle(Candle),
    /// Fresh order book snapshot pushed from outside the event loop
    ApplySnapshot(OrderBookSnapshot),
}

/// Cloneable handle for feeding the running session from other tasks
#[derive(Debug, Clone)]
pub struct SessionHandle {
    events: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Replace the reconstructor's book with `snapshot` and clear its cursor
    ///
    /// Queued behind any frames already received, and applied on the next start
    /// if the session is currently stopped.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::SessionClosed`] if the session has been dropped.
    pub async fn apply_order_book_snapshot(&self, snapshot: OrderBookSnapshot) -> Result<()> {
        self.events
            .send(SessionEvent::ApplySnapshot(snapshot))
            .await
            .map_err(|_| StreamError::SessionClosed)
    }
}

/// Owns the reconstructor and routes events to subscribers
struct Dispatcher {
    book: OrderBookReconstructor,
    subscribers: Subscribers,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut events: mpsc::Receiver<SessionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    self.drain(&mut events);
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        debug!("Dispatcher stopped");
        (self, events)
    }

    /// Empty the queue on shutdown so the next run starts from live data
    ///
    /// Snapshots are still applied; frames and polled candles from the finished
    /// run are dropped.
    fn drain(&mut self, events: &mut mpsc::Receiver<SessionEvent>) {
        let mut dropped = 0usize;
        while let Ok(event) = events.try_recv() {
            match event {
                SessionEvent::ApplySnapshot(snapshot) => self.book.apply_snapshot(&snapshot),
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!("Dropped {} queued events on shutdown", dropped);
        }
    }

    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Opened { kind, resync } => {
                if kind == ChannelKind::OrderBook {
                    self.book.reset_cursor();
                }
                if resync {
                    info!("{} channel reconnected", kind);
                    self.subscribers.reconnect().publish(&kind);
                }
            }
            SessionEvent::Frame { kind, payload } => {
                if let Err(e) = self.route(kind, payload) {
                    warn!("Dropping malformed {} frame: {}", kind, e);
                }
            }
            SessionEvent::PolledCandle(candle) => self.subscribers.candles().publish(&candle),
            SessionEvent::ApplySnapshot(snapshot) => self.book.apply_snapshot(&snapshot),
        }
    }

    fn route(&mut self, kind: ChannelKind, payload: Value) -> Result<()> {
        match kind {
            ChannelKind::Ticker => match wire::decode_ticker(payload)? {
                Some(ticker) => self.subscribers.ticker().publish(&ticker),
                None => trace!("Discarded ticker without a valid price"),
            },
            ChannelKind::OrderBook => match wire::decode_depth(payload)? {
                Some(diff) => {
                    if let Some(snapshot) = self.book.apply_diff(&diff) {
                        self.subscribers.order_book().publish(&snapshot);
                    }
                }
                None => trace!("Discarded depth frame without update id"),
            },
            ChannelKind::Trades => match wire::decode_trade(payload)? {
                Some(trade) => self.subscribers.trades().publish(&trade),
                None => trace!("Discarded invalid trade"),
            },
            ChannelKind::Candles => match wire::decode_kline(payload)? {
                Some(candle) => self.subscribers.candles().publish(&candle),
                None => trace!("Skipped open or invalid kline"),
            },
        }
        Ok(())
    }
}

struct RunningSession {
    shutdown: watch::Sender<bool>,
    dispatcher: JoinHandle<(Dispatcher, mpsc::Receiver<SessionEvent>)>,
    poll: JoinHandle<()>,
}

/// Live view of one market over four independent channels
pub struct StreamSession {
    config: StreamConfig,
    transport: Arc<dyn Transport>,
    source: Arc<dyn MarketDataSource>,
    subscribers: Subscribers,
    events: mpsc::Sender<SessionEvent>,
    /// Parked between runs
    idle: Option<(Dispatcher, mpsc::Receiver<SessionEvent>)>,
    channels: [Option<ChannelConnection>; 4],
    running: Option<RunningSession>,
}

impl StreamSession {
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidConfig`] when `config` does not validate.
    pub fn new(
        config: StreamConfig,
        transport: Arc<dyn Transport>,
        source: Arc<dyn MarketDataSource>,
    ) -> Result<Self> {
        config.validate()?;

        let subscribers = Subscribers::new();
        let (events, events_rx) = mpsc::channel(config.event_queue_capacity);
        let dispatcher = Dispatcher {
            book: OrderBookReconstructor::new(config.depth),
            subscribers: subscribers.clone(),
        };

        Ok(Self {
            config,
            transport,
            source,
            subscribers,
            events,
            idle: Some((dispatcher, events_rx)),
            channels: [None, None, None, None],
            running: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }

    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            events: self.events.clone(),
        }
    }

    /// Channel in the given slot, present once the session has been started
    #[must_use]
    pub fn channel(&self, kind: ChannelKind) -> Option<&ChannelConnection> {
        self.channels[kind.index()].as_ref()
    }

    pub fn subscribe_ticker<F>(&self, callback: F)
    where
        F: Fn(&Ticker) + Send + Sync + 'static,
    {
        self.subscribers.ticker().subscribe(callback);
    }

    pub fn subscribe_order_book<F>(&self, callback: F)
    where
        F: Fn(&OrderBookSnapshot) + Send + Sync + 'static,
    {
        self.subscribers.order_book().subscribe(callback);
    }

    pub fn subscribe_trades<F>(&self, callback: F)
    where
        F: Fn(&Trade) + Send + Sync + 'static,
    {
        self.subscribers.trades().subscribe(callback);
    }

    pub fn subscribe_candles<F>(&self, callback: F)
    where
        F: Fn(&Candle) + Send + Sync + 'static,
    {
        self.subscribers.candles().subscribe(callback);
    }

    /// Called with the channel kind whenever a channel comes back after an outage
    pub fn subscribe_reconnect<F>(&self, callback: F)
    where
        F: Fn(&ChannelKind) + Send + Sync + 'static,
    {
        self.subscribers.reconnect().subscribe(callback);
    }

    /// Open all four channels and start the candle poll
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::AlreadyRunning`] if the session is running, or
    /// [`StreamError::SessionClosed`] if the dispatcher was lost in a previous run.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(StreamError::AlreadyRunning);
        }
        let (dispatcher, events_rx) = self.idle.take().ok_or(StreamError::SessionClosed)?;

        info!("Starting market session for {}", self.config.symbol);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let dispatcher = tokio::spawn(dispatcher.run(events_rx, shutdown_rx.clone()));
        let poll = tokio::spawn(run_candle_poll(
            Arc::clone(&self.source),
            self.config.symbol.clone(),
            self.config.kline_interval.clone(),
            self.config.candle_poll_interval(),
            self.events.clone(),
            shutdown_rx,
        ));

        for kind in ChannelKind::ALL {
            let slot = &mut self.channels[kind.index()];
            let channel = slot.get_or_insert_with(|| {
                ChannelConnection::new(
                    kind,
                    self.config.topic(kind),
                    Arc::clone(&self.transport),
                    self.events.clone(),
                    self.config.heartbeat_interval(),
                    self.config.backoff,
                )
            });
            channel.open().await;
        }

        self.running = Some(RunningSession {
            shutdown,
            dispatcher,
            poll,
        });
        Ok(())
    }

    /// Close every channel, cancel every timer and wait for all tasks to finish
    ///
    /// Stopping a session that is not running does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        for channel in self.channels.iter_mut().flatten() {
            channel.close().await;
        }

        let _ = running.shutdown.send(true);
        if let Err(e) = running.poll.await {
            warn!("Candle poll task ended abnormally: {}", e);
        }
        match running.dispatcher.await {
            Ok(parked) => self.idle = Some(parked),
            Err(e) => error!("Dispatcher task ended abnormally: {}", e),
        }

        info!("Market session for {} stopped", self.config.symbol);
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
            running.poll.abort();
            running.dispatcher.abort();
        }
    }
}

/// Periodically re-fetch the in-progress candle
///
/// Streamed klines only carry closed bars, so without this the newest bar would
/// only show up once it closes.
async fn run_candle_poll(
    source: Arc<dyn MarketDataSource>,
    symbol: String,
    interval: String,
    period: Duration,
    events: mpsc::Sender<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            result = source.fetch_candles(&symbol, &interval, 1) => result,
        };

        match fetched {
            Ok(candles) => {
                let Some(latest) = candles.last().copied() else {
                    continue;
                };
                if events.send(SessionEvent::PolledCandle(latest)).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("Candle poll for {} failed: {}", symbol, e),
        }
    }

    debug!("Candle poll stopped");
}
