//! Callback registry, one list per event kind
//!
//! Callbacks run in registration order. Each call is isolated: a panicking callback
//! is logged and the remaining ones still run.

use crate::models::{Candle, ChannelKind, OrderBookSnapshot, Ticker, Trade};
use parking_lot::RwLock;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::error;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered callbacks for one event kind
pub struct Topic<T> {
    name: &'static str,
    callbacks: RwLock<Vec<Callback<T>>>,
}

impl<T> Topic<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    /// Invoke every callback with `value`
    ///
    /// The list is cloned before invoking so a callback may subscribe further
    /// callbacks without deadlocking; those only see later events.
    pub fn publish(&self, value: &T) {
        let callbacks = self.callbacks.read().clone();
        for (position, callback) in callbacks.iter().enumerate() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| callback(value))) {
                error!(
                    "{} subscriber #{} panicked: {}",
                    self.name,
                    position,
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}

struct Registry {
    ticker: Topic<Ticker>,
    order_book: Topic<OrderBookSnapshot>,
    trades: Topic<Trade>,
    candles: Topic<Candle>,
    reconnect: Topic<ChannelKind>,
}

/// Shared handle to the session's callback lists
#[derive(Clone)]
pub struct Subscribers {
    inner: Arc<Registry>,
}

impl Default for Subscribers {
    fn default() -> Self {
        Self {
            inner: Arc::new(Registry {
                ticker: Topic::new("ticker"),
                order_book: Topic::new("orderbook"),
                trades: Topic::new("trades"),
                candles: Topic::new("candles"),
                reconnect: Topic::new("reconnect"),
            }),
        }
    }
}

impl Subscribers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ticker(&self) -> &Topic<Ticker> {
        &self.inner.ticker
    }

    #[must_use]
    pub fn order_book(&self) -> &Topic<OrderBookSnapshot> {
        &self.inner.order_book
    }

    #[must_use]
    pub fn trades(&self) -> &Topic<Trade> {
        &self.inner.trades
    }

    #[must_use]
    pub fn candles(&self) -> &Topic<Candle> {
        &self.inner.candles
    }

    #[must_use]
    pub fn reconnect(&self) -> &Topic<ChannelKind> {
        &self.inner.reconnect
    }
}
