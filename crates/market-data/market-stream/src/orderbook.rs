//! Incremental order book reconstruction
//!
//! The book starts from a REST snapshot and is then driven by depth diffs from
//! the stream. A sequence cursor drops regressions (stale or duplicated diffs
//! delivered out of order). Forward gaps are tolerated: they are counted and
//! logged, but the book is not resynchronized because of them.

use crate::models::{OrderBookSnapshot, PriceLevel};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Price wrapper with a total order so it can key a `BTreeMap`
#[derive(Debug, Clone, Copy)]
struct PriceKey(f64);

impl PartialEq for PriceKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PriceKey {}

impl PartialOrd for PriceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One incremental depth update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DepthDiff {
    /// Final update id of this diff (`u`)
    pub update_id: u64,
    /// Final update id of the previous diff (`pu`), when the venue sends it
    pub prev_update_id: Option<u64>,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Order book state for one symbol
///
/// Both sides are kept as price -> quantity maps truncated to `depth` after every
/// mutation, so memory stays bounded no matter how far the stream wanders.
#[derive(Debug, Clone)]
pub struct OrderBookReconstructor {
    depth: usize,
    bids: BTreeMap<PriceKey, f64>,
    asks: BTreeMap<PriceKey, f64>,
    cursor: Option<u64>,
    stale_dropped: u64,
    forward_gaps: u64,
}

impl OrderBookReconstructor {
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            cursor: None,
            stale_dropped: 0,
            forward_gaps: 0,
        }
    }

    /// Replace the whole book with a bootstrap snapshot and clear the cursor
    ///
    /// Non-positive or non-finite levels are dropped; duplicate prices keep the
    /// last quantity seen.
    pub fn apply_snapshot(&mut self, snapshot: &OrderBookSnapshot) {
        self.bids.clear();
        self.asks.clear();

        for level in snapshot.bids.iter().filter(|l| is_live(l)) {
            self.bids.insert(PriceKey(level.price), level.quantity);
        }
        for level in snapshot.asks.iter().filter(|l| is_live(l)) {
            self.asks.insert(PriceKey(level.price), level.quantity);
        }
        self.truncate();
        self.cursor = None;

        debug!(
            "Applied snapshot with {} bids and {} asks",
            self.bids.len(),
            self.asks.len()
        );
    }

    /// Apply one diff
    ///
    /// Returns the resulting snapshot when the diff was accepted, carried at least
    /// one usable level and the book has at least one level left. Stale diffs,
    /// diffs whose levels were all invalid and an emptied book yield `None`; an
    /// accepted diff advances the cursor even when it yields `None`.
    pub fn apply_diff(&mut self, diff: &DepthDiff) -> Option<OrderBookSnapshot> {
        match self.cursor {
            None => {
                trace!(update_id = diff.update_id, "Cursor bootstrapped from first diff");
            }
            Some(cursor) if diff.update_id < cursor => {
                self.stale_dropped += 1;
                trace!(update_id = diff.update_id, cursor, "Dropped stale depth diff");
                return None;
            }
            Some(cursor) => {
                if let Some(prev) = diff.prev_update_id {
                    if prev != cursor && diff.update_id > cursor {
                        self.forward_gaps += 1;
                        debug!(
                            cursor,
                            prev_update_id = prev,
                            update_id = diff.update_id,
                            "Forward gap in depth stream"
                        );
                    }
                }
            }
        }
        self.cursor = Some(diff.update_id);

        let bids: Vec<&PriceLevel> = diff.bids.iter().filter(|l| is_change(l)).collect();
        let asks: Vec<&PriceLevel> = diff.asks.iter().filter(|l| is_change(l)).collect();
        if bids.is_empty() && asks.is_empty() {
            trace!(update_id = diff.update_id, "Depth diff carried no usable levels");
            return None;
        }

        for level in bids {
            Self::apply_level(&mut self.bids, level);
        }
        for level in asks {
            Self::apply_level(&mut self.asks, level);
        }
        self.truncate();

        if self.bids.is_empty() && self.asks.is_empty() {
            return None;
        }
        Some(self.snapshot())
    }

    /// Forget the cursor so the next diff bootstraps it; the book is kept
    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    /// Current book, bids descending and asks ascending
    #[must_use]
    pub fn snapshot(&self) -> OrderBookSnapshot {
        OrderBookSnapshot {
            bids: self
                .bids
                .iter()
                .rev()
                .map(|(p, q)| PriceLevel::new(p.0, *q))
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(p, q)| PriceLevel::new(p.0, *q))
                .collect(),
        }
    }

    #[must_use]
    pub const fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Diffs dropped because their id was behind the cursor
    #[must_use]
    pub const fn stale_dropped(&self) -> u64 {
        self.stale_dropped
    }

    /// Diffs whose `pu` did not match the cursor
    #[must_use]
    pub const fn forward_gaps(&self) -> u64 {
        self.forward_gaps
    }

    fn apply_level(side: &mut BTreeMap<PriceKey, f64>, level: &PriceLevel) {
        if level.quantity <= 0.0 {
            side.remove(&PriceKey(level.price));
        } else {
            side.insert(PriceKey(level.price), level.quantity);
        }
    }

    fn truncate(&mut self) {
        // best bid is the highest key, best ask the lowest
        while self.bids.len() > self.depth {
            self.bids.pop_first();
        }
        while self.asks.len() > self.depth {
            self.asks.pop_last();
        }
    }
}

fn is_live(level: &PriceLevel) -> bool {
    is_change(level) && level.quantity > 0.0
}

/// A diff level that upserts or removes a price; zero quantity means removal
fn is_change(level: &PriceLevel) -> bool {
    level.price.is_finite() && level.price > 0.0 && level.quantity.is_finite()
}
