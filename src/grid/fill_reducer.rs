//! Fill reducer (§4.3): dedups fill events, matches them to grid slots,
//! classifies full vs. partial, and applies the ledger effects.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::model::{FundLedger, Side};
use crate::precision::AssetPrecision;

use super::store::OrderStore;

/// Per-asset precision needed to resolve a fill's epsilon at the slot's own
/// asset precision (SPEC_FULL §4.3): asset A is the sold asset for SELL
/// slots, asset B for BUY slots.
#[derive(Debug, Clone, Copy)]
pub struct FillPrecision {
    pub asset_a: AssetPrecision,
    pub asset_b: AssetPrecision,
}

impl FillPrecision {
    fn for_side(&self, side: Side) -> AssetPrecision {
        match side {
            Side::Sell => self.asset_a,
            Side::Buy => self.asset_b,
            Side::Spread => self.asset_a,
        }
    }
}

/// A fill event as delivered by the chain client subscription.
#[derive(Debug, Clone)]
pub struct FillEvent {
    pub order_id: String,
    pub block: u64,
    pub history_id: u64,
    pub pays_amount: f64,
    pub receives_amount: f64,
    pub is_maker: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillKey {
    order_id_hash: u64,
    block: u64,
    history_id: u64,
}

impl FillKey {
    fn new(event: &FillEvent) -> Self {
        // order_id is a chain handle, not a number we want to hash on order;
        // a simple string hash is enough for dedup identity.
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        event.order_id.hash(&mut hasher);
        Self {
            order_id_hash: hasher.finish(),
            block: event.block,
            history_id: event.history_id,
        }
    }
}

/// Rolling dedup window, keyed by `(order_id, block, history_id)`.
pub struct DedupWindow {
    window: Duration,
    seen: VecDeque<(FillKey, Instant)>,
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self { window, seen: VecDeque::new() }
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some((_, seen_at)) = self.seen.front() {
            if now.duration_since(*seen_at) > self.window {
                self.seen.pop_front();
            } else {
                break;
            }
        }
    }

    /// Returns true if this is the first time this key has been seen within
    /// the window (and records it); false if it's a duplicate.
    pub fn observe(&mut self, event: &FillEvent, now: Instant) -> bool {
        self.evict_expired(now);
        let key = FillKey::new(event);
        if self.seen.iter().any(|(k, _)| *k == key) {
            false
        } else {
            self.seen.push_back((key, now));
            true
        }
    }
}

/// Outcome of reducing one fill, handed to the rebalancer.
#[derive(Debug, Clone)]
pub struct ReducedFill {
    pub slot_id: String,
    pub side: Side,
    pub full: bool,
}

/// Apply one already-deduped, maker fill to the store and ledger.
/// Returns `None` if the fill doesn't match any tracked slot (order belongs
/// to a slot that was already cancelled/rotated away) or is a taker fill.
pub fn reduce_fill(
    store: &mut OrderStore,
    ledger: &mut FundLedger,
    event: &FillEvent,
    precision: &FillPrecision,
) -> Option<ReducedFill> {
    if !event.is_maker {
        info!("skipping taker fill on order {}", event.order_id);
        return None;
    }

    let Some(slot) = store.by_chain_order_id(&event.order_id) else {
        warn!("fill for untracked order {}, ignoring", event.order_id);
        return None;
    };

    let slot_id = slot.id.clone();
    let side = slot.side;
    let epsilon = precision.for_side(side).epsilon();
    let filled_size = event.pays_amount;
    let target_size = slot.size;
    let remaining = (target_size - filled_size).max(0.0);
    let full = remaining <= epsilon;

    let mirror = side.opposite();
    ledger.side_mut(mirror).credit_proceeds(event.receives_amount);

    if full {
        // Release the whole committed target, not just `filled_size`: a
        // sub-epsilon remainder is dust the chain will never fill, so the
        // slot's full committed amount must clear or it leaks into
        // `committed` forever.
        ledger.side_mut(side).release(target_size.max(0.0));
        store.update(&slot_id, |s| s.mark_filled());
        info!("full fill on {slot_id} ({side:?}), proceeds {:.8} to {mirror:?}", event.receives_amount);
    } else {
        ledger.side_mut(side).release(filled_size);
        store.update(&slot_id, |s| s.mark_partial(remaining));
        info!("partial fill on {slot_id} ({side:?}): remaining {remaining:.8}");
    }

    Some(ReducedFill { slot_id, side, full })
}

/// Reduce a batch of fill events, deduping against the window and
/// aggregating into one ordered list of reduced fills for the rebalancer.
pub fn reduce_batch(
    store: &mut OrderStore,
    ledger: &mut FundLedger,
    dedup: &mut DedupWindow,
    events: &[FillEvent],
    now: Instant,
    precision: &FillPrecision,
) -> Vec<ReducedFill> {
    let mut batch_seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for event in events {
        let key = FillKey::new(event);
        if !batch_seen.insert(key) {
            continue;
        }
        if !dedup.observe(event, now) {
            continue;
        }
        if let Some(reduced) = reduce_fill(store, ledger, event, precision) {
            out.push(reduced);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GridSlot, Side};

    fn setup() -> (OrderStore, FundLedger) {
        let mut store = OrderStore::new();
        let mut slot = GridSlot::new("sell-0", Side::Sell, 195.0, 2.0);
        slot.activate("chain-1");
        store.insert(slot);
        let mut ledger = FundLedger::new(10.0, 1000.0);
        ledger.sell.commit(2.0);
        (store, ledger)
    }

    fn precision() -> FillPrecision {
        FillPrecision { asset_a: AssetPrecision::new(8), asset_b: AssetPrecision::new(8) }
    }

    #[test]
    fn full_fill_marks_filled_and_credits_mirror_proceeds() {
        let (mut store, mut ledger) = setup();
        let event = FillEvent {
            order_id: "chain-1".into(),
            block: 1,
            history_id: 1,
            pays_amount: 2.0,
            receives_amount: 390.0,
            is_maker: true,
        };
        let reduced = reduce_fill(&mut store, &mut ledger, &event, &precision()).unwrap();
        assert!(reduced.full);
        assert_eq!(store.get("sell-0").unwrap().state, crate::model::SlotState::Filled);
        assert!((ledger.buy.pending_proceeds - 390.0).abs() < 1e-9);
        assert!((ledger.sell.committed - 0.0).abs() < 1e-9);
    }

    #[test]
    fn partial_fill_reduces_size_and_keeps_active() {
        let (mut store, mut ledger) = setup();
        let event = FillEvent {
            order_id: "chain-1".into(),
            block: 1,
            history_id: 1,
            pays_amount: 0.8,
            receives_amount: 156.0,
            is_maker: true,
        };
        let reduced = reduce_fill(&mut store, &mut ledger, &event, &precision()).unwrap();
        assert!(!reduced.full);
        let slot = store.get("sell-0").unwrap();
        assert_eq!(slot.state, crate::model::SlotState::Partial);
        assert!((slot.size - 1.2).abs() < 1e-9);
        assert!((ledger.sell.committed - 1.2).abs() < 1e-9);
        assert!((ledger.buy.pending_proceeds - 156.0).abs() < 1e-9);
    }

    #[test]
    fn remainder_within_asset_precision_epsilon_classifies_as_full() {
        // size-2.0 slot on an asset at precision 2 (epsilon = 0.01); a fill
        // paying 1.995 leaves a 0.005 remainder, which is sub-precision dust
        // and must classify FULL rather than leaving a dangling PARTIAL.
        let mut store = OrderStore::new();
        let mut slot = GridSlot::new("sell-0", Side::Sell, 195.0, 2.0);
        slot.activate("chain-1");
        store.insert(slot);
        let mut ledger = FundLedger::new(10.0, 1000.0);
        ledger.sell.commit(2.0);

        let event = FillEvent {
            order_id: "chain-1".into(),
            block: 1,
            history_id: 1,
            pays_amount: 1.995,
            receives_amount: 389.0,
            is_maker: true,
        };
        let coarse = FillPrecision { asset_a: AssetPrecision::new(2), asset_b: AssetPrecision::new(2) };
        let reduced = reduce_fill(&mut store, &mut ledger, &event, &coarse).unwrap();
        assert!(reduced.full);
        assert_eq!(store.get("sell-0").unwrap().state, crate::model::SlotState::Filled);
    }

    #[test]
    fn taker_fills_are_skipped() {
        let (mut store, mut ledger) = setup();
        let event = FillEvent {
            order_id: "chain-1".into(),
            block: 1,
            history_id: 1,
            pays_amount: 2.0,
            receives_amount: 390.0,
            is_maker: false,
        };
        assert!(reduce_fill(&mut store, &mut ledger, &event, &precision()).is_none());
    }

    #[test]
    fn duplicate_fill_within_window_is_dropped() {
        let (mut store, mut ledger) = setup();
        let mut dedup = DedupWindow::new(Duration::from_secs(5));
        let event = FillEvent {
            order_id: "chain-1".into(),
            block: 1,
            history_id: 1,
            pays_amount: 0.8,
            receives_amount: 156.0,
            is_maker: true,
        };
        let now = Instant::now();
        let first = reduce_batch(&mut store, &mut ledger, &mut dedup, &[event.clone(), event.clone()], now, &precision());
        assert_eq!(first.len(), 1);
        let second = reduce_batch(&mut store, &mut ledger, &mut dedup, &[event], now, &precision());
        assert!(second.is_empty());
    }
}
