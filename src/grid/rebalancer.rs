//! Rebalancer (§4.5): turns the fill reducer's output into the set of chain
//! operations needed to keep the grid aligned — rotations first (reusing an
//! existing chain order instead of paying for cancel+create), then partial
//! moves, then fresh creates for slots with nowhere left to rotate from.

use log::{info, warn};

use crate::model::{FundLedger, Side, SlotState};

use super::fill_reducer::ReducedFill;
use super::store::OrderStore;

/// A fresh create for a slot that currently has no chain order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceOrder {
    pub slot_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
}

/// Reuse of an existing chain order at a new price/size — the rotation
/// primitive. `source_slot_id` is the vacated slot (now virtual);
/// `target_slot_id` is where the reused order now rests.
#[derive(Debug, Clone, PartialEq)]
pub struct RotateOrder {
    pub source_slot_id: String,
    pub target_slot_id: String,
    pub chain_order_id: String,
    pub side: Side,
    pub new_price: f64,
    pub new_size: f64,
    /// False when proceeds only covered part of the target's full size.
    pub full: bool,
}

/// A price-only update to a slot already resting on chain, partially filled.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialMove {
    pub slot_id: String,
    pub chain_order_id: String,
    pub side: Side,
    pub new_price: f64,
}

/// §4.5's output sum type. Batch ordering (partial-moves → rotations →
/// creates) is the caller's job (the batch planner); this struct just keeps
/// the three kinds separate the way the rebalancer produces them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebalanceResult {
    pub orders_to_place: Vec<PlaceOrder>,
    pub orders_to_rotate: Vec<RotateOrder>,
    pub partial_moves: Vec<PartialMove>,
}

/// Fraction of one increment a partial order is nudged toward the reference
/// price per batch — a gentle drift toward the inner edge rather than a
/// full grid step, since the slot is still resting and still partially live.
const PARTIAL_MOVE_FRACTION: f64 = 0.1;

/// Process one batch of reduced fills. `suppress_rotations` is the
/// `_runningDivergenceCorrections` reentrancy guard (§5): set during a
/// divergence-driven resize so that resize doesn't cascade into further
/// rotations.
pub fn rebalance(
    store: &mut OrderStore,
    ledger: &mut FundLedger,
    increment_percent: f64,
    fills: &[ReducedFill],
    suppress_rotations: bool,
) -> RebalanceResult {
    let mut result = RebalanceResult::default();
    let mut used_sources = std::collections::HashSet::new();

    for fill in fills {
        if !fill.full {
            if let Some(slot) = store.get(&fill.slot_id) {
                if let Some(chain_order_id) = slot.chain_order_id.clone() {
                    let new_price = nudge_toward_reference(fill.side, slot.price, increment_percent);
                    result.partial_moves.push(PartialMove {
                        slot_id: fill.slot_id.clone(),
                        chain_order_id,
                        side: fill.side,
                        new_price,
                    });
                }
            }
            continue;
        }

        if suppress_rotations {
            info!("rotation suppressed during divergence correction for {}", fill.slot_id);
            continue;
        }

        let mirror = fill.side.opposite();
        let Some(source) = store.innermost_active_for_rotation(mirror) else {
            info!("no mirror-side active to rotate for fill on {}", fill.slot_id);
            continue;
        };
        let Some(source_chain_id) = source.chain_order_id.clone() else {
            continue;
        };
        if used_sources.contains(&source_chain_id) {
            continue; // §4.5 dedup: a rotation source cannot be reused within one batch
        }
        let Some(target) = store.next_reserve_slot(mirror) else {
            warn!("no reserve slot left on {mirror:?} side to rotate into");
            continue;
        };

        let source_id = source.id.clone();
        let source_price = source.price;
        let old_size = source.size;
        let target_id = target.id.clone();
        let target_price = target.price;

        let epsilon = 1e-9;
        let preview = ledger.side(mirror).pending_proceeds + ledger.side(mirror).available.max(0.0);
        if preview <= epsilon {
            warn!("no funds available on {mirror:?} side to fund rotation");
            continue;
        }
        let ideal_size = old_size;
        let new_size = ideal_size.min(preview);
        let consumed = ledger.side_mut(mirror).consume(new_size);
        ledger.side_mut(mirror).release(old_size);
        ledger.side_mut(mirror).committed += consumed;

        let full = consumed + epsilon >= ideal_size;

        store.update(&source_id, |s| s.retarget(source_price, 0.0));
        store.update(&target_id, |s| {
            s.price = target_price;
            s.size = consumed;
            s.activate(source_chain_id.clone());
            if !full {
                s.state = SlotState::Partial;
            }
        });

        used_sources.insert(source_chain_id.clone());
        info!(
            "rotated {source_id} -> {target_id} on {mirror:?} at {target_price:.8}, size {consumed:.8} (full={full})"
        );
        result.orders_to_rotate.push(RotateOrder {
            source_slot_id: source_id,
            target_slot_id: target_id,
            chain_order_id: source_chain_id,
            side: mirror,
            new_price: target_price,
            new_size: consumed,
            full,
        });
    }

    result
}

/// Nudge a resting order's price a fraction of one increment toward the
/// reference price (SELL down, BUY up), reflecting the grid's inner edge
/// drift after a partial fill (§4.5 "partial moves").
fn nudge_toward_reference(side: Side, price: f64, increment_percent: f64) -> f64 {
    let step = price * (increment_percent / 100.0) * PARTIAL_MOVE_FRACTION;
    match side {
        Side::Sell => price - step,
        Side::Buy => price + step,
        Side::Spread => price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GridSlot, Side};

    fn ledger() -> FundLedger {
        FundLedger::new(10.0, 1000.0)
    }

    #[test]
    fn scenario_s2_full_sell_fill_rotates_innermost_buy_outward() {
        let mut store = OrderStore::new();
        // sell actives, innermost at sell-4 (closest to spread/ref)
        for (idx, price) in [(0, 200.0), (1, 198.02), (2, 196.06), (3, 194.12), (4, 192.20)] {
            let mut slot = GridSlot::new(format!("sell-{idx}"), Side::Sell, price, 2.0);
            slot.activate(format!("sell-chain-{idx}"));
            store.insert(slot);
        }
        // buy actives idx2..6, innermost at buy-2 (closest to ref)
        for (idx, price) in [(2, 99.01), (3, 98.02), (4, 97.04), (5, 96.07), (6, 95.11)] {
            let mut slot = GridSlot::new(format!("buy-{idx}"), Side::Buy, price, 200.0);
            slot.activate(format!("buy-chain-{idx}"));
            store.insert(slot);
        }
        // reserve beyond the active buy window
        store.insert(GridSlot::new("buy-7", Side::Buy, 94.17, 0.0));

        let mut ledger = ledger();
        ledger.sell.commit(10.0);
        ledger.buy.commit(1000.0);
        // the sell fill at sell-4 already credited pendingProceeds.buy upstream
        ledger.buy.credit_proceeds(192.20 * 2.0);

        let fills = vec![ReducedFill { slot_id: "sell-4".into(), side: Side::Sell, full: true }];
        let result = rebalance(&mut store, &mut ledger, 1.0, &fills, false);

        assert_eq!(result.orders_to_rotate.len(), 1);
        let rotation = &result.orders_to_rotate[0];
        assert_eq!(rotation.source_slot_id, "buy-2");
        assert_eq!(rotation.target_slot_id, "buy-7");
        assert_eq!(rotation.chain_order_id, "buy-chain-2");
        assert!(rotation.full);

        let vacated = store.get("buy-2").unwrap();
        assert_eq!(vacated.state, crate::model::SlotState::Virtual);
        assert!(vacated.chain_order_id.is_none());

        let activated = store.get("buy-7").unwrap();
        assert_eq!(activated.state, crate::model::SlotState::Active);
        assert_eq!(activated.chain_order_id.as_deref(), Some("buy-chain-2"));
    }

    #[test]
    fn rotation_partially_funds_when_proceeds_insufficient() {
        let mut store = OrderStore::new();
        let mut source = GridSlot::new("buy-2", Side::Buy, 99.01, 200.0);
        source.activate("buy-chain-2");
        store.insert(source);
        store.insert(GridSlot::new("buy-7", Side::Buy, 94.17, 0.0));

        let mut ledger = FundLedger::new(10.0, 200.0);
        ledger.buy.commit(200.0);
        ledger.buy.credit_proceeds(50.0); // far less than the 200 full size, and no spare `available` left

        let fills = vec![ReducedFill { slot_id: "sell-4".into(), side: Side::Sell, full: true }];
        let result = rebalance(&mut store, &mut ledger, 1.0, &fills, false);

        let rotation = &result.orders_to_rotate[0];
        assert!(!rotation.full);
        assert!((rotation.new_size - 50.0).abs() < 1e-9);
        assert_eq!(store.get("buy-7").unwrap().state, crate::model::SlotState::Partial);
    }

    #[test]
    fn suppressed_rotations_are_skipped_during_divergence_correction() {
        let mut store = OrderStore::new();
        let mut source = GridSlot::new("buy-2", Side::Buy, 99.01, 200.0);
        source.activate("buy-chain-2");
        store.insert(source);
        store.insert(GridSlot::new("buy-7", Side::Buy, 94.17, 0.0));
        let mut ledger = ledger();
        ledger.buy.credit_proceeds(200.0);

        let fills = vec![ReducedFill { slot_id: "sell-4".into(), side: Side::Sell, full: true }];
        let result = rebalance(&mut store, &mut ledger, 1.0, &fills, true);
        assert!(result.orders_to_rotate.is_empty());
    }

    #[test]
    fn partial_fill_emits_a_partial_move_before_any_rotation() {
        let mut store = OrderStore::new();
        let mut slot = GridSlot::new("sell-0", Side::Sell, 195.0, 1.2);
        slot.activate("chain-1");
        store.insert(slot);
        let mut ledger = ledger();

        let fills = vec![ReducedFill { slot_id: "sell-0".into(), side: Side::Sell, full: false }];
        let result = rebalance(&mut store, &mut ledger, 1.0, &fills, false);

        assert_eq!(result.partial_moves.len(), 1);
        assert!(result.orders_to_rotate.is_empty());
        assert!(result.partial_moves[0].new_price < 195.0);
    }

    #[test]
    fn two_rotations_cannot_share_a_source_in_one_batch() {
        let mut store = OrderStore::new();
        let mut source = GridSlot::new("buy-2", Side::Buy, 99.01, 200.0);
        source.activate("buy-chain-2");
        store.insert(source);
        store.insert(GridSlot::new("buy-7", Side::Buy, 94.17, 0.0));
        let mut ledger = ledger();
        ledger.buy.credit_proceeds(1000.0);

        let fills = vec![
            ReducedFill { slot_id: "sell-4".into(), side: Side::Sell, full: true },
            ReducedFill { slot_id: "sell-3".into(), side: Side::Sell, full: true },
        ];
        let result = rebalance(&mut store, &mut ledger, 1.0, &fills, false);
        assert_eq!(result.orders_to_rotate.len(), 1);
    }
}
