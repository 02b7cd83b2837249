//! Batch planner (§4.7): turns one `RebalanceResult` plus any cancels from
//! reconciliation/activation into an ordered list of `ChainOp`, applying the
//! toward-market nudge and the representable-range check before anything is
//! handed to the chain client.

use log::warn;

use crate::chain::ChainOp;
use crate::model::Side;
use crate::precision::AssetPrecision;

use super::rebalancer::{PartialMove, PlaceOrder, RebalanceResult, RotateOrder};

/// Per-asset precision the planner needs to convert floats to chain
/// integers: the sold asset for each tradeable side plus whichever asset it
/// is priced against, reduced to "asset A" / "asset B" since every slot
/// sells one and receives the other.
#[derive(Debug, Clone, Copy)]
pub struct PrecisionPair {
    pub asset_a: AssetPrecision,
    pub asset_b: AssetPrecision,
}

impl PrecisionPair {
    fn sold(&self, side: Side) -> AssetPrecision {
        match side {
            Side::Sell => self.asset_a,
            Side::Buy => self.asset_b,
            Side::Spread => self.asset_a,
        }
    }

    fn received(&self, side: Side) -> AssetPrecision {
        match side {
            Side::Sell => self.asset_b,
            Side::Buy => self.asset_a,
            Side::Spread => self.asset_b,
        }
    }
}

/// A chain op the planner decided to drop, and why — logged as an error per
/// §7 ("any dropped op is logged with reason") rather than silently skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedOp {
    pub context: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    pub ops: Vec<ChainOp>,
    pub dropped: Vec<DroppedOp>,
}

fn min_to_receive(side: Side, price: f64, size: f64) -> f64 {
    match side {
        Side::Sell => size * price,
        Side::Buy => size / price,
        Side::Spread => 0.0,
    }
}

fn plan_create(place: &PlaceOrder, assets: &PrecisionPair, asset_a: &str, asset_b: &str, plan: &mut BatchPlan) {
    let sold_precision = assets.sold(place.side);
    let recv_precision = assets.received(place.side);
    let context = format!("create:{}", place.slot_id);

    let Some(sell_amount) = sold_precision.float_to_chain_int(place.size) else {
        plan.dropped.push(DroppedOp { context, reason: "sell amount not representable at asset precision".into() });
        return;
    };
    let min_recv = min_to_receive(place.side, place.price, place.size);
    let Some(min_to_receive) = recv_precision.float_to_chain_int(min_recv) else {
        plan.dropped.push(DroppedOp { context, reason: "min-to-receive not representable at asset precision".into() });
        return;
    };

    let (sell_asset, receive_asset) = match place.side {
        Side::Sell => (asset_a.to_string(), asset_b.to_string()),
        Side::Buy | Side::Spread => (asset_b.to_string(), asset_a.to_string()),
    };

    plan.ops.push(ChainOp::Create {
        context,
        side: place.side,
        sell_asset,
        sell_amount,
        receive_asset,
        min_to_receive,
    });
}

/// One step of one increment, the grid's smallest meaningful price move — a
/// move is "toward market" if it's at least this close, guarding against
/// float noise flipping the sign of a near-zero price delta.
fn moves_toward_market(side: Side, old_price: f64, new_price: f64) -> bool {
    match side {
        Side::Sell => new_price < old_price,
        Side::Buy => new_price > old_price,
        Side::Spread => false,
    }
}

/// Plan an update op for a rotation or partial move. `old_size`/`old_price`
/// describe the chain order as it currently rests; `new_size`/`new_price`
/// are the rebalancer's target. Resolves §9 ambiguity (a): the nudge applies
/// only on a toward-market move with an exactly-zero delta; an away-from-
/// market zero-delta move is left as a true no-op update.
fn plan_update(
    context: String,
    order_id: &str,
    side: Side,
    old_price: f64,
    old_size: f64,
    new_price: f64,
    new_size: f64,
    precision: AssetPrecision,
    plan: &mut BatchPlan,
) {
    let Some(old_amount) = precision.float_to_chain_int(old_size) else {
        plan.dropped.push(DroppedOp { context, reason: "old size not representable at asset precision".into() });
        return;
    };
    let Some(new_amount) = precision.float_to_chain_int(new_size) else {
        plan.dropped.push(DroppedOp { context, reason: "new size not representable at asset precision".into() });
        return;
    };

    let mut delta = new_amount as i64 - old_amount as i64;
    let price_changed = (new_price - old_price).abs() > f64::EPSILON;

    if delta == 0 && price_changed && moves_toward_market(side, old_price, new_price) {
        // Pure-price update toward market: nudge by one smallest unit so the
        // chain's resting-size rule (a price update must move the amount)
        // is satisfied without changing the economically intended size.
        delta = 1;
    }

    plan.ops.push(ChainOp::Update {
        context,
        order_id: order_id.to_string(),
        amount_delta: delta,
        new_price: price_changed.then_some(new_price),
    });
}

fn plan_rotation(rotate: &RotateOrder, source_price: f64, source_size: f64, assets: &PrecisionPair, plan: &mut BatchPlan) {
    let context = format!("rotate:{}->{}", rotate.source_slot_id, rotate.target_slot_id);
    plan_update(
        context,
        &rotate.chain_order_id,
        rotate.side,
        source_price,
        source_size,
        rotate.new_price,
        rotate.new_size,
        assets.sold(rotate.side),
        plan,
    );
}

fn plan_partial_move(mv: &PartialMove, side: Side, current_price: f64, size: f64, assets: &PrecisionPair, plan: &mut BatchPlan) {
    let context = format!("partial-move:{}", mv.slot_id);
    plan_update(context, &mv.chain_order_id, side, current_price, size, mv.new_price, size, assets.sold(side), plan);
}

/// Build the batch for one `RebalanceResult`, in the §5-mandated order:
/// partial-moves → rotations → creates. Cancels (from reconciliation or an
/// activation-count shrink) are appended last by the caller, not here, since
/// this planner only ever sees rebalancer output.
///
/// `slot_lookup` resolves a slot id to its (price, size) *before* the
/// rebalancer's in-place mutation, so the planner can compute a correct
/// delta; the rebalancer has already updated the store by the time this
/// runs, so callers should snapshot prices/sizes before calling `rebalance`.
pub fn plan_rebalance_batch(
    result: &RebalanceResult,
    assets: &PrecisionPair,
    asset_a: &str,
    asset_b: &str,
    previous: &dyn Fn(&str) -> Option<(f64, f64)>,
) -> BatchPlan {
    let mut plan = BatchPlan::default();

    for mv in &result.partial_moves {
        if let Some((price, size)) = previous(&mv.slot_id) {
            plan_partial_move(mv, mv.side, price, size, assets, &mut plan);
        } else {
            plan.dropped.push(DroppedOp {
                context: format!("partial-move:{}", mv.slot_id),
                reason: "source slot price/size unavailable".into(),
            });
        }
    }

    for rotate in &result.orders_to_rotate {
        if let Some((price, _size)) = previous(&rotate.source_slot_id) {
            plan_rotation(rotate, price, rotate.new_size, assets, &mut plan);
        } else {
            plan.dropped.push(DroppedOp {
                context: format!("rotate:{}", rotate.source_slot_id),
                reason: "rotation source price unavailable".into(),
            });
        }
    }

    for place in &result.orders_to_place {
        plan_create(place, assets, asset_a, asset_b, &mut plan);
    }

    for dropped in &plan.dropped {
        warn!("batch planner dropped op {}: {}", dropped.context, dropped.reason);
    }

    plan
}

/// Append excess-cancel ops after rebalance creates, as §5 requires.
pub fn append_cancels(plan: &mut BatchPlan, order_ids: &[(String, String)]) {
    for (slot_id, chain_order_id) in order_ids {
        plan.ops.push(ChainOp::Cancel { context: format!("cancel:{slot_id}"), order_id: chain_order_id.clone() });
    }
}

/// Validate that a batch's representable-range checks already ran (i.e. no
/// op in `ops` references an amount outside what its precision can encode).
/// Exposed for property tests; `plan_rebalance_batch` already enforces this
/// per-op by construction.
pub fn all_amounts_representable(precision: AssetPrecision, amounts: &[f64]) -> bool {
    amounts.iter().all(|a| precision.float_to_chain_int(*a).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Side;

    fn assets() -> PrecisionPair {
        PrecisionPair { asset_a: AssetPrecision::new(8), asset_b: AssetPrecision::new(6) }
    }

    #[test]
    fn create_sell_computes_min_to_receive_as_size_times_price() {
        let mut plan = BatchPlan::default();
        let place = PlaceOrder { slot_id: "sell-0".into(), side: Side::Sell, price: 200.0, size: 1.5 };
        plan_create(&place, &assets(), "A", "B", &mut plan);
        assert_eq!(plan.dropped.len(), 0);
        match &plan.ops[0] {
            ChainOp::Create { sell_amount, min_to_receive, sell_asset, receive_asset, .. } => {
                assert_eq!(*sell_amount, 150_000_000); // 1.5 at 8 decimals
                assert_eq!(*min_to_receive, 300_000_000); // 300.0 at 6 decimals
                assert_eq!(sell_asset, "A");
                assert_eq!(receive_asset, "B");
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn toward_market_zero_delta_update_nudges_by_one_unit() {
        let mut plan = BatchPlan::default();
        plan_update("ctx".into(), "chain-1", Side::Sell, 200.0, 1.0, 199.0, 1.0, AssetPrecision::new(8), &mut plan);
        match &plan.ops[0] {
            ChainOp::Update { amount_delta, new_price, .. } => {
                assert_eq!(*amount_delta, 1);
                assert_eq!(*new_price, Some(199.0));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn away_from_market_zero_delta_update_is_true_no_op() {
        let mut plan = BatchPlan::default();
        // SELL moving price up is away from market.
        plan_update("ctx".into(), "chain-1", Side::Sell, 200.0, 1.0, 201.0, 1.0, AssetPrecision::new(8), &mut plan);
        match &plan.ops[0] {
            ChainOp::Update { amount_delta, new_price, .. } => {
                assert_eq!(*amount_delta, 0);
                assert_eq!(*new_price, Some(201.0));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn non_representable_amount_is_dropped_with_reason() {
        let mut plan = BatchPlan::default();
        let place = PlaceOrder { slot_id: "sell-0".into(), side: Side::Sell, price: 200.0, size: -1.0 };
        plan_create(&place, &assets(), "A", "B", &mut plan);
        assert!(plan.ops.is_empty());
        assert_eq!(plan.dropped.len(), 1);
    }

    #[test]
    fn cancels_are_appended_after_creates() {
        let mut plan = BatchPlan::default();
        let place = PlaceOrder { slot_id: "sell-0".into(), side: Side::Sell, price: 200.0, size: 1.0 };
        plan_create(&place, &assets(), "A", "B", &mut plan);
        append_cancels(&mut plan, &[("sell-9".into(), "chain-9".into())]);
        assert_eq!(plan.ops.len(), 2);
        assert!(matches!(plan.ops[0], ChainOp::Create { .. }));
        assert!(matches!(plan.ops[1], ChainOp::Cancel { .. }));
    }
}
