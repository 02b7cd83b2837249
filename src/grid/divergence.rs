//! Divergence detector (§4.6): after a rotation, checks whether a side's
//! actual resting sizes have drifted from what current funds would now
//! generate, and resizes in place (prices and ids untouched) when they have.

use log::info;

use crate::config::BotConfig;
use crate::model::{FundLedger, Side};

use super::generator::ideal_sizes;
use super::store::OrderStore;

/// One side's divergence check. `resized_slots` is empty unless `triggered`.
#[derive(Debug, Clone, PartialEq)]
pub struct DivergenceReport {
    pub side: Side,
    pub metric: f64,
    pub triggered: bool,
    pub resized_slots: Vec<(String, f64)>,
}

/// Compute the divergence metric for `side` and, if it exceeds
/// `config.divergence_threshold`, resize every active/partial slot's size to
/// match the ideal distribution over current funds, adjusting the ledger's
/// committed/available split to match without changing `total`.
pub fn check_and_resize(
    store: &mut OrderStore,
    ledger: &mut FundLedger,
    config: &BotConfig,
    side: Side,
) -> DivergenceReport {
    let weight = match side {
        Side::Sell => config.sell.weight,
        Side::Buy => config.buy.weight,
        Side::Spread => 0.0,
    };

    let actives = store.actives_innermost_first(side);
    let ids: Vec<String> = actives.iter().map(|s| s.id.clone()).collect();
    let current_sizes: Vec<f64> = actives.iter().map(|s| s.size).collect();
    let count = ids.len();

    let funds = ledger.side(side);
    let effective_funds = funds.committed + funds.available.max(0.0) + funds.pending_proceeds + funds.cache_funds;

    let ideal = ideal_sizes(count, config.increment_percent, weight, effective_funds);

    let metric: f64 = current_sizes.iter().zip(ideal.iter()).map(|(actual, target)| (actual - target).abs()).sum();
    let triggered = metric > config.divergence_threshold;

    let mut resized_slots = Vec::new();
    if triggered {
        let old_committed: f64 = current_sizes.iter().sum();
        let new_committed: f64 = ideal.iter().sum();
        for (id, new_size) in ids.iter().zip(ideal.iter()) {
            store.update(id, |s| s.size = *new_size);
            resized_slots.push((id.clone(), *new_size));
        }

        // `new_committed` was sized against committed + available + proceeds
        // + cache (the same `effective_funds` used above), so all four must
        // be folded into the new `committed` together: release the old
        // committed amount, then redeploy proceeds and cache first (they are
        // what made `new_committed` exceed the old committed+available in
        // the first place) before drawing on `available`. Leaving proceeds
        // or cache un-zeroed here double-counts them against the resized
        // sizes and drives `available` negative (§3/§8 non-negativity).
        let funds = ledger.side_mut(side);
        funds.release(old_committed);
        let mut remaining = new_committed;
        let from_proceeds = remaining.min(funds.pending_proceeds.max(0.0));
        funds.pending_proceeds -= from_proceeds;
        remaining -= from_proceeds;
        let from_cache = remaining.min(funds.cache_funds.max(0.0));
        funds.cache_funds -= from_cache;
        remaining -= from_cache;
        let from_available = remaining.min(funds.available.max(0.0));
        funds.available -= from_available;
        funds.committed += from_proceeds + from_cache + from_available;

        info!("divergence on {side:?} ({metric:.8} > {}); resized {count} slots", config.divergence_threshold);
    }

    DivergenceReport { side, metric, triggered, resized_slots }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PriceBound, SideConfig};
    use crate::model::GridSlot;

    fn config(threshold: f64) -> BotConfig {
        let mut c = BotConfig::new(
            "A",
            "B",
            "acct",
            100.0,
            PriceBound::Literal(50.0),
            PriceBound::Literal(200.0),
            1.0,
            SideConfig { weight: 1.0, funds: 10.0, active_orders: 3 },
            SideConfig { weight: 1.0, funds: 1000.0, active_orders: 3 },
        );
        c.divergence_threshold = threshold;
        c
    }

    fn populated_store() -> OrderStore {
        let mut store = OrderStore::new();
        for (idx, price) in [(0, 196.0), (1, 198.0), (2, 200.0)] {
            let mut slot = GridSlot::new(format!("sell-{idx}"), Side::Sell, price, 1.0);
            slot.activate(format!("c{idx}"));
            store.insert(slot);
        }
        store
    }

    #[test]
    fn no_divergence_below_threshold_leaves_sizes_untouched() {
        let mut store = populated_store();
        let mut ledger = FundLedger::new(3.0, 1000.0);
        ledger.sell.commit(3.0);
        let report = check_and_resize(&mut store, &mut ledger, &config(f64::MAX), Side::Sell);
        assert!(!report.triggered);
        assert!(report.resized_slots.is_empty());
    }

    #[test]
    fn divergence_above_threshold_resizes_and_rebalances_ledger() {
        let mut store = populated_store();
        // committed (3.0) is way off from what 10.0 in funds would generate
        let mut ledger = FundLedger::new(10.0, 1000.0);
        ledger.sell.commit(3.0);
        let report = check_and_resize(&mut store, &mut ledger, &config(0.01), Side::Sell);
        assert!(report.triggered);
        assert_eq!(report.resized_slots.len(), 3);
        assert!(ledger.sell.is_conserved(1e-6));
        let total_new_size: f64 = store.by_side_state(Side::Sell, crate::model::SlotState::Active).map(|s| s.size).sum();
        assert!((total_new_size - ledger.sell.committed).abs() < 1e-6);
    }

    #[test]
    fn leftover_proceeds_and_cache_are_folded_in_without_driving_available_negative() {
        let mut store = populated_store();
        let mut ledger = FundLedger::new(10.0, 1000.0);
        ledger.sell.commit(3.0);
        // leftover proceeds/cache from an earlier partially-funded rotation
        // that the resize must redeploy, not double-count on top of.
        ledger.sell.pending_proceeds = 4.0;
        ledger.sell.cache_funds = 1.0;
        let report = check_and_resize(&mut store, &mut ledger, &config(0.01), Side::Sell);
        assert!(report.triggered);
        assert!(ledger.sell.available >= -1e-9, "available went negative: {}", ledger.sell.available);
        assert_eq!(ledger.sell.pending_proceeds, 0.0);
        assert_eq!(ledger.sell.cache_funds, 0.0);
    }
}
