//! Reconciler (§4.4): aligns the persisted snapshot with the chain's open
//! orders, both at startup and whenever the two disagree in steady state.
//! The decision is an explicit sum type rather than exception-driven
//! control flow (§9).

use log::{info, warn};

use crate::config::BotConfig;
use crate::model::{GridSlot, Side, SlotState};

use super::store::OrderStore;

/// One order as reported by the chain, already parsed into the shape the
/// reconciler needs.
#[derive(Debug, Clone)]
pub struct ChainOrder {
    pub chain_order_id: String,
    pub side: Side,
    pub price: f64,
    pub remaining: f64,
}

/// The reconciler's decision, returned instead of throwing / branching on
/// booleans + out-parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileDecision {
    /// No usable prior state; place a fresh grid.
    Regenerate,
    /// Persisted grid resumes; chain orders were matched by id.
    ResumeById,
    /// Persisted grid resumes; chain orders were matched by closest price
    /// within half an increment's tolerance.
    ResumeByPriceMatch,
}

/// Result of running the reconciler: the decision plus the repurposed store.
pub struct ReconcileOutcome {
    pub decision: ReconcileDecision,
    pub store: OrderStore,
    /// Chain orders that were not matched to any persisted slot and must be
    /// cancelled outright (target count already met).
    pub unmatched_for_cancel: Vec<ChainOrder>,
}

/// Decide how to reconcile and produce the resulting store.
pub fn reconcile(
    config: &BotConfig,
    persisted: Option<Vec<GridSlot>>,
    chain_orders: &[ChainOrder],
) -> ReconcileOutcome {
    let persisted = match persisted {
        None => {
            info!("no persisted snapshot; regenerating grid");
            return ReconcileOutcome {
                decision: ReconcileDecision::Regenerate,
                store: OrderStore::new(),
                unmatched_for_cancel: Vec::new(),
            };
        }
        Some(p) if p.is_empty() => {
            return ReconcileOutcome {
                decision: ReconcileDecision::Regenerate,
                store: OrderStore::new(),
                unmatched_for_cancel: Vec::new(),
            };
        }
        Some(p) => p,
    };

    let any_persisted_id_on_chain = persisted.iter().any(|slot| {
        slot.chain_order_id
            .as_ref()
            .is_some_and(|id| chain_orders.iter().any(|c| &c.chain_order_id == id))
    });

    if any_persisted_id_on_chain || chain_orders.is_empty() {
        if chain_orders.is_empty() && persisted.iter().any(|s| s.state.requires_chain_order_id()) {
            // Steady state with no chain orders at all but persisted actives:
            // nothing to resume against. Fail safe to regenerate.
            warn!("persisted grid has active slots but chain reports no open orders; regenerating");
            return ReconcileOutcome {
                decision: ReconcileDecision::Regenerate,
                store: OrderStore::new(),
                unmatched_for_cancel: Vec::new(),
            };
        }
        info!("resuming persisted grid by chain order id");
        let store = OrderStore::from_slots(persisted);
        return ReconcileOutcome {
            decision: ReconcileDecision::ResumeById,
            store,
            unmatched_for_cancel: Vec::new(),
        };
    }

    // No id matches found but both sides are non-empty: attempt price-match resume.
    let tolerance_ratio = config.increment_percent / 200.0; // half an increment, as a fraction
    let mut matched_chain_ids = std::collections::HashSet::new();
    let mut slots = persisted;
    for slot in slots.iter_mut().filter(|s| s.side.is_tradeable()) {
        let tolerance = slot.price * tolerance_ratio;
        if let Some(closest) = chain_orders
            .iter()
            .filter(|c| !matched_chain_ids.contains(&c.chain_order_id) && c.side == slot.side)
            .min_by(|a, b| {
                (a.price - slot.price)
                    .abs()
                    .partial_cmp(&(b.price - slot.price).abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        {
            if (closest.price - slot.price).abs() <= tolerance {
                matched_chain_ids.insert(closest.chain_order_id.clone());
                slot.activate(closest.chain_order_id.clone());
                if closest.remaining < slot.size {
                    slot.mark_partial(closest.remaining);
                }
            }
        }
    }

    let matched_any = !matched_chain_ids.is_empty();
    let unmatched: Vec<ChainOrder> = chain_orders
        .iter()
        .filter(|c| !matched_chain_ids.contains(&c.chain_order_id))
        .cloned()
        .collect();

    if matched_any {
        info!(
            "resumed {} of {} chain orders by closest-price match",
            matched_chain_ids.len(),
            chain_orders.len()
        );
        ReconcileOutcome {
            decision: ReconcileDecision::ResumeByPriceMatch,
            store: OrderStore::from_slots(slots),
            unmatched_for_cancel: unmatched,
        }
    } else {
        warn!("no chain orders matched persisted grid by id or price; regenerating");
        ReconcileOutcome {
            decision: ReconcileDecision::Regenerate,
            store: OrderStore::new(),
            unmatched_for_cancel: chain_orders.to_vec(),
        }
    }
}

/// After reconciliation, activate outermost virtuals or cancel innermost
/// actives so each side's active count matches `activeOrders[side]`.
pub struct ActivationPlan {
    pub to_activate: Vec<String>,
    pub to_cancel: Vec<String>,
}

pub fn plan_active_count_adjustment(store: &OrderStore, side: Side, target: usize) -> ActivationPlan {
    let current = store.active_count(side);
    if current < target {
        let need = target - current;
        let virtuals = store.virtuals_outermost_first(side);
        ActivationPlan {
            to_activate: virtuals.into_iter().take(need).map(|s| s.id.clone()).collect(),
            to_cancel: Vec::new(),
        }
    } else if current > target {
        let excess = current - target;
        let actives = store.actives_innermost_first(side);
        ActivationPlan {
            to_activate: Vec::new(),
            to_cancel: actives.into_iter().take(excess).map(|s| s.id.clone()).collect(),
        }
    } else {
        ActivationPlan { to_activate: Vec::new(), to_cancel: Vec::new() }
    }
}
