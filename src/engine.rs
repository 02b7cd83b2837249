//! The Order Manager engine: the trigger loop (§4.9) and the single-writer
//! orchestration (§5) that ties the grid generator, store, fill reducer,
//! reconciler, rebalancer, divergence detector, and batch planner together
//! around one `ChainClient`. Mirrors the run-loop shape of
//! `grid::runner::SpotGridRunner` in this codebase: one `tokio::select!`
//! loop per bot, driven by a fill channel and a periodic tick.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use tokio::time::interval;

use crate::chain::{ChainClient, ChainOp, ChainOpResult, FillFeed};
use crate::config::BotConfig;
use crate::errors::{EngineResult, OrderManagerError};
use crate::grid::batch_planner::{self, PrecisionPair};
use crate::grid::divergence;
use crate::grid::fill_reducer::{self, DedupWindow, FillEvent, FillPrecision};
use crate::grid::generator;
use crate::grid::rebalancer;
use crate::grid::reconciler::{self, ReconcileDecision};
use crate::grid::store::OrderStore;
use crate::model::{BotMeta, BotSnapshot, FundLedger, Side, SlotState};
use crate::persistence::SnapshotStore;
use crate::precision::AssetPrecision;

/// Everything the engine needs about both assets in the pair to convert
/// sizes to chain integers and tag chain ops with symbols (§6's `assetMeta`).
#[derive(Debug, Clone, Copy)]
pub struct PairPrecision {
    pub asset_a: AssetPrecision,
    pub asset_b: AssetPrecision,
}

/// Reentrancy guards (§5): `_processingFill`, `_runningDivergenceCorrections`,
/// `_isResyncing` from the source, lifted into plain struct fields since the
/// engine's loop is already single-task and cooperative.
#[derive(Debug, Default)]
struct Guards {
    running_divergence_corrections: bool,
    is_resyncing: bool,
}

/// One running bot: its grid, ledger, dedup window, and persistence handle.
/// Generic over `C: ChainClient` the way this codebase's runners are generic
/// over `E: GridExchange` — the core never depends on a concrete chain impl.
pub struct OrderManager<C: ChainClient> {
    config: BotConfig,
    chain: C,
    store: OrderStore,
    ledger: FundLedger,
    dedup: DedupWindow,
    precision: PairPrecision,
    snapshots: SnapshotStore,
    guards: Guards,
    created_at: i64,
}

impl<C: ChainClient> OrderManager<C> {
    /// Construct a fresh manager (no reconciliation yet; call `start` next).
    pub fn new(config: BotConfig, chain: C, profiles_dir: impl AsRef<std::path::Path>, precision: PairPrecision) -> Self {
        let account = config.preferred_account.clone();
        let sell_total = config.sell.funds;
        let buy_total = config.buy.funds;
        Self {
            snapshots: SnapshotStore::for_account(profiles_dir, &account),
            store: OrderStore::new(),
            ledger: FundLedger::new(sell_total, buy_total),
            dedup: DedupWindow::new(Duration::from_secs(config.fill_dedup_window_secs)),
            precision,
            guards: Guards::default(),
            created_at: 0,
            config,
            chain,
        }
    }

    fn bot_key(&self) -> String {
        self.config.bot_key()
    }

    fn precision_pair(&self) -> PrecisionPair {
        PrecisionPair { asset_a: self.precision.asset_a, asset_b: self.precision.asset_b }
    }

    fn fill_precision(&self) -> FillPrecision {
        FillPrecision { asset_a: self.precision.asset_a, asset_b: self.precision.asset_b }
    }

    fn slot_precision(&self, side: Side) -> AssetPrecision {
        match side {
            Side::Sell => self.precision.asset_a,
            Side::Buy => self.precision.asset_b,
            Side::Spread => self.precision.asset_a,
        }
    }

    /// §4.9 step 1 and §4.4: reconcile persisted snapshot with chain state,
    /// then place an initial batch if regenerating.
    pub async fn start(&mut self, now_millis: i64) -> EngineResult<()> {
        self.guards.is_resyncing = true;
        let result = self.start_inner(now_millis).await;
        self.guards.is_resyncing = false;
        result
    }

    async fn start_inner(&mut self, now_millis: i64) -> EngineResult<()> {
        let persisted = self.snapshots.load_bot(&self.bot_key())?;
        if let Some(snapshot) = &persisted {
            self.ledger = snapshot.ledger.clone();
        }
        let chain_orders = self.chain.read_open_orders(&self.config.preferred_account).await?;

        let outcome = reconciler::reconcile(&self.config, persisted.as_ref().map(|s| s.grid.clone()), &chain_orders);

        match outcome.decision {
            ReconcileDecision::Regenerate => {
                info!("bot {}: regenerating grid on start", self.bot_key());
                self.created_at = now_millis;
                let fees_owed = self.ledger.fees_owed;
                self.ledger = FundLedger::new(self.config.sell.funds, self.config.buy.funds);
                self.ledger.fees_owed = fees_owed;
                self.regenerate_and_place(&chain_orders).await?;
            }
            ReconcileDecision::ResumeById | ReconcileDecision::ResumeByPriceMatch => {
                info!("bot {}: resuming persisted grid ({:?})", self.bot_key(), outcome.decision);
                self.store = outcome.store;
                self.created_at = persisted.map(|s| s.created_at).unwrap_or(now_millis);
                self.apply_active_count_adjustments(now_millis).await?;
                if !outcome.unmatched_for_cancel.is_empty() {
                    let cancels: Vec<ChainOp> = outcome
                        .unmatched_for_cancel
                        .iter()
                        .map(|c| ChainOp::Cancel { context: format!("unmatched:{}", c.chain_order_id), order_id: c.chain_order_id.clone() })
                        .collect();
                    self.submit(cancels).await?;
                }
            }
        }

        self.persist(now_millis)?;
        Ok(())
    }

    async fn regenerate_and_place(&mut self, chain_orders: &[reconciler::ChainOrder]) -> EngineResult<()> {
        let generated = generator::generate_grid(&self.config);
        if generated.all_zero_sizes {
            return Err(OrderManagerError::InvalidConfig(
                "minOrderSize cannot be satisfied with configured funds; aborting placement".into(),
            ));
        }
        self.store = OrderStore::from_slots(generated.slots);

        for side in [Side::Sell, Side::Buy] {
            for slot in self.store.iter().filter(|s| s.side == side && s.size > 0.0).map(|s| s.id.clone()).collect::<Vec<_>>() {
                let size = self.store.get(&slot).map(|s| s.size).unwrap_or(0.0);
                self.ledger.side_mut(side).reserve_virtual(size);
            }
        }

        if self.config.dry_run {
            info!("bot {}: dry run, skipping chain placement", self.bot_key());
            return Ok(());
        }

        // Reconcile existing chain orders against the fresh grid's target
        // counts: update-in-place is preferred, then cancel any excess.
        let cancels: Vec<ChainOp> = chain_orders
            .iter()
            .map(|c| ChainOp::Cancel { context: format!("regen-cancel:{}", c.chain_order_id), order_id: c.chain_order_id.clone() })
            .collect();
        if !cancels.is_empty() {
            self.submit(cancels).await?;
        }

        for side in [Side::Sell, Side::Buy] {
            let target = self.active_orders_target(side);
            self.activate_outermost_virtuals(side, target).await?;
        }

        Ok(())
    }

    fn active_orders_target(&self, side: Side) -> usize {
        match side {
            Side::Sell => self.config.sell.active_orders as usize,
            Side::Buy => self.config.buy.active_orders as usize,
            Side::Spread => 0,
        }
    }

    /// §4.4's final paragraph and boundary behaviors in §8: activate
    /// outermost virtuals on a shortfall, cancel innermost actives on excess.
    async fn apply_active_count_adjustments(&mut self, _now_millis: i64) -> EngineResult<()> {
        for side in [Side::Sell, Side::Buy] {
            let target = self.active_orders_target(side);
            let plan = reconciler::plan_active_count_adjustment(&self.store, side, target);
            if !plan.to_activate.is_empty() {
                self.activate_virtual_ids(side, &plan.to_activate).await?;
            }
            if !plan.to_cancel.is_empty() {
                let mut ops = Vec::new();
                for slot_id in &plan.to_cancel {
                    if let Some(slot) = self.store.get(slot_id) {
                        if let Some(order_id) = slot.chain_order_id.clone() {
                            ops.push(ChainOp::Cancel { context: format!("shrink:{slot_id}"), order_id });
                        }
                        let size = slot.size;
                        self.store.update(slot_id, |s| s.retarget(s.price, 0.0));
                        self.ledger.side_mut(side).release(size);
                    }
                }
                self.submit(ops).await?;
            }
        }
        Ok(())
    }

    async fn activate_outermost_virtuals(&mut self, side: Side, target: usize) -> EngineResult<()> {
        let current = self.store.active_count(side);
        if current >= target {
            return Ok(());
        }
        let need = target - current;
        let ids: Vec<String> = self.store.virtuals_outermost_first(side).into_iter().take(need).map(|s| s.id.clone()).collect();
        self.activate_virtual_ids(side, &ids).await
    }

    async fn activate_virtual_ids(&mut self, side: Side, ids: &[String]) -> EngineResult<()> {
        if ids.is_empty() || self.config.dry_run {
            return Ok(());
        }
        let assets = self.precision_pair();
        let (asset_a, asset_b) = (self.config.asset_a.clone(), self.config.asset_b.clone());
        let orders_to_place: Vec<rebalancer::PlaceOrder> = ids
            .iter()
            .filter_map(|id| self.store.get(id))
            .filter(|slot| slot.size > 0.0)
            .map(|slot| rebalancer::PlaceOrder { slot_id: slot.id.clone(), side, price: slot.price, size: slot.size })
            .collect();
        let plan = batch_planner::plan_rebalance_batch(
            &rebalancer::RebalanceResult { orders_to_place, ..Default::default() },
            &assets,
            &asset_a,
            &asset_b,
            &|_| None,
        );
        let results = self.submit(plan.ops).await?;
        for result in results {
            if let ChainOpResult::Created { context, chain_order_id } = result {
                if let Some(slot_id) = context.strip_prefix("create:") {
                    let size = self.store.get(slot_id).map(|s| s.size).unwrap_or(0.0);
                    self.store.update(slot_id, |s| s.activate(chain_order_id.clone()));
                    self.ledger.side_mut(side).unreserve_virtual(size);
                    self.ledger.side_mut(side).commit(size);
                }
            }
        }
        Ok(())
    }

    /// §4.3-§4.7: reduce a deduped batch of fills, rebalance, plan, submit,
    /// apply divergence correction, and persist. This is the single entry
    /// point the trigger loop calls for each drained batch of fills.
    pub async fn process_fill_batch(&mut self, events: &[FillEvent], now_millis: i64) -> EngineResult<()> {
        let previous_prices: std::collections::HashMap<String, (f64, f64)> =
            self.store.iter().map(|s| (s.id.clone(), (s.price, s.size))).collect();

        let now = Instant::now();
        let precision = self.fill_precision();
        let reduced = fill_reducer::reduce_batch(&mut self.store, &mut self.ledger, &mut self.dedup, events, now, &precision);
        if reduced.is_empty() {
            return Ok(());
        }

        let suppress = self.guards.running_divergence_corrections;
        let result = rebalancer::rebalance(&mut self.store, &mut self.ledger, self.config.increment_percent, &reduced, suppress);

        if !self.config.dry_run {
            let assets = self.precision_pair();
            let plan = batch_planner::plan_rebalance_batch(
                &result,
                &assets,
                &self.config.asset_a,
                &self.config.asset_b,
                &|id| previous_prices.get(id).copied(),
            );
            self.submit(plan.ops).await?;
        }

        let mut touched_sides: Vec<Side> = reduced.iter().map(|f| f.side.opposite()).collect();
        touched_sides.sort_by_key(|s| format!("{s:?}"));
        touched_sides.dedup();
        for side in touched_sides {
            self.run_divergence_check(side).await?;
        }

        self.persist(now_millis)?;
        Ok(())
    }

    /// §4.6: run the divergence check for one side, correcting via the
    /// rebalancer's batch planner if it fires, guarded against cascading
    /// into further rotations.
    async fn run_divergence_check(&mut self, side: Side) -> EngineResult<()> {
        let old_sizes: std::collections::HashMap<String, f64> = self
            .store
            .iter()
            .filter(|s| s.side == side && matches!(s.state, SlotState::Active | SlotState::Partial))
            .map(|s| (s.id.clone(), s.size))
            .collect();

        let report = divergence::check_and_resize(&mut self.store, &mut self.ledger, &self.config, side);
        if !report.triggered || self.config.dry_run {
            return Ok(());
        }

        self.guards.running_divergence_corrections = true;
        let precision = self.slot_precision(side);
        let mut ops = Vec::new();
        for (slot_id, new_size) in &report.resized_slots {
            let Some(&old_size) = old_sizes.get(slot_id) else { continue };
            if let Some(slot) = self.store.get(slot_id) {
                if let (Some(order_id), Some(old_amount), Some(new_amount)) =
                    (slot.chain_order_id.clone(), precision.float_to_chain_int(old_size), precision.float_to_chain_int(*new_size))
                {
                    let delta = new_amount as i64 - old_amount as i64;
                    if delta != 0 {
                        ops.push(ChainOp::Update {
                            context: format!("divergence:{slot_id}"),
                            order_id,
                            amount_delta: delta,
                            new_price: None,
                        });
                    }
                }
            }
        }
        self.submit(ops).await?;
        self.guards.running_divergence_corrections = false;
        Ok(())
    }

    /// §4.9 step 3: periodic tick. Refreshes chain order status for
    /// still-ACTIVE slots, treats vanished chain orders as full fills (the
    /// §4.2 "matching chain order vanished" FILLED trigger), and re-persists
    /// if anything changed.
    pub async fn tick(&mut self, now_millis: i64) -> EngineResult<()> {
        if self.guards.is_resyncing {
            return Ok(());
        }
        let chain_orders = self.chain.read_open_orders(&self.config.preferred_account).await?;
        let on_chain: std::collections::HashSet<&str> = chain_orders.iter().map(|c| c.chain_order_id.as_str()).collect();

        let vanished: Vec<(String, Side)> = self
            .store
            .iter()
            .filter(|s| matches!(s.state, SlotState::Active | SlotState::Partial))
            .filter(|s| s.chain_order_id.as_deref().is_some_and(|id| !on_chain.contains(id)))
            .map(|s| (s.id.clone(), s.side))
            .collect();

        if vanished.is_empty() {
            return Ok(());
        }

        info!("bot {}: tick detected {} missed fill(s)", self.bot_key(), vanished.len());
        let mut reduced = Vec::new();
        for (slot_id, side) in vanished {
            let size = self.store.get(&slot_id).map(|s| s.size).unwrap_or(0.0);
            self.ledger.side_mut(side).release(size);
            self.store.update(&slot_id, |s| s.mark_filled());
            reduced.push(fill_reducer::ReducedFill { slot_id, side, full: true });
        }

        let result = rebalancer::rebalance(&mut self.store, &mut self.ledger, self.config.increment_percent, &reduced, false);
        if !self.config.dry_run && !result.orders_to_rotate.is_empty() {
            let assets = self.precision_pair();
            let plan = batch_planner::plan_rebalance_batch(&result, &assets, &self.config.asset_a, &self.config.asset_b, &|_| None);
            self.submit(plan.ops).await?;
        }

        self.persist(now_millis)?;
        Ok(())
    }

    /// §4.9 step 4: an external `recalculate.<botKey>.trigger` file appeared.
    /// Cancel all non-matching chain orders, regenerate, reset the
    /// per-resize ledger fields, place initial orders, persist.
    pub async fn recalculate(&mut self, now_millis: i64) -> EngineResult<()> {
        self.guards.is_resyncing = true;
        let result = self.recalculate_inner(now_millis).await;
        self.guards.is_resyncing = false;
        result
    }

    async fn recalculate_inner(&mut self, now_millis: i64) -> EngineResult<()> {
        info!("bot {}: recalculate signal received", self.bot_key());
        let chain_orders = self.chain.read_open_orders(&self.config.preferred_account).await?;
        // feesOwed is never recomputed (§9(c)); only pendingProceeds/cacheFunds
        // and the committed/available split reset along with the fresh grid.
        let fees_owed = self.ledger.fees_owed;
        self.ledger = FundLedger::new(self.config.sell.funds, self.config.buy.funds);
        self.ledger.fees_owed = fees_owed;
        self.regenerate_and_place(&chain_orders).await?;
        self.persist(now_millis)?;
        Ok(())
    }

    /// Submit one batch of ops (already in §5 order), skipping the call
    /// entirely if empty. Propagates transient chain errors so the trigger
    /// loop's next tick can re-reconcile per §7.
    async fn submit(&mut self, ops: Vec<ChainOp>) -> EngineResult<Vec<ChainOpResult>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        match self.chain.execute_batch(&self.config.preferred_account, &ops).await {
            Ok(results) => {
                for result in &results {
                    if let ChainOpResult::Failed { context, reason } = result {
                        warn!("bot {}: chain op {} failed: {}", self.bot_key(), context, reason);
                    }
                }
                Ok(results)
            }
            Err(err) => {
                error!("bot {}: batch submission failed: {}", self.bot_key(), err);
                Err(err)
            }
        }
    }

    fn persist(&mut self, now_millis: i64) -> EngineResult<()> {
        let bot_key = self.bot_key();
        let snapshot = BotSnapshot {
            meta: BotMeta { asset_a: self.config.asset_a.clone(), asset_b: self.config.asset_b.clone(), bot_key: bot_key.clone() },
            grid: self.store.snapshot_slots(),
            ledger: self.ledger.clone(),
            created_at: self.created_at,
            updated_at: now_millis,
        };
        self.snapshots.save_bot(&bot_key, &snapshot)
    }

    pub fn ledger(&self) -> &FundLedger {
        &self.ledger
    }

    pub fn store(&self) -> &OrderStore {
        &self.store
    }
}

/// §4.9: the trigger loop itself, run as one cooperative task per bot.
/// `trigger_file` is the profiles-directory path checked each tick for
/// `recalculate.<botKey>.trigger` (§6); presence causes a full resync and
/// the file is removed afterward.
pub async fn run_trigger_loop<C: ChainClient, F: FillFeed>(
    manager: &mut OrderManager<C>,
    fill_feed: &F,
    trigger_file: PathBuf,
    mut clock_millis: impl FnMut() -> i64,
) -> EngineResult<()> {
    manager.start(clock_millis()).await?;
    let mut fill_rx = fill_feed.subscribe(&manager.config.preferred_account).await?;
    let mut ticker = interval(Duration::from_secs(manager.config.tick_interval_secs));

    loop {
        tokio::select! {
            maybe_fill = fill_rx.recv() => {
                match maybe_fill {
                    Some(first) => {
                        // Drain whatever else is already queued so one
                        // aggregated batch is processed per §5.
                        let mut batch = vec![first];
                        while let Ok(next) = fill_rx.try_recv() {
                            batch.push(next);
                        }
                        if let Err(err) = manager.process_fill_batch(&batch, clock_millis()).await {
                            error!("bot {}: fill batch processing failed: {err}", manager.bot_key());
                        }
                    }
                    None => {
                        warn!("bot {}: fill feed closed, stopping trigger loop", manager.bot_key());
                        return Ok(());
                    }
                }
            }
            _ = ticker.tick() => {
                if trigger_file.exists() {
                    if let Err(err) = manager.recalculate(clock_millis()).await {
                        error!("bot {}: recalculate failed: {err}", manager.bot_key());
                    }
                    std::fs::remove_file(&trigger_file).ok();
                } else if let Err(err) = manager.tick(clock_millis()).await {
                    error!("bot {}: tick failed: {err}", manager.bot_key());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MockChainClient, MockFillFeed};
    use crate::config::{PriceBound, SideConfig};

    fn config() -> BotConfig {
        BotConfig::new(
            "A",
            "B",
            "acct",
            100.0,
            PriceBound::Literal(50.0),
            PriceBound::Literal(200.0),
            1.0,
            SideConfig { weight: 1.0, funds: 10.0, active_orders: 5 },
            SideConfig { weight: 1.0, funds: 1000.0, active_orders: 5 },
        )
        .with_target_spread_percent(4.0)
    }

    fn precision() -> PairPrecision {
        PairPrecision { asset_a: AssetPrecision::new(8), asset_b: AssetPrecision::new(6) }
    }

    #[tokio::test]
    async fn scenario_s1_start_places_initial_grid() {
        let dir = std::env::temp_dir().join(format!("grid-om-engine-s1-{}", std::process::id()));
        let chain = MockChainClient::new();
        let mut manager = OrderManager::new(config(), chain, &dir, precision());
        manager.start(0).await.unwrap();

        assert_eq!(manager.store().active_count(Side::Sell), 5);
        assert_eq!(manager.store().active_count(Side::Buy), 5);
        assert!((manager.ledger().sell.available).abs() < 1e-6);
        assert!((manager.ledger().buy.available).abs() < 1e-6);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn scenario_s2_full_fill_rotates_and_persists() {
        let dir = std::env::temp_dir().join(format!("grid-om-engine-s2-{}", std::process::id()));
        let chain = MockChainClient::new();
        let mut manager = OrderManager::new(config(), chain, &dir, precision());
        manager.start(0).await.unwrap();

        let innermost_sell = manager.store().innermost_active_for_rotation(Side::Sell).unwrap().clone();
        let event = FillEvent {
            order_id: innermost_sell.chain_order_id.clone().unwrap(),
            block: 1,
            history_id: 1,
            pays_amount: innermost_sell.size,
            receives_amount: innermost_sell.size * innermost_sell.price,
            is_maker: true,
        };

        manager.process_fill_batch(&[event], 1).await.unwrap();

        assert_eq!(manager.store().get(&innermost_sell.id).unwrap().state, SlotState::Filled);
        let loaded = manager.snapshots.load_bot(&manager.bot_key()).unwrap().unwrap();
        assert_eq!(loaded.grid.len(), manager.store().len());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn duplicate_fill_in_same_batch_only_reduces_once() {
        let dir = std::env::temp_dir().join(format!("grid-om-engine-dup-{}", std::process::id()));
        let chain = MockChainClient::new();
        let mut manager = OrderManager::new(config(), chain, &dir, precision());
        manager.start(0).await.unwrap();

        let sell = manager.store().innermost_active_for_rotation(Side::Sell).unwrap().clone();
        let event = FillEvent {
            order_id: sell.chain_order_id.clone().unwrap(),
            block: 1,
            history_id: 7,
            pays_amount: sell.size,
            receives_amount: sell.size * sell.price,
            is_maker: true,
        };
        manager.process_fill_batch(&[event.clone(), event.clone()], 1).await.unwrap();
        assert_eq!(manager.store().get(&sell.id).unwrap().state, SlotState::Filled);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn recalculate_resets_proceeds_but_preserves_fees_owed() {
        let dir = std::env::temp_dir().join(format!("grid-om-engine-recalc-{}", std::process::id()));
        let chain = MockChainClient::new();
        let mut manager = OrderManager::new(config(), chain, &dir, precision());
        manager.start(0).await.unwrap();
        manager.ledger.buy.pending_proceeds = 123.0;
        manager.ledger.fees_owed = 4.0;

        manager.recalculate(2).await.unwrap();

        assert_eq!(manager.ledger().buy.pending_proceeds, 0.0);
        assert_eq!(manager.ledger().fees_owed, 4.0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn trigger_loop_ends_when_the_fill_feed_closes() {
        let dir = std::env::temp_dir().join(format!("grid-om-engine-loop-{}", std::process::id()));
        let chain = MockChainClient::new();
        let fill_feed = MockFillFeed::new();
        let mut manager = OrderManager::new(config(), chain, &dir, precision());

        let trigger_path = dir.join("recalculate.never.trigger");
        let loop_fut = run_trigger_loop(&mut manager, &fill_feed, trigger_path, || 0);
        tokio::pin!(loop_fut);

        // Poll once so `start`/`subscribe` run and the select! starts
        // waiting, then close the feed; the loop should return cleanly
        // rather than hang.
        let _ = tokio::time::timeout(Duration::from_millis(20), &mut loop_fut).await;
        fill_feed.unsubscribe("acct").await.unwrap();
        let result = tokio::time::timeout(Duration::from_millis(200), loop_fut).await;
        assert!(result.is_ok(), "trigger loop did not exit after the fill feed closed");

        std::fs::remove_dir_all(&dir).ok();
    }
}
