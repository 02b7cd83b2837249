//! Chain client boundary (§6): the single async trait the core is generic
//! over. The real implementation — connection, signing, broadcast — is out
//! of scope per §1; only the trait and a mock live in this crate, following
//! the dependency-injected-exchange pattern this codebase already uses for
//! its consumed exchange (see `grid::executor::GridExchange`).

use async_trait::async_trait;

use crate::errors::EngineResult;
use crate::grid::fill_reducer::FillEvent;
use crate::grid::reconciler::ChainOrder;
use crate::model::Side;
use crate::precision::AssetPrecision;

/// One chain operation the batch planner hands to `ChainClient::execute_batch`,
/// already in the order §5 requires (partial-moves → rotations → creates →
/// cancels). `context` threads a tag back to the op result so the caller can
/// map results back onto the grid slot that requested them.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOp {
    Create {
        context: String,
        side: Side,
        sell_asset: String,
        sell_amount: u64,
        receive_asset: String,
        min_to_receive: u64,
    },
    Update {
        context: String,
        order_id: String,
        amount_delta: i64,
        new_price: Option<f64>,
    },
    Cancel {
        context: String,
        order_id: String,
    },
}

impl ChainOp {
    pub fn context(&self) -> &str {
        match self {
            ChainOp::Create { context, .. } => context,
            ChainOp::Update { context, .. } => context,
            ChainOp::Cancel { context, .. } => context,
        }
    }
}

/// One result, positionally aligned with the `ChainOp` that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOpResult {
    Created { context: String, chain_order_id: String },
    Updated { context: String },
    Cancelled { context: String },
    Failed { context: String, reason: String },
}

/// `getAssetFees` response (§6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetFees {
    pub market_fee_bps: u32,
    pub max_market_fee: f64,
    pub taker_fee_bps: u32,
    pub maker_refund_pct: f64,
}

/// The chain client boundary consumed by the order manager. Every method is
/// a suspension point (§5): between calls the core is sequential.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn read_open_orders(&self, account: &str) -> EngineResult<Vec<ChainOrder>>;

    /// Execute one batch in the exact order given, returning results in the
    /// same order. A `Create` result yields a new `chain_order_id`.
    async fn execute_batch(&self, account: &str, ops: &[ChainOp]) -> EngineResult<Vec<ChainOpResult>>;

    async fn asset_meta(&self, asset: &str) -> EngineResult<AssetPrecision>;

    async fn get_asset_fees(&self, symbol: &str) -> EngineResult<AssetFees>;
}

/// Fill subscription boundary, split out from `ChainClient` the way this
/// codebase splits `PriceFeed`/`FillFeed` from `GridExchange` — the
/// subscription is shared per-account (§5) and outlives any one batch call.
#[async_trait]
pub trait FillFeed: Send + Sync {
    async fn subscribe(&self, account: &str) -> EngineResult<tokio::sync::mpsc::UnboundedReceiver<FillEvent>>;

    async fn unsubscribe(&self, account: &str) -> EngineResult<()>;
}

/// Mock chain client and fill feed for testing grid bots without a real
/// chain connection. Unconditionally `pub` (not `#[cfg(test)]`) so other
/// modules' own test code, and integration tests under `tests/`, can use it —
/// mirroring `grid::executor::mock::MockExchange` in this codebase.
pub mod mock {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use tokio::sync::{mpsc, Mutex};

    use super::*;

    /// Records every batch submitted, in submission order, so scenario tests
    /// can assert both end state and the §5 ordering guarantee.
    pub struct MockChainClient {
        pub open_orders: Arc<Mutex<Vec<ChainOrder>>>,
        pub submitted_batches: Arc<Mutex<Vec<Vec<ChainOp>>>>,
        pub precisions: Arc<Mutex<std::collections::HashMap<String, AssetPrecision>>>,
        pub fees: Arc<Mutex<std::collections::HashMap<String, AssetFees>>>,
        next_chain_order_id: AtomicU64,
        pub should_fail: Arc<Mutex<bool>>,
    }

    impl MockChainClient {
        pub fn new() -> Self {
            Self {
                open_orders: Arc::new(Mutex::new(Vec::new())),
                submitted_batches: Arc::new(Mutex::new(Vec::new())),
                precisions: Arc::new(Mutex::new(std::collections::HashMap::new())),
                fees: Arc::new(Mutex::new(std::collections::HashMap::new())),
                next_chain_order_id: AtomicU64::new(1),
                should_fail: Arc::new(Mutex::new(false)),
            }
        }

        pub async fn set_open_orders(&self, orders: Vec<ChainOrder>) {
            *self.open_orders.lock().await = orders;
        }

        pub async fn set_precision(&self, asset: &str, precision: AssetPrecision) {
            self.precisions.lock().await.insert(asset.to_string(), precision);
        }

        pub async fn set_should_fail(&self, fail: bool) {
            *self.should_fail.lock().await = fail;
        }

        /// Flattened view of every op ever submitted, in submission order.
        pub async fn all_ops(&self) -> Vec<ChainOp> {
            self.submitted_batches.lock().await.iter().flatten().cloned().collect()
        }
    }

    impl Default for MockChainClient {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ChainClient for MockChainClient {
        async fn read_open_orders(&self, _account: &str) -> EngineResult<Vec<ChainOrder>> {
            Ok(self.open_orders.lock().await.clone())
        }

        async fn execute_batch(&self, _account: &str, ops: &[ChainOp]) -> EngineResult<Vec<ChainOpResult>> {
            if *self.should_fail.lock().await {
                return Err(crate::errors::OrderManagerError::Transient("mock chain unavailable".into()));
            }
            self.submitted_batches.lock().await.push(ops.to_vec());
            let mut results = Vec::with_capacity(ops.len());
            for op in ops {
                let result = match op {
                    ChainOp::Create { context, .. } => {
                        let id = self.next_chain_order_id.fetch_add(1, Ordering::SeqCst);
                        ChainOpResult::Created { context: context.clone(), chain_order_id: format!("mock-{id}") }
                    }
                    ChainOp::Update { context, .. } => ChainOpResult::Updated { context: context.clone() },
                    ChainOp::Cancel { context, .. } => ChainOpResult::Cancelled { context: context.clone() },
                };
                results.push(result);
            }
            Ok(results)
        }

        async fn asset_meta(&self, asset: &str) -> EngineResult<AssetPrecision> {
            Ok(self.precisions.lock().await.get(asset).copied().unwrap_or_default())
        }

        async fn get_asset_fees(&self, symbol: &str) -> EngineResult<AssetFees> {
            Ok(self.fees.lock().await.get(symbol).copied().unwrap_or(AssetFees {
                market_fee_bps: 0,
                max_market_fee: 0.0,
                taker_fee_bps: 0,
                maker_refund_pct: 0.0,
            }))
        }
    }

    /// Mock fill feed backed by an in-memory channel the test drives directly.
    pub struct MockFillFeed {
        sender: Arc<Mutex<Option<mpsc::UnboundedSender<FillEvent>>>>,
    }

    impl MockFillFeed {
        pub fn new() -> Self {
            Self { sender: Arc::new(Mutex::new(None)) }
        }

        /// Push a fill to whichever receiver is currently subscribed.
        pub async fn push(&self, event: FillEvent) {
            if let Some(tx) = self.sender.lock().await.as_ref() {
                let _ = tx.send(event);
            }
        }
    }

    impl Default for MockFillFeed {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl FillFeed for MockFillFeed {
        async fn subscribe(&self, _account: &str) -> EngineResult<mpsc::UnboundedReceiver<FillEvent>> {
            let (tx, rx) = mpsc::unbounded_channel();
            *self.sender.lock().await = Some(tx);
            Ok(rx)
        }

        async fn unsubscribe(&self, _account: &str) -> EngineResult<()> {
            *self.sender.lock().await = None;
            Ok(())
        }
    }
}
