//! Core data model: sides, grid slots, and the per-side fund ledger.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which asset a grid slot is selling, or whether it is a reserved spread slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Sells asset A for asset B.
    Sell,
    /// Sells asset B for asset A.
    Buy,
    /// Reserved central band; never placed on chain.
    Spread,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Sell => Side::Buy,
            Side::Buy => Side::Sell,
            Side::Spread => Side::Spread,
        }
    }

    pub fn is_tradeable(&self) -> bool {
        !matches!(self, Side::Spread)
    }
}

/// Lifecycle state of a grid slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    /// No chain order attached; a placeholder target.
    Virtual,
    /// A chain order is resting at this slot's price/size.
    Active,
    /// The chain order at this slot was partially filled.
    Partial,
    /// The chain order at this slot was fully filled; awaiting rotation.
    Filled,
}

impl SlotState {
    /// Invariant 3: ACTIVE/PARTIAL biconditional with a non-empty chain order id.
    pub fn requires_chain_order_id(&self) -> bool {
        matches!(self, SlotState::Active | SlotState::Partial)
    }
}

/// One rung of the grid ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSlot {
    /// Stable symbolic id, e.g. "sell-3". Never reused within a grid's lifetime.
    pub id: String,
    pub side: Side,
    pub state: SlotState,
    pub price: f64,
    /// Target size, denominated in the asset this slot sells.
    pub size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_order_id: Option<String>,
}

impl GridSlot {
    pub fn new(id: impl Into<String>, side: Side, price: f64, size: f64) -> Self {
        Self {
            id: id.into(),
            side,
            state: SlotState::Virtual,
            price,
            size,
            chain_order_id: None,
        }
    }

    pub fn is_consistent(&self) -> bool {
        let has_id = self.chain_order_id.is_some();
        self.state.requires_chain_order_id() == has_id
            && (self.side != Side::Spread || self.chain_order_id.is_none())
    }

    pub fn activate(&mut self, chain_order_id: impl Into<String>) {
        self.chain_order_id = Some(chain_order_id.into());
        self.state = SlotState::Active;
    }

    pub fn mark_partial(&mut self, remaining_size: f64) {
        self.size = remaining_size;
        self.state = SlotState::Partial;
    }

    pub fn mark_filled(&mut self) {
        self.state = SlotState::Filled;
        self.chain_order_id = None;
    }

    /// Retarget this slot to a new price/size as part of a rotation, clearing
    /// any prior chain order id so the caller can attach a fresh or reused one.
    pub fn retarget(&mut self, price: f64, size: f64) {
        self.price = price;
        self.size = size;
        self.state = SlotState::Virtual;
        self.chain_order_id = None;
    }

    /// The asset amount required as the minimum receive for this slot's order.
    pub fn min_to_receive(&self) -> f64 {
        match self.side {
            Side::Sell => self.size * self.price,
            Side::Buy => self.size / self.price,
            Side::Spread => 0.0,
        }
    }
}

/// Per-side fund accounting. `committed + available + virtual_reserved = total`
/// up to rounding at asset precision.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SideFunds {
    pub total: f64,
    pub committed: f64,
    pub available: f64,
    pub virtual_reserved: f64,
    pub cache_funds: f64,
    pub pending_proceeds: f64,
}

impl SideFunds {
    pub fn new(total: f64) -> Self {
        Self {
            total,
            committed: 0.0,
            available: total,
            virtual_reserved: 0.0,
            cache_funds: 0.0,
            pending_proceeds: 0.0,
        }
    }

    /// Conservation invariant, checked with a tolerance for float rounding.
    pub fn is_conserved(&self, tolerance: f64) -> bool {
        (self.committed + self.available + self.virtual_reserved - self.total).abs() <= tolerance
    }

    pub fn commit(&mut self, amount: f64) {
        self.committed += amount;
        self.available -= amount;
    }

    pub fn release(&mut self, amount: f64) {
        self.committed -= amount;
        self.available += amount;
    }

    pub fn reserve_virtual(&mut self, amount: f64) {
        self.virtual_reserved += amount;
        self.available -= amount;
    }

    pub fn unreserve_virtual(&mut self, amount: f64) {
        self.virtual_reserved -= amount;
        self.available += amount;
    }

    pub fn credit_proceeds(&mut self, amount: f64) {
        self.pending_proceeds += amount;
    }

    /// Consume proceeds first, then available funds, up to `amount`.
    /// Returns how much was actually consumed.
    pub fn consume(&mut self, amount: f64) -> f64 {
        let from_proceeds = amount.min(self.pending_proceeds);
        self.pending_proceeds -= from_proceeds;
        let remaining = amount - from_proceeds;
        let from_available = remaining.min(self.available.max(0.0));
        self.available -= from_available;
        from_proceeds + from_available
    }
}

/// The full per-bot fund ledger, one `SideFunds` per tradeable side plus an
/// accumulated fee debt in the chain's native fee asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundLedger {
    pub sell: SideFunds,
    pub buy: SideFunds,
    pub fees_owed: f64,
}

impl FundLedger {
    pub fn new(sell_total: f64, buy_total: f64) -> Self {
        Self {
            sell: SideFunds::new(sell_total),
            buy: SideFunds::new(buy_total),
            fees_owed: 0.0,
        }
    }

    pub fn side(&self, side: Side) -> &SideFunds {
        match side {
            Side::Sell => &self.sell,
            Side::Buy => &self.buy,
            Side::Spread => panic!("spread slots do not hold funds"),
        }
    }

    pub fn side_mut(&mut self, side: Side) -> &mut SideFunds {
        match side {
            Side::Sell => &mut self.sell,
            Side::Buy => &mut self.buy,
            Side::Spread => panic!("spread slots do not hold funds"),
        }
    }
}

/// Snapshot written to disk: the grid plus everything needed to resume
/// without double-counting funds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSnapshot {
    pub meta: BotMeta,
    pub grid: Vec<GridSlot>,
    pub ledger: FundLedger,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotMeta {
    pub asset_a: String,
    pub asset_b: String,
    pub bot_key: String,
}

/// `{bots: {botKey: BotSnapshot}}`, the canonical on-disk schema (§9(b)).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountSnapshotFile {
    #[serde(default)]
    pub bots: HashMap<String, BotSnapshot>,
}

/// `botKey = sanitize(name or assetA/assetB) + "-" + index`.
pub fn bot_key(name_or_pair: &str, index: u32) -> String {
    let sanitized: String = name_or_pair
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    format!("{sanitized}-{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_consistency_matches_invariant_3() {
        let mut slot = GridSlot::new("sell-0", Side::Sell, 100.0, 1.0);
        assert!(slot.is_consistent());
        slot.activate("chain-1");
        assert!(slot.is_consistent());
        slot.mark_filled();
        assert!(slot.is_consistent());
    }

    #[test]
    fn side_funds_conserve_after_commit_and_release() {
        let mut funds = SideFunds::new(100.0);
        funds.commit(40.0);
        assert!(funds.is_conserved(1e-9));
        funds.release(40.0);
        assert!(funds.is_conserved(1e-9));
        assert!((funds.available - 100.0).abs() < 1e-9);
    }

    #[test]
    fn consume_drains_proceeds_before_available() {
        let mut funds = SideFunds::new(100.0);
        funds.credit_proceeds(30.0);
        let consumed = funds.consume(50.0);
        assert!((consumed - 50.0).abs() < 1e-9);
        assert!((funds.pending_proceeds - 0.0).abs() < 1e-9);
        assert!((funds.available - 80.0).abs() < 1e-9);
    }

    #[test]
    fn bot_key_sanitizes_separators() {
        assert_eq!(bot_key("HYPE/USDC", 0), "HYPE-USDC-0");
    }
}
