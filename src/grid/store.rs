//! Order store (§4.2): the in-memory map of grid slots plus the lookups the
//! rest of the engine needs. All mutation goes through `update`, which is
//! the single place invariant 3 (state/chain_order_id biconditional) can be
//! checked.

use std::collections::HashMap;

use crate::model::{GridSlot, Side, SlotState};

#[derive(Debug, Clone, Default)]
pub struct OrderStore {
    slots: HashMap<String, GridSlot>,
    order: Vec<String>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: Vec<GridSlot>) -> Self {
        let mut store = Self::new();
        for slot in slots {
            store.insert(slot);
        }
        store
    }

    pub fn insert(&mut self, slot: GridSlot) {
        if !self.slots.contains_key(&slot.id) {
            self.order.push(slot.id.clone());
        }
        self.slots.insert(slot.id.clone(), slot);
    }

    pub fn get(&self, id: &str) -> Option<&GridSlot> {
        self.slots.get(id)
    }

    /// The single mutation entry point. Panics in debug builds if the
    /// closure leaves the slot in a state inconsistent with invariant 3;
    /// production code should never hit this since every caller in this
    /// crate goes through the typed transition helpers on `GridSlot`.
    pub fn update<F>(&mut self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut GridSlot),
    {
        match self.slots.get_mut(id) {
            Some(slot) => {
                f(slot);
                debug_assert!(slot.is_consistent(), "slot {id} violates state/chain_order_id invariant");
                true
            }
            None => false,
        }
    }

    pub fn remove_all(&mut self) {
        self.slots.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GridSlot> {
        self.order.iter().filter_map(|id| self.slots.get(id))
    }

    pub fn by_side_state(&self, side: Side, state: SlotState) -> impl Iterator<Item = &GridSlot> {
        self.iter().filter(move |s| s.side == side && s.state == state)
    }

    pub fn by_chain_order_id(&self, chain_order_id: &str) -> Option<&GridSlot> {
        self.iter().find(|s| s.chain_order_id.as_deref() == Some(chain_order_id))
    }

    pub fn active_count(&self, side: Side) -> usize {
        self.iter()
            .filter(|s| s.side == side && matches!(s.state, SlotState::Active | SlotState::Partial))
            .count()
    }

    /// Virtual slots for a side, outermost first (as inserted by the generator).
    pub fn virtuals_outermost_first(&self, side: Side) -> Vec<&GridSlot> {
        self.iter().filter(|s| s.side == side && s.state == SlotState::Virtual).collect()
    }

    /// Active/partial slots for a side, innermost first (closest to the
    /// reference price), used when cancelling excess on a shrinking grid.
    /// Innermost follows the same ladder-index convention as
    /// `innermost_active_for_rotation`: highest idx for SELL, lowest for BUY.
    pub fn actives_innermost_first(&self, side: Side) -> Vec<&GridSlot> {
        let mut v: Vec<&GridSlot> = self
            .iter()
            .filter(|s| s.side == side && matches!(s.state, SlotState::Active | SlotState::Partial))
            .collect();
        match side {
            Side::Sell => v.sort_by_key(|s| std::cmp::Reverse(Self::ladder_index(&s.id))),
            Side::Buy => v.sort_by_key(|s| Self::ladder_index(&s.id)),
            Side::Spread => {}
        }
        v
    }

    pub fn snapshot_slots(&self) -> Vec<GridSlot> {
        self.iter().cloned().collect()
    }

    /// The ladder position encoded in a slot id's numeric suffix
    /// (`"sell-7"` → `7`), used to order rotation candidates without
    /// re-deriving distance-from-reference from price alone.
    fn ladder_index(id: &str) -> i64 {
        id.rsplit('-').next().and_then(|s| s.parse().ok()).unwrap_or(i64::MAX)
    }

    /// The active/partial slot on `side` closest to the spread band — the
    /// rotation source when the mirror side takes a full fill (§4.5). The
    /// generator lays sell actives out with ascending idx moving *away*
    /// from the spread band and buy actives with ascending idx moving
    /// *toward* it, so "closest to spread" flips which extreme to pick.
    pub fn innermost_active_for_rotation(&self, side: Side) -> Option<&GridSlot> {
        let actives = self
            .iter()
            .filter(|s| s.side == side && matches!(s.state, SlotState::Active | SlotState::Partial));
        match side {
            Side::Sell => actives.max_by_key(|s| Self::ladder_index(&s.id)),
            Side::Buy => actives.min_by_key(|s| Self::ladder_index(&s.id)),
            Side::Spread => None,
        }
    }

    /// The next not-yet-activated reserve slot on `side`: the lowest-idx
    /// tradeable virtual, i.e. the one immediately following the current
    /// active+spread window in generation order.
    pub fn next_reserve_slot(&self, side: Side) -> Option<&GridSlot> {
        self.iter()
            .filter(|s| s.side == side && s.state == SlotState::Virtual)
            .min_by_key(|s| Self::ladder_index(&s.id))
    }

    /// All invariant-3 violations currently in the store (expected to be
    /// empty outside of tests; exposed so property tests can assert it).
    pub fn invariant_violations(&self) -> Vec<String> {
        self.iter().filter(|s| !s.is_consistent()).map(|s| s.id.clone()).collect()
    }
}
