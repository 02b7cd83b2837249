//! Grid generator (§4.1): builds the geometric price ladder, carves out the
//! reserved spread band, and distributes funds across each side by weight.

use crate::config::BotConfig;
use crate::model::{GridSlot, Side};

/// Result of a grid generation pass. `all_zero_sizes` signals the caller
/// that `minOrderSize` could not be satisfied and placement should abort.
#[derive(Debug, Clone)]
pub struct GeneratedGrid {
    pub slots: Vec<GridSlot>,
    pub all_zero_sizes: bool,
}

/// `r = 1 + incrementPercent/100`.
fn ratio(increment_percent: f64) -> f64 {
    1.0 + increment_percent / 100.0
}

/// `nSpread = max(2, ceil(log(1 + effectiveSpreadPercent/100) / log r))`.
fn spread_level_count(config: &BotConfig) -> usize {
    let effective_spread_percent = config
        .target_spread_percent
        .max(2.0 * config.increment_percent);
    let r = ratio(config.increment_percent);
    let raw = (1.0 + effective_spread_percent / 100.0).ln() / r.ln();
    (raw.ceil() as i64).max(2) as usize
}

/// Geometric price ladder of exactly `count` levels, descending from
/// `start` by a factor of `r` each step. Returned outermost-first.
fn ladder(start: f64, r: f64, count: usize) -> Vec<f64> {
    let mut prices = Vec::with_capacity(count);
    let mut p = start;
    for _ in 0..count {
        prices.push(p);
        p /= r;
    }
    prices
}

/// Weight-distributed raw sizes for a side, closest-to-reference first.
/// `raw[i] = (1 - incrementPercent/100)^(i * weight)`.
fn weighted_sizes(count: usize, increment_percent: f64, weight: f64, funds: f64) -> Vec<f64> {
    if count == 0 {
        return Vec::new();
    }
    let base = 1.0 - increment_percent / 100.0;
    let raw: Vec<f64> = (0..count).map(|i| base.powf(i as f64 * weight)).collect();
    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        return vec![0.0; count];
    }
    raw.iter().map(|r| funds * r / total).collect()
}

/// Weight-distributed ideal sizes for `count` slots given a side's current
/// effective funds — the divergence detector's comparison baseline (§4.6).
pub(crate) fn ideal_sizes(count: usize, increment_percent: f64, weight: f64, funds: f64) -> Vec<f64> {
    weighted_sizes(count, increment_percent, weight, funds)
}

/// `minOrderSize` is configured but funds on at least one side are exhausted,
/// so no positive size could ever clear the minimum.
fn min_size_is_unreachable(config: &BotConfig) -> bool {
    config.min_order_size.is_some() && (config.sell.funds <= 0.0 || config.buy.funds <= 0.0)
}

/// Run the generator, retrying once without `minOrderSize` enforcement, and
/// finally returning all-zero sizes if funds genuinely cannot satisfy it.
pub fn generate_grid(config: &BotConfig) -> GeneratedGrid {
    let upper = config.resolved_max_price();
    let r = ratio(config.increment_percent);

    let n_spread = spread_level_count(config);
    let spread_sells = n_spread.div_ceil(2);
    let spread_buys = n_spread / 2;

    let sell_count = spread_sells + config.sell.active_orders as usize;
    let buy_count = spread_buys + config.buy.active_orders as usize;

    let ref_price = config.market_price;
    let lower = config.resolved_min_price();

    let sell_prices = ladder(upper, r, sell_count);
    // The full sell ladder (maxPrice descending while >= refPrice) always
    // bottoms out in (refPrice, refPrice*r], one step above the reference
    // price; refPrice*r stands in for that "last sell level" without having
    // to walk the full ladder down from maxPrice just to find it.
    let first_buy = ref_price * r;
    let buy_prices = ladder(first_buy, r, buy_count);

    // Reserve buffer: continue each side's ladder past its active+spread
    // window, all the way to the opposite bound, as inactive (size-zero)
    // virtual slots. Rotations (§4.5) activate these one at a time instead
    // of having nowhere to grow into once the initial window is exhausted.
    let sell_reserve = {
        let mut p = sell_prices.last().copied().unwrap_or(upper) / r;
        let mut out = Vec::new();
        while p > ref_price {
            out.push(p);
            p /= r;
        }
        out
    };
    let buy_reserve = {
        let mut p = buy_prices.last().copied().unwrap_or(first_buy) / r;
        let mut out = Vec::new();
        while p >= lower {
            out.push(p);
            p /= r;
        }
        out
    };

    let try_build = |enforce_min: bool| -> (Vec<GridSlot>, bool) {
        let sell_sizes = weighted_sizes(
            config.sell.active_orders as usize,
            config.increment_percent,
            config.sell.weight,
            config.sell.funds,
        );
        let buy_sizes = weighted_sizes(
            config.buy.active_orders as usize,
            config.increment_percent,
            config.buy.weight,
            config.buy.funds,
        );

        let mut all_zero = false;
        if enforce_min {
            if let Some(min_size) = config.min_order_size {
                let sell_violation = sell_sizes.iter().any(|s| *s > 0.0 && *s < min_size);
                let buy_violation = buy_sizes.iter().any(|s| *s > 0.0 && *s < min_size);
                if sell_violation || buy_violation {
                    return (Vec::new(), false); // signal caller to retry without enforcement
                }
            }
        } else if min_size_is_unreachable(config) {
            all_zero = true;
        }

        let mut slots = Vec::with_capacity(sell_prices.len() + buy_prices.len());

        // sell_prices is outermost-first. Indices [0, active_orders.sell) are
        // tradeable, placed farthest-out to nearest-the-spread; the remaining
        // inner indices form the spread band closest to the reference price.
        let sell_active = config.sell.active_orders as usize;
        for (idx, &price) in sell_prices.iter().enumerate() {
            if idx < sell_active {
                // local index 0 = closest to reference = innermost tradeable = highest idx
                let local = sell_active - 1 - idx;
                let size = if all_zero { 0.0 } else { sell_sizes[local] };
                slots.push(GridSlot::new(format!("sell-{idx}"), Side::Sell, price, size));
            } else {
                slots.push(GridSlot::new(format!("sell-{idx}"), Side::Spread, price, 0.0));
            }
        }

        // buy_prices is also outermost-first here (closest to spread first,
        // since it starts just below the innermost sell and descends toward
        // the floor), so indices [0, spread_buys) are the spread band and the
        // remainder are tradeable, nearest-the-spread to farthest-out.
        for (idx, &price) in buy_prices.iter().enumerate() {
            if idx < spread_buys {
                slots.push(GridSlot::new(format!("buy-{idx}"), Side::Spread, price, 0.0));
            } else {
                let local = idx - spread_buys;
                let size = if all_zero { 0.0 } else { buy_sizes[local] };
                slots.push(GridSlot::new(format!("buy-{idx}"), Side::Buy, price, size));
            }
        }

        // Reserve slots continue each side's idx sequence past the window
        // generated above. They start inactive with zero size; the
        // rebalancer activates them one at a time as rotation targets.
        for (offset, &price) in sell_reserve.iter().enumerate() {
            let idx = sell_prices.len() + offset;
            slots.push(GridSlot::new(format!("sell-{idx}"), Side::Sell, price, 0.0));
        }
        for (offset, &price) in buy_reserve.iter().enumerate() {
            let idx = buy_prices.len() + offset;
            slots.push(GridSlot::new(format!("buy-{idx}"), Side::Buy, price, 0.0));
        }

        (slots, all_zero)
    };

    let (slots, all_zero) = match try_build(true) {
        (slots, _) if !slots.is_empty() => (slots, false),
        _ => {
            let (slots, all_zero) = try_build(false);
            (slots, all_zero)
        }
    };

    GeneratedGrid { slots, all_zero_sizes: all_zero || slots.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PriceBound, SideConfig};

    fn base_config() -> BotConfig {
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

    #[test]
    fn invariant_prices_strictly_monotone_and_bounded() {
        let grid = generate_grid(&base_config());
        let sells: Vec<_> = grid.slots.iter().filter(|s| s.side != Side::Buy).collect();
        let buys: Vec<_> = grid.slots.iter().filter(|s| s.side == Side::Buy).collect();
        for w in sells.windows(2) {
            assert!(w[0].price > w[1].price || w[0].side == Side::Spread || w[1].side == Side::Spread);
        }
        for s in grid.slots.iter().filter(|s| s.side == crate::model::Side::Sell) {
            assert!(s.price > base_config().market_price);
        }
        for b in buys {
            assert!(b.price < base_config().market_price);
        }
    }

    #[test]
    fn spread_band_has_at_least_two_slots() {
        let grid = generate_grid(&base_config());
        let spread_count = grid.slots.iter().filter(|s| s.side == Side::Spread).count();
        assert!(spread_count >= 2);
    }

    #[test]
    fn dense_grid_clamps_spread_to_minimum() {
        let mut config = base_config();
        config.increment_percent = 0.01;
        config.target_spread_percent = 0.02;
        let n = spread_level_count(&config);
        assert_eq!(n, 2);
    }

    #[test]
    fn min_order_size_binding_returns_all_zero() {
        let mut config = base_config();
        config.sell.funds = 0.0;
        config.buy.funds = 0.0;
        config.min_order_size = Some(1.0);
        let grid = generate_grid(&config);
        assert!(grid.all_zero_sizes);
    }

    #[test]
    fn scenario_s1_initial_placement() {
        let config = base_config();
        let grid = generate_grid(&config);
        let sell_sum: f64 = grid
            .slots
            .iter()
            .filter(|s| s.side == Side::Sell)
            .map(|s| s.size)
            .sum();
        let buy_sum: f64 = grid
            .slots
            .iter()
            .filter(|s| s.side == Side::Buy)
            .map(|s| s.size)
            .sum();
        assert!((sell_sum - 10.0).abs() < 0.5, "sell sum was {sell_sum}");
        assert!((buy_sum - 1000.0).abs() < 10.0, "buy sum was {buy_sum}");

        // the actives are the nonzero-size slots; reserve virtuals sit
        // further along the same side's ladder at size zero.
        let active_sells: Vec<f64> = grid
            .slots
            .iter()
            .filter(|s| s.side == Side::Sell && s.size > 0.0)
            .map(|s| s.price)
            .collect();
        assert_eq!(active_sells.len(), 5);
        assert!((active_sells[0] - 200.00).abs() < 0.5);

        let active_buys: Vec<f64> = grid
            .slots
            .iter()
            .filter(|s| s.side == Side::Buy && s.size > 0.0)
            .map(|s| s.price)
            .collect();
        assert_eq!(active_buys.len(), 5);
        assert!((active_buys[0] - 99.01).abs() < 0.1, "first active buy was {}", active_buys[0]);
        assert!((active_buys[4] - 95.11).abs() < 0.1, "last active buy was {}", active_buys[4]);
    }

    #[test]
    fn reserve_slots_extend_past_active_window_at_zero_size() {
        let grid = generate_grid(&base_config());
        let sell_reserve = grid.slots.iter().filter(|s| s.side == Side::Sell && s.size == 0.0).count();
        let buy_reserve = grid.slots.iter().filter(|s| s.side == Side::Buy && s.size == 0.0).count();
        assert!(sell_reserve > 0, "expected sell reserve slots beyond the active+spread window");
        assert!(buy_reserve > 0, "expected buy reserve slots beyond the active+spread window");
    }
}
