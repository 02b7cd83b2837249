//! Bot configuration: the option table from the external interface, plus
//! layered loading (file + environment overrides) in the same style as the
//! rest of this codebase's configuration surface.

use serde::{Deserialize, Serialize};

use crate::errors::{EngineResult, OrderManagerError};

/// Either a literal price or an "Nx" multiplier of the reference price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceBound {
    Literal(f64),
    Multiplier(f64),
}

impl PriceBound {
    /// Parse either a bare number or a string like `"3x"`.
    pub fn parse(raw: &str) -> Option<Self> {
        if let Some(stripped) = raw.strip_suffix('x').or_else(|| raw.strip_suffix('X')) {
            stripped.parse::<f64>().ok().map(PriceBound::Multiplier)
        } else {
            raw.parse::<f64>().ok().map(PriceBound::Literal)
        }
    }

    pub fn resolve(&self, reference_price: f64, invert_for_lower: bool) -> f64 {
        match self {
            PriceBound::Literal(v) => *v,
            PriceBound::Multiplier(n) => {
                if invert_for_lower {
                    reference_price / n
                } else {
                    reference_price * n
                }
            }
        }
    }
}

fn default_target_spread_percent() -> f64 {
    2.0
}

fn default_min_order_size() -> Option<f64> {
    None
}

fn default_dry_run() -> bool {
    false
}

fn default_fill_dedup_window_secs() -> u64 {
    5
}

fn default_tick_interval_secs() -> u64 {
    5
}

fn default_divergence_threshold() -> f64 {
    0.0
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Per-side weight/funds/active-order count, mirroring the option table's
/// `weightDistribution`, `botFunds`, and `activeOrders` entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SideConfig {
    pub weight: f64,
    pub funds: f64,
    pub active_orders: u32,
}

/// Configuration for one grid bot against one trading pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub asset_a: String,
    pub asset_b: String,
    pub preferred_account: String,

    /// Literal price or "pool"/"market" resolved externally; stored as the
    /// last observed literal once resolved.
    pub market_price: f64,

    pub min_price: PriceBound,
    pub max_price: PriceBound,

    pub increment_percent: f64,

    #[serde(default = "default_target_spread_percent")]
    pub target_spread_percent: f64,

    pub sell: SideConfig,
    pub buy: SideConfig,

    #[serde(default = "default_min_order_size")]
    pub min_order_size: Option<f64>,

    #[serde(default = "default_dry_run")]
    pub dry_run: bool,

    #[serde(default = "default_fill_dedup_window_secs")]
    pub fill_dedup_window_secs: u64,

    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    #[serde(default = "default_divergence_threshold")]
    pub divergence_threshold: f64,

    #[serde(default)]
    pub bot_index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl BotConfig {
    pub fn new(
        asset_a: impl Into<String>,
        asset_b: impl Into<String>,
        preferred_account: impl Into<String>,
        market_price: f64,
        min_price: PriceBound,
        max_price: PriceBound,
        increment_percent: f64,
        sell: SideConfig,
        buy: SideConfig,
    ) -> Self {
        Self {
            asset_a: asset_a.into(),
            asset_b: asset_b.into(),
            preferred_account: preferred_account.into(),
            market_price,
            min_price,
            max_price,
            increment_percent,
            target_spread_percent: default_target_spread_percent(),
            sell,
            buy,
            min_order_size: None,
            dry_run: false,
            fill_dedup_window_secs: default_fill_dedup_window_secs(),
            tick_interval_secs: default_tick_interval_secs(),
            divergence_threshold: default_divergence_threshold(),
            bot_index: 0,
            name: None,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_min_order_size(mut self, size: f64) -> Self {
        self.min_order_size = Some(size);
        self
    }

    pub fn with_target_spread_percent(mut self, pct: f64) -> Self {
        self.target_spread_percent = pct;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn bot_key(&self) -> String {
        let base = self
            .name
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.asset_a, self.asset_b));
        crate::model::bot_key(&base, self.bot_index)
    }

    pub fn resolved_min_price(&self) -> f64 {
        self.min_price.resolve(self.market_price, true)
    }

    pub fn resolved_max_price(&self) -> f64 {
        self.max_price.resolve(self.market_price, false)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.asset_a.is_empty() || self.asset_b.is_empty() {
            return Err(OrderManagerError::InvalidConfig("asset_a/asset_b cannot be empty".into()));
        }
        if !(0.01..=10.0).contains(&self.increment_percent) {
            return Err(OrderManagerError::InvalidConfig(
                "increment_percent must be within [0.01, 10.0]".into(),
            ));
        }
        if self.target_spread_percent < 2.0 * self.increment_percent {
            return Err(OrderManagerError::InvalidConfig(
                "target_spread_percent must be at least 2x increment_percent".into(),
            ));
        }
        if self.resolved_min_price() >= self.resolved_max_price() {
            return Err(OrderManagerError::InvalidConfig(
                "min_price must be below max_price".into(),
            ));
        }
        if !(1..=50).contains(&self.sell.active_orders) || !(1..=50).contains(&self.buy.active_orders) {
            return Err(OrderManagerError::InvalidConfig(
                "active_orders must be within [1, 50] per side".into(),
            ));
        }
        if !(-1.0..=2.0).contains(&self.sell.weight) || !(-1.0..=2.0).contains(&self.buy.weight) {
            return Err(OrderManagerError::InvalidConfig(
                "weight must be within [-1.0, 2.0] per side".into(),
            ));
        }
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

/// Logging configuration, read the same way as the rest of this table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

/// Top-level application settings: one bot config plus ambient log config.
/// Loaded from a file with environment overrides under the `APP__` prefix,
/// e.g. `APP__BOT__DRY_RUN=true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub bot: BotConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Settings {
    pub fn load(path: impl AsRef<std::path::Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let builder = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let built = builder
            .build()
            .map_err(|e| OrderManagerError::InvalidConfig(e.to_string()))?;

        let settings: Settings = built
            .try_deserialize()
            .map_err(|e| OrderManagerError::InvalidConfig(e.to_string()))?;

        settings.bot.validate()?;
        Ok(settings)
    }

    /// Initialize logging from `self.log.level`, falling back to `RUST_LOG`
    /// if the environment variable is already set.
    pub fn init_logging(&self) {
        let level = std::env::var("RUST_LOG").unwrap_or_else(|_| self.log.level.clone());
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).try_init();
    }
}
