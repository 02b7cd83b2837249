#![deny(unreachable_pub)]

pub mod chain;
pub mod config;
pub mod engine;
pub mod errors;
pub mod grid;
pub mod model;
pub mod persistence;
pub mod precision;

pub use chain::{AssetFees, ChainClient, ChainOp, ChainOpResult, FillFeed};
pub use config::{BotConfig, LogConfig, PriceBound, SideConfig, Settings};
pub use engine::{run_trigger_loop, OrderManager, PairPrecision};
pub use errors::{EngineResult, OrderManagerError};
pub use model::{BotMeta, BotSnapshot, FundLedger, GridSlot, Side, SideFunds, SlotState};
pub use precision::AssetPrecision;
