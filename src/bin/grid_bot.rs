//! Minimal runner: load one bot's settings file, wire up a chain client, and
//! drive the trigger loop until the process is killed. Connecting to a real
//! chain is out of scope for this crate (see `ChainClient`), so this binary
//! runs against the in-memory mock the same way the integration tests do;
//! swap in a real `ChainClient`/`FillFeed` pair to point it at an actual DEX.

use std::env;
use std::path::PathBuf;

use grid_order_manager::chain::mock::{MockChainClient, MockFillFeed};
use grid_order_manager::engine::{run_trigger_loop, OrderManager, PairPrecision};
use grid_order_manager::{AssetPrecision, Settings};
use log::{error, info};

#[tokio::main]
async fn main() {
    match dotenvy::dotenv() {
        Ok(path) => eprintln!("loaded environment from {}", path.display()),
        Err(_) => eprintln!("no .env file found, using system environment variables"),
    }

    let args: Vec<String> = env::args().collect();
    let settings_path = args.get(1).cloned().unwrap_or_else(|| "settings.json".to_string());
    let profiles_dir = args.get(2).cloned().unwrap_or_else(|| "profiles".to_string());

    let settings = match Settings::load(&settings_path) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("failed to load {settings_path}: {err}");
            return;
        }
    };
    settings.init_logging();

    let bot = settings.bot;
    info!("starting bot {} on {}/{}", bot.bot_key(), bot.asset_a, bot.asset_b);

    let chain = MockChainClient::new();
    chain.set_precision(&bot.asset_a, AssetPrecision::new(8)).await;
    chain.set_precision(&bot.asset_b, AssetPrecision::new(8)).await;
    let fill_feed = MockFillFeed::new();

    let precision = PairPrecision { asset_a: AssetPrecision::new(8), asset_b: AssetPrecision::new(8) };
    let mut manager = OrderManager::new(bot.clone(), chain, PathBuf::from(&profiles_dir), precision);

    let trigger_file = PathBuf::from(&profiles_dir).join(format!("recalculate.{}.trigger", bot.bot_key()));

    let clock = || chrono::Utc::now().timestamp_millis();
    if let Err(err) = run_trigger_loop(&mut manager, &fill_feed, trigger_file, clock).await {
        error!("trigger loop exited with error: {err}");
    }
}
