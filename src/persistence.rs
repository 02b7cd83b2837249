//! Persistence (§4.8): snapshot+restore of the grid, cache funds, pending
//! proceeds, and fees owed. Writes are best-effort-atomic (write temp, then
//! rename), the way `GridState::save_to_file_atomic` does it in this
//! codebase's existing state layer; a failure queue lets the next
//! state-changing event retry instead of blocking progress.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::errors::EngineResult;
use crate::model::{AccountSnapshotFile, BotSnapshot};

/// One account's snapshot file on disk: `{account}.orders.json` holding
/// `{bots: {botKey: BotSnapshot}}` (§3's resolved on-disk schema — the
/// structured per-account map, not the legacy `orders.json`/IndexDB layout).
pub struct SnapshotStore {
    path: PathBuf,
    /// Bot keys whose last write failed and should be retried on the next
    /// state-changing event, per §7's persistence-failure policy.
    retry_queue: HashMap<String, BotSnapshot>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), retry_queue: HashMap::new() }
    }

    pub fn for_account(profiles_dir: impl AsRef<Path>, account: &str) -> Self {
        Self::new(profiles_dir.as_ref().join(format!("{account}.orders.json")))
    }

    /// Load the whole account file, or an empty map if it doesn't exist yet.
    pub fn load(&self) -> EngineResult<AccountSnapshotFile> {
        if !self.path.exists() {
            return Ok(AccountSnapshotFile::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load one bot's snapshot, if present — the reconciler's input (§4.4);
    /// never authoritative over a conflicting chain snapshot.
    pub fn load_bot(&self, bot_key: &str) -> EngineResult<Option<BotSnapshot>> {
        Ok(self.load()?.bots.get(bot_key).cloned())
    }

    /// Write one bot's snapshot into the account file, atomically, and
    /// retry any previously-queued failed writes for other bots in the same
    /// file first so a transient failure never silently drops a write.
    pub fn save_bot(&mut self, bot_key: &str, snapshot: &BotSnapshot) -> EngineResult<()> {
        let mut file = self.load().unwrap_or_default();
        for (pending_key, pending_snapshot) in self.retry_queue.drain().collect::<Vec<_>>() {
            file.bots.insert(pending_key, pending_snapshot);
        }
        file.bots.insert(bot_key.to_string(), snapshot.clone());
        self.write_atomic(&file)
    }

    fn write_atomic(&mut self, file: &AccountSnapshotFile) -> EngineResult<()> {
        match self.try_write_atomic(file) {
            Ok(()) => {
                info!("snapshot persisted to {}", self.path.display());
                Ok(())
            }
            Err(err) => {
                warn!("persistence failure writing {}: {err}; queued for retry", self.path.display());
                for (key, snapshot) in &file.bots {
                    self.retry_queue.insert(key.clone(), snapshot.clone());
                }
                Err(err)
            }
        }
    }

    fn try_write_atomic(&self, file: &AccountSnapshotFile) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("tmp");
        let content = serde_json::to_string_pretty(file)?;
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    /// Whether any bot's snapshot is currently queued for retry.
    pub fn has_pending_retries(&self) -> bool {
        !self.retry_queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BotMeta, FundLedger};

    fn sample_snapshot() -> BotSnapshot {
        BotSnapshot {
            meta: BotMeta { asset_a: "A".into(), asset_b: "B".into(), bot_key: "a-b-0".into() },
            grid: Vec::new(),
            ledger: FundLedger::new(10.0, 1000.0),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("grid-om-test-{}", std::process::id()));
        let mut store = SnapshotStore::for_account(&dir, "acct");
        store.save_bot("a-b-0", &sample_snapshot()).unwrap();

        let loaded = store.load_bot("a-b-0").unwrap().unwrap();
        assert_eq!(loaded.meta.bot_key, "a-b-0");
        assert!((loaded.ledger.sell.total - 10.0).abs() < 1e-9);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = std::env::temp_dir().join(format!("grid-om-test-missing-{}", std::process::id()));
        let store = SnapshotStore::for_account(&dir, "acct");
        assert!(store.load_bot("a-b-0").unwrap().is_none());
    }

    #[test]
    fn two_bots_in_same_account_file_coexist() {
        let dir = std::env::temp_dir().join(format!("grid-om-test-multi-{}", std::process::id()));
        let mut store = SnapshotStore::for_account(&dir, "acct");
        store.save_bot("a-b-0", &sample_snapshot()).unwrap();
        let mut second = sample_snapshot();
        second.meta.bot_key = "c-d-1".into();
        store.save_bot("c-d-1", &second).unwrap();

        assert!(store.load_bot("a-b-0").unwrap().is_some());
        assert!(store.load_bot("c-d-1").unwrap().is_some());

        std::fs::remove_dir_all(&dir).ok();
    }
}
