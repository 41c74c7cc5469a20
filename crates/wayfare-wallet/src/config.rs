use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::journal::SyncMode;

/// File name of the journal inside `data_dir`.
pub const JOURNAL_FILE: &str = "wallets.journal";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Directory holding the journal. `None` keeps wallets in memory only.
    pub data_dir: Option<PathBuf>,
    pub sync_mode: SyncMode,
}

impl WalletConfig {
    pub fn journal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(JOURNAL_FILE))
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            data_dir: Some(PathBuf::from("data")),
            sync_mode: SyncMode::EveryWrite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = WalletConfig::default();
        assert_eq!(c.journal_path(), Some(PathBuf::from("data/wallets.journal")));
        assert_eq!(c.sync_mode, SyncMode::EveryWrite);
    }
}
