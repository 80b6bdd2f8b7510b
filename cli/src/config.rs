//! Application configuration: optional YAML file plus environment overrides.
//!
//! ```yaml
//! database_url: sqlite:./lendindex.db
//! log:
//!   level: info
//!   json: false
//! indexer:
//!   rpc_url: https://saga.example/rpc
//!   batch_size: 10
//!   contracts:
//!     - role: vault
//!       address: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use lendindex_core::{ContractConfig, ContractRegistry, ContractRole, IndexerConfig};

use crate::logging::LogConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// `memory`, `sqlite:<path>` or `postgres://...`
    pub database_url: String,
    pub log: LogConfig,
    pub indexer: IndexerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "memory".into(),
            log: LogConfig::default(),
            indexer: IndexerConfig::default(),
        }
    }
}

/// Values taken from flags or the environment; each one wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub rpc_url: Option<String>,
    pub vault: Option<String>,
    pub loan_manager: Option<String>,
    pub dpo_token: Option<String>,
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub json_logs: bool,
    pub live_events: bool,
}

impl AppConfig {
    /// Load from `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_yaml(&raw).with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.rpc_url {
            self.indexer.rpc_url = url.clone();
        }
        if let Some(url) = &overrides.database_url {
            self.database_url = url.clone();
        }
        if let Some(level) = &overrides.log_level {
            self.log.level = level.clone();
        }
        if overrides.json_logs {
            self.log.json = true;
        }
        if overrides.live_events {
            self.indexer.live_events = true;
        }
        for (role, address) in [
            (ContractRole::Vault, &overrides.vault),
            (ContractRole::LoanManager, &overrides.loan_manager),
            (ContractRole::DpoToken, &overrides.dpo_token),
        ] {
            if let Some(address) = address {
                self.set_contract(role, address);
            }
        }
    }

    /// Point the first contract of `role` at `address`, adding it if absent.
    fn set_contract(&mut self, role: ContractRole, address: &str) {
        let contracts = &mut self.indexer.contracts;
        match contracts.iter_mut().find(|c| c.role == role) {
            Some(existing) => existing.address = address.to_string(),
            None => contracts.push(ContractConfig::new(role, address)),
        }
    }

    /// Checks needed before the indexer can run.
    pub fn validate_for_run(&self) -> Result<ContractRegistry> {
        if self.indexer.rpc_url.trim().is_empty() {
            bail!("no RPC endpoint configured (set SAGA_RPC_URL or indexer.rpc_url)");
        }
        self.registry()
    }

    pub fn registry(&self) -> Result<ContractRegistry> {
        self.indexer
            .registry()
            .context("invalid contract configuration")
    }
}
