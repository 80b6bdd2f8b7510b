//! Contract registry and event classifier.
//!
//! The registry maps each watched contract to the keccak256 topic hashes of
//! the events it emits. For a raw EVM log, `topics[0]` is the keccak256 of
//! the canonical event signature, e.g.
//!   keccak256("Transfer(address,address,uint256)")
//!   → 0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef
//!
//! The registry is built once at startup and never mutated afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tiny_keccak::{Hasher, Keccak};

use crate::error::IndexerError;
use crate::event::EventName;
use crate::types::{is_address, normalize_address};

/// Upper bound on watched contracts.
pub const MAX_CONTRACTS: usize = 7;

/// The role a watched contract plays on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractRole {
    /// NFT custody vault.
    Vault,
    /// Borrow / repay / liquidate.
    LoanManager,
    /// DPO reward token.
    DpoToken,
}

impl ContractRole {
    /// ABI event signatures emitted by a contract of this role.
    pub fn default_bindings(&self) -> &'static [(&'static str, EventName)] {
        match self {
            Self::Vault => &[
                ("Deposit(address,address,uint256,uint256)", EventName::NFTDeposited),
                ("Withdraw(address,address,uint256)", EventName::NFTWithdrawn),
            ],
            Self::LoanManager => &[
                ("Borrow(address,uint256,uint256)", EventName::LoanCreated),
                ("Repay(address,uint256,uint256)", EventName::LoanRepaid),
                ("Liquidation(address,uint256,uint256)", EventName::LoanLiquidated),
            ],
            Self::DpoToken => &[
                ("TokensMinted(address,uint256)", EventName::DPOTokensMinted),
                ("Transfer(address,address,uint256)", EventName::DPOTokensTraded),
            ],
        }
    }
}

impl std::fmt::Display for ContractRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vault => write!(f, "vault"),
            Self::LoanManager => write!(f, "loan_manager"),
            Self::DpoToken => write!(f, "dpo_token"),
        }
    }
}

/// Binds one ABI event signature to a domain event name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBinding {
    /// Canonical signature, e.g. `"Repay(address,uint256,uint256)"`.
    pub signature: String,
    pub event: EventName,
}

/// Configuration entry for a watched contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub role: ContractRole,
    pub address: String,
    /// Overrides the role's default bindings when non-empty.
    #[serde(default)]
    pub events: Vec<EventBinding>,
}

impl ContractConfig {
    pub fn new(role: ContractRole, address: impl Into<String>) -> Self {
        Self {
            role,
            address: address.into(),
            events: vec![],
        }
    }

    fn bindings(&self) -> Vec<(String, EventName)> {
        if self.events.is_empty() {
            self.role
                .default_bindings()
                .iter()
                .map(|(sig, name)| (sig.to_string(), *name))
                .collect()
        } else {
            self.events
                .iter()
                .map(|b| (b.signature.clone(), b.event))
                .collect()
        }
    }
}

/// One resolved row of the registry, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicEntry {
    pub role: ContractRole,
    pub address: String,
    pub signature: String,
    pub topic0: String,
    pub event: EventName,
}

/// Compute the keccak256 topic hash of a canonical event signature.
pub fn keccak256_signature(signature: &str) -> String {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    format!("0x{}", hex::encode(output))
}

/// Immutable `(address, topic0) → EventName` lookup.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    /// Lowercased address → role.
    contracts: HashMap<String, ContractRole>,
    /// (lowercased address, lowercased topic0) → event name.
    events: HashMap<(String, String), EventName>,
    entries: Vec<TopicEntry>,
}

impl ContractRegistry {
    /// Build and validate the registry from configuration.
    pub fn from_config(configs: &[ContractConfig]) -> Result<Self, IndexerError> {
        if configs.is_empty() {
            return Err(IndexerError::Config("no contracts configured".into()));
        }
        if configs.len() > MAX_CONTRACTS {
            return Err(IndexerError::Config(format!(
                "at most {MAX_CONTRACTS} contracts may be watched, got {}",
                configs.len()
            )));
        }

        let mut registry = Self::default();
        for cfg in configs {
            if !is_address(cfg.address.trim()) {
                return Err(IndexerError::Config(format!(
                    "invalid {} address: {:?}",
                    cfg.role, cfg.address
                )));
            }
            let address = normalize_address(&cfg.address);
            if registry.contracts.insert(address.clone(), cfg.role).is_some() {
                return Err(IndexerError::Config(format!(
                    "contract {address} configured twice"
                )));
            }
            for (signature, event) in cfg.bindings() {
                if !event.is_known() {
                    return Err(IndexerError::Config(format!(
                        "signature {signature} cannot be bound to Unknown"
                    )));
                }
                let topic0 = keccak256_signature(&signature);
                registry
                    .events
                    .insert((address.clone(), topic0.clone()), event);
                registry.entries.push(TopicEntry {
                    role: cfg.role,
                    address: address.clone(),
                    signature,
                    topic0,
                    event,
                });
            }
        }
        Ok(registry)
    }

    /// Returns `true` if `address` is one of the watched contracts.
    pub fn is_known_contract(&self, address: &str) -> bool {
        self.contracts.contains_key(&normalize_address(address))
    }

    /// Role of a watched contract.
    pub fn role_of(&self, address: &str) -> Option<ContractRole> {
        self.contracts.get(&normalize_address(address)).copied()
    }

    /// Classify a log by its emitting contract and signature topic.
    ///
    /// Anything outside the registry is `EventName::Unknown`.
    pub fn classify(&self, contract_address: &str, topic0: &str) -> EventName {
        let key = (
            normalize_address(contract_address),
            topic0.trim().to_ascii_lowercase(),
        );
        self.events.get(&key).copied().unwrap_or(EventName::Unknown)
    }

    /// Watched contract addresses (lowercased).
    pub fn addresses(&self) -> Vec<String> {
        let mut out: Vec<_> = self.contracts.keys().cloned().collect();
        out.sort();
        out
    }

    /// Every resolved binding in configuration order.
    pub fn entries(&self) -> &[TopicEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VAULT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
    const LOANS: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";
    const DPO: &str = "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0";

    fn registry() -> ContractRegistry {
        ContractRegistry::from_config(&[
            ContractConfig::new(ContractRole::Vault, VAULT),
            ContractConfig::new(ContractRole::LoanManager, LOANS),
            ContractConfig::new(ContractRole::DpoToken, DPO),
        ])
        .unwrap()
    }

    #[test]
    fn erc20_transfer_topic() {
        assert_eq!(
            keccak256_signature("Transfer(address,address,uint256)"),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn classifies_every_registered_pair() {
        let reg = registry();
        assert_eq!(reg.entries().len(), 7);
        for entry in reg.entries() {
            assert_eq!(reg.classify(&entry.address, &entry.topic0), entry.event);
            // Checksummed / uppercase input classifies the same way.
            let address = entry.address.to_uppercase().replace("0X", "0x");
            let topic0 = entry.topic0.to_uppercase().replace("0X", "0x");
            assert_eq!(reg.classify(&address, &topic0), entry.event);
        }
    }

    #[test]
    fn unknown_outside_registry() {
        let reg = registry();
        let transfer = keccak256_signature("Transfer(address,address,uint256)");
        // Right topic, wrong contract.
        assert_eq!(reg.classify(VAULT, &transfer), EventName::Unknown);
        // Unwatched contract.
        assert_eq!(
            reg.classify("0x0000000000000000000000000000000000000001", &transfer),
            EventName::Unknown
        );
        // Garbage topic.
        assert_eq!(reg.classify(DPO, "0x1234"), EventName::Unknown);
    }

    #[test]
    fn known_contract_lookup_is_case_insensitive() {
        let reg = registry();
        assert!(reg.is_known_contract(&VAULT.to_lowercase()));
        assert_eq!(reg.role_of(LOANS), Some(ContractRole::LoanManager));
        assert!(!reg.is_known_contract("0x0000000000000000000000000000000000000002"));
    }

    #[test]
    fn custom_bindings_replace_defaults() {
        let mut cfg = ContractConfig::new(ContractRole::DpoToken, DPO);
        cfg.events.push(EventBinding {
            signature: "RewardMinted(address,uint256)".into(),
            event: EventName::DPOTokensMinted,
        });
        let reg = ContractRegistry::from_config(&[cfg]).unwrap();
        assert_eq!(reg.entries().len(), 1);
        let transfer = keccak256_signature("Transfer(address,address,uint256)");
        assert_eq!(reg.classify(DPO, &transfer), EventName::Unknown);
        let minted = keccak256_signature("RewardMinted(address,uint256)");
        assert_eq!(reg.classify(DPO, &minted), EventName::DPOTokensMinted);
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(ContractRegistry::from_config(&[]).is_err());
        assert!(ContractRegistry::from_config(&[ContractConfig::new(
            ContractRole::Vault,
            "not-an-address"
        )])
        .is_err());
        assert!(ContractRegistry::from_config(&[
            ContractConfig::new(ContractRole::Vault, VAULT),
            ContractConfig::new(ContractRole::LoanManager, VAULT.to_lowercase()),
        ])
        .is_err());
        let too_many: Vec<_> = (0..8)
            .map(|i| ContractConfig::new(ContractRole::Vault, format!("0x{:040x}", i + 1)))
            .collect();
        assert!(ContractRegistry::from_config(&too_many).is_err());
    }
}
