//! Classified chain events: the rows the indexer appends to its event store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{address_from_topic, normalize_address, Log};

/// Domain classification of a lending-platform log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    NFTDeposited,
    NFTWithdrawn,
    LoanCreated,
    LoanRepaid,
    LoanLiquidated,
    DPOTokensMinted,
    DPOTokensTraded,
    Unknown,
}

impl EventName {
    /// All recognized (non-`Unknown`) names.
    pub const KNOWN: [EventName; 7] = [
        Self::NFTDeposited,
        Self::NFTWithdrawn,
        Self::LoanCreated,
        Self::LoanRepaid,
        Self::LoanLiquidated,
        Self::DPOTokensMinted,
        Self::DPOTokensTraded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NFTDeposited => "NFTDeposited",
            Self::NFTWithdrawn => "NFTWithdrawn",
            Self::LoanCreated => "LoanCreated",
            Self::LoanRepaid => "LoanRepaid",
            Self::LoanLiquidated => "LoanLiquidated",
            Self::DPOTokensMinted => "DPOTokensMinted",
            Self::DPOTokensTraded => "DPOTokensTraded",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::KNOWN
            .iter()
            .chain(std::iter::once(&Self::Unknown))
            .find(|name| name.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown event name: {s}"))
    }
}

/// An observed, classified log entry.
///
/// Uniquely identified by `(transaction_hash, log_index)`. Only `processed`
/// ever changes after the row is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEvent {
    pub event_name: EventName,
    /// Lowercased emitting contract address.
    pub contract_address: String,
    pub transaction_hash: String,
    pub block_number: u64,
    pub log_index: u32,
    pub topics: Vec<String>,
    pub data: Vec<u8>,
    pub processed: bool,
    pub observed_at: DateTime<Utc>,
}

impl ChainEvent {
    /// Build an unprocessed event from a classified log.
    pub fn from_log(event_name: EventName, log: &Log, observed_at: DateTime<Utc>) -> Self {
        Self {
            event_name,
            contract_address: normalize_address(&log.address),
            transaction_hash: log.transaction_hash.clone(),
            block_number: log.block_number,
            log_index: log.log_index,
            topics: log.topics.clone(),
            data: log.data.clone(),
            processed: false,
            observed_at,
        }
    }

    /// The store's uniqueness key.
    pub fn key(&self) -> (&str, u32) {
        (&self.transaction_hash, self.log_index)
    }

    /// The wallet this event concerns: the first indexed parameter, when it
    /// holds an address.
    pub fn subscriber(&self) -> Option<String> {
        self.topics.get(1).and_then(|t| address_from_topic(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(topics: Vec<&str>) -> Log {
        Log {
            address: "0xVAULT".into(),
            topics: topics.into_iter().map(String::from).collect(),
            data: vec![1, 2, 3],
            block_number: 42,
            transaction_hash: "0xtx".into(),
            log_index: 3,
            removed: false,
        }
    }

    #[test]
    fn event_name_roundtrips_through_str() {
        for name in EventName::KNOWN {
            assert_eq!(name.as_str().parse::<EventName>().unwrap(), name);
        }
        assert!("Borrowed".parse::<EventName>().is_err());
    }

    #[test]
    fn from_log_normalizes_address() {
        let ev = ChainEvent::from_log(EventName::NFTDeposited, &log(vec!["0xsig"]), Utc::now());
        assert_eq!(ev.contract_address, "0xvault");
        assert_eq!(ev.key(), ("0xtx", 3));
        assert!(!ev.processed);
    }

    #[test]
    fn subscriber_from_first_indexed_topic() {
        let user = "0x0000000000000000000000001111111111111111111111111111111111111111";
        let raw = log(vec!["0xsig", user]);
        let ev = ChainEvent::from_log(EventName::LoanCreated, &raw, Utc::now());
        assert_eq!(
            ev.subscriber().as_deref(),
            Some("0x1111111111111111111111111111111111111111")
        );

        let no_user = ChainEvent::from_log(EventName::LoanCreated, &log(vec!["0xsig"]), Utc::now());
        assert!(no_user.subscriber().is_none());
    }
}
