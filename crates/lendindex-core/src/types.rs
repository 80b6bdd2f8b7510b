//! Chain data as seen by the indexer, already decoded from the node's hex
//! encoding.

use serde::{Deserialize, Serialize};

// ─── Block ────────────────────────────────────────────────────────────────────

/// A block with its full transaction list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// The slice of a transaction the indexer needs for contract filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    /// `None` for contract-creation transactions.
    pub to: Option<String>,
    pub block_number: u64,
}

impl Transaction {
    /// Returns `true` if the transaction is addressed to `address`
    /// (case-insensitive).
    pub fn is_to(&self, address: &str) -> bool {
        self.to
            .as_deref()
            .map(|to| to.eq_ignore_ascii_case(address))
            .unwrap_or(false)
    }
}

// ─── Receipt / Log ────────────────────────────────────────────────────────────

/// A transaction receipt with its emitted logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: String,
    pub block_number: u64,
    /// `Some(true)` on success, `Some(false)` on revert, `None` pre-Byzantium.
    pub status: Option<bool>,
    pub logs: Vec<Log>,
    /// Logs the node returned that could not be decoded, one message each.
    #[serde(default)]
    pub malformed_logs: Vec<String>,
}

/// A single EVM event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract.
    pub address: String,
    /// `topics[0]` is the event signature hash; the rest are indexed params.
    pub topics: Vec<String>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub transaction_hash: String,
    pub log_index: u32,
    /// Set by the node when the log was dropped by a reorg.
    pub removed: bool,
}

/// Address filter for `eth_getLogs` queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Emitting contracts to match. Empty matches every address.
    pub addresses: Vec<String>,
}

impl LogFilter {
    pub fn addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    /// Case-insensitive address match.
    pub fn matches_address(&self, address: &str) -> bool {
        self.addresses.is_empty()
            || self.addresses.iter().any(|a| a.eq_ignore_ascii_case(address))
    }
}

impl Log {
    /// The event signature topic, if present.
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }
}

// ─── Hex helpers ──────────────────────────────────────────────────────────────

/// Parse a hex quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Decode a `0x`-prefixed hex byte string. `"0x"` decodes to an empty vec.
pub fn decode_hex_bytes(s: &str) -> Option<Vec<u8>> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok()
}

/// Returns `true` if `s` is a `0x`-prefixed 20-byte hex address.
pub fn is_address(s: &str) -> bool {
    match s.strip_prefix("0x") {
        Some(h) => h.len() == 40 && h.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Returns `true` if `s` is a `0x`-prefixed 32-byte hex word.
pub fn is_word(s: &str) -> bool {
    match s.strip_prefix("0x") {
        Some(h) => h.len() == 64 && h.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Lowercase an address for use as a map key.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Extract the address packed into the low 20 bytes of an indexed topic.
///
/// Returns `None` if the topic is not a well-formed 32-byte word.
pub fn address_from_topic(topic: &str) -> Option<String> {
    if !is_word(topic) {
        return None;
    }
    let low = &topic[topic.len() - 40..];
    Some(format!("0x{}", low.to_ascii_lowercase()))
}
