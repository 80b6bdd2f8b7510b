//! Node response shapes (`eth_getBlockByNumber`, `eth_getTransactionReceipt`)
//! and their conversion into the indexer's decoded types.

use serde::{Deserialize, Serialize};

use lendindex_core::types::{decode_hex_bytes, parse_hex_u64, Block, Log, Receipt, Transaction};
use lendindex_core::IndexerError;

fn quantity(field: &str, value: &str) -> Result<u64, IndexerError> {
    parse_hex_u64(value)
        .ok_or_else(|| IndexerError::malformed(format!("{field}: bad hex quantity {value:?}")))
}

/// A transaction object as embedded in a full block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTransaction {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<String>,
}

/// A block as returned by `eth_getBlockByNumber(n, true)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcBlock {
    pub number: String,
    pub hash: String,
    #[serde(rename = "parentHash")]
    pub parent_hash: String,
    pub timestamp: String,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

impl RpcBlock {
    pub fn into_block(self) -> Result<Block, IndexerError> {
        let number = quantity("block.number", &self.number)?;
        let timestamp = quantity("block.timestamp", &self.timestamp)?;
        let transactions = self
            .transactions
            .into_iter()
            .map(|tx| {
                let block_number = match tx.block_number.as_deref() {
                    Some(n) => quantity("tx.blockNumber", n)?,
                    None => number,
                };
                Ok(Transaction {
                    hash: tx.hash,
                    from: tx.from,
                    to: tx.to,
                    block_number,
                })
            })
            .collect::<Result<Vec<_>, IndexerError>>()?;
        Ok(Block {
            number,
            hash: self.hash,
            parent_hash: self.parent_hash,
            timestamp,
            transactions,
        })
    }
}

/// A raw EVM log as embedded in a receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RpcLog {
    pub fn into_log(self) -> Result<Log, IndexerError> {
        let data = decode_hex_bytes(&self.data)
            .ok_or_else(|| IndexerError::malformed(format!("log.data: bad hex {:?}", self.data)))?;
        let log_index = quantity("log.logIndex", &self.log_index)?;
        Ok(Log {
            address: self.address,
            topics: self.topics,
            data,
            block_number: quantity("log.blockNumber", &self.block_number)?,
            transaction_hash: self.tx_hash,
            log_index: u32::try_from(log_index).map_err(|_| {
                IndexerError::malformed(format!("log.logIndex out of range: {log_index}"))
            })?,
            removed: self.removed.unwrap_or(false),
        })
    }
}

/// A receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcReceipt {
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<RpcLog>,
}

impl RpcReceipt {
    /// Decode the receipt. Logs are decoded one by one: a bad log lands in
    /// `malformed_logs` and its siblings are kept.
    pub fn into_receipt(self) -> Result<Receipt, IndexerError> {
        let status = match self.status.as_deref() {
            Some(s) => Some(quantity("receipt.status", s)? == 1),
            None => None,
        };
        let mut logs = Vec::with_capacity(self.logs.len());
        let mut malformed_logs = Vec::new();
        for (position, raw) in self.logs.into_iter().enumerate() {
            match raw.into_log() {
                Ok(log) => logs.push(log),
                Err(e) => malformed_logs.push(format!("log #{position}: {e}")),
            }
        }
        Ok(Receipt {
            transaction_hash: self.tx_hash,
            block_number: quantity("receipt.blockNumber", &self.block_number)?,
            status,
            logs,
            malformed_logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_block_decodes() {
        let raw: RpcBlock = serde_json::from_value(json!({
            "number": "0x65",
            "hash": "0xb1",
            "parentHash": "0xb0",
            "timestamp": "0x6553f100",
            "gasUsed": "0x5208",
            "transactions": [
                {"hash": "0xt1", "from": "0xa", "to": "0xVault", "blockNumber": "0x65"},
                {"hash": "0xt2", "from": "0xa", "to": null, "blockNumber": "0x65"}
            ]
        }))
        .unwrap();
        let block = raw.into_block().unwrap();
        assert_eq!(block.number, 101);
        assert_eq!(block.timestamp, 0x6553f100);
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[0].to.as_deref(), Some("0xVault"));
        assert!(block.transactions[1].to.is_none());
    }

    #[test]
    fn receipt_with_logs_decodes() {
        let raw: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": "0xt1",
            "blockNumber": "0x65",
            "status": "0x1",
            "logs": [{
                "address": "0xVault",
                "topics": ["0xsig"],
                "data": "0x0102",
                "blockNumber": "0x65",
                "blockHash": "0xb1",
                "transactionHash": "0xt1",
                "logIndex": "0x5",
                "removed": false
            }]
        }))
        .unwrap();
        let receipt = raw.into_receipt().unwrap();
        assert_eq!(receipt.status, Some(true));
        assert_eq!(receipt.logs[0].log_index, 5);
        assert_eq!(receipt.logs[0].data, vec![1, 2]);
        assert!(!receipt.logs[0].removed);
    }

    #[test]
    fn malformed_log_is_rejected() {
        let raw: RpcLog = serde_json::from_value(json!({
            "address": "0xVault",
            "topics": [],
            "data": "0xnothex",
            "blockNumber": "0x65",
            "transactionHash": "0xt1",
            "logIndex": "0x0"
        }))
        .unwrap();
        assert!(matches!(raw.into_log(), Err(IndexerError::Malformed(_))));
    }

    #[test]
    fn bad_log_keeps_its_siblings() {
        let raw: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": "0xt1",
            "blockNumber": "0x65",
            "status": "0x1",
            "logs": [
                {
                    "address": "0xVault",
                    "topics": ["0xsig"],
                    "data": "0x01",
                    "blockNumber": "0x65",
                    "transactionHash": "0xt1",
                    "logIndex": "0x0"
                },
                {
                    "address": "0xVault",
                    "topics": ["0xsig"],
                    "data": "0xzz",
                    "blockNumber": "0x65",
                    "transactionHash": "0xt1",
                    "logIndex": "0x1"
                },
                {
                    "address": "0xVault",
                    "topics": ["0xsig"],
                    "data": "0x",
                    "blockNumber": "0x65",
                    "transactionHash": "0xt1",
                    "logIndex": "0x100000000"
                }
            ]
        }))
        .unwrap();
        let receipt = raw.into_receipt().unwrap();
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].log_index, 0);
        assert_eq!(receipt.malformed_logs.len(), 2);
        assert!(receipt.malformed_logs[0].starts_with("log #1"));
        assert!(receipt.malformed_logs[1].contains("out of range"));
    }
}
