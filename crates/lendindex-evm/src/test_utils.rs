//! Scripted chain fixtures shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use lendindex_core::{
    keccak256_signature, Block, ChainClient, ChainConnector, ContractConfig, ContractRegistry,
    ContractRole, IndexerError, Log, LogFilter, Receipt, Transaction,
};

pub const VAULT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const LOANS: &str = "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512";
pub const DPO: &str = "0x9fe46736679d2d9a65f0992f2272de9f3c7fa6e0";
pub const USER: &str = "0x1111111111111111111111111111111111111111";
pub const STRANGER: &str = "0x2222222222222222222222222222222222222222";

pub fn registry() -> ContractRegistry {
    ContractRegistry::from_config(&contracts()).unwrap()
}

pub fn contracts() -> Vec<ContractConfig> {
    vec![
        ContractConfig::new(ContractRole::Vault, VAULT),
        ContractConfig::new(ContractRole::LoanManager, LOANS),
        ContractConfig::new(ContractRole::DpoToken, DPO),
    ]
}

/// Left-pad an address into a 32-byte topic word.
pub fn word(address: &str) -> String {
    format!("0x{:0>64}", address.trim_start_matches("0x"))
}

pub fn tx(hash: &str, to: Option<&str>, block: u64) -> Transaction {
    Transaction {
        hash: hash.into(),
        from: USER.into(),
        to: to.map(String::from),
        block_number: block,
    }
}

pub fn receipt(hash: &str, block: u64, logs: Vec<Log>) -> Receipt {
    Receipt {
        transaction_hash: hash.into(),
        block_number: block,
        status: Some(true),
        logs,
        malformed_logs: Vec::new(),
    }
}

/// A transaction sent to the contract that emitted `log`, with its receipt.
pub fn mined(log: Log) -> (Transaction, Option<Receipt>) {
    let hash = log.transaction_hash.clone();
    let block = log.block_number;
    let tx = tx(&hash, Some(&log.address), block);
    (tx, Some(receipt(&hash, block, vec![log])))
}

fn log(
    address: &str,
    signature: &str,
    topics: Vec<String>,
    tx: &str,
    block: u64,
    idx: u32,
) -> Log {
    let mut all = vec![keccak256_signature(signature)];
    all.extend(topics);
    Log {
        address: address.into(),
        topics: all,
        data: vec![0u8; 32],
        block_number: block,
        transaction_hash: tx.into(),
        log_index: idx,
        removed: false,
    }
}

pub fn deposit_log(vault: &str, user: &str, tx: &str, block: u64, idx: u32) -> Log {
    log(
        vault,
        "Deposit(address,address,uint256,uint256)",
        vec![word(user), word(STRANGER)],
        tx,
        block,
        idx,
    )
}

pub fn borrow_log(loans: &str, user: &str, tx: &str, block: u64, idx: u32) -> Log {
    log(loans, "Borrow(address,uint256,uint256)", vec![word(user)], tx, block, idx)
}

pub fn transfer_log(token: &str, from: &str, tx: &str, block: u64, idx: u32) -> Log {
    log(
        token,
        "Transfer(address,address,uint256)",
        vec![word(from), word(STRANGER)],
        tx,
        block,
        idx,
    )
}

/// In-memory chain with scriptable failures.
#[derive(Default)]
pub struct MockChain {
    head: AtomicU64,
    blocks: Mutex<HashMap<u64, Block>>,
    receipts: Mutex<HashMap<String, Receipt>>,
    failing_heads: AtomicU32,
    head_delay_ms: AtomicU64,
    timed_out_receipts: Mutex<HashSet<String>>,
    receipt_calls: AtomicU32,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// The next `n` `latest_height` calls fail with a connectivity error.
    pub fn fail_heads(&self, n: u32) {
        self.failing_heads.store(n, Ordering::SeqCst);
    }

    /// Every `latest_height` call waits `delay` before answering.
    pub fn slow_heads(&self, delay: Duration) {
        self.head_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Receipt lookups for `hash` time out.
    pub fn time_out_receipt(&self, hash: &str) {
        self.timed_out_receipts.lock().unwrap().insert(hash.into());
    }

    /// Add an empty block for every height in `from..=to` not yet present.
    pub fn fill_empty(&self, from: u64, to: u64) {
        let mut blocks = self.blocks.lock().unwrap();
        for n in from..=to {
            blocks.entry(n).or_insert_with(|| empty_block(n));
        }
    }

    pub fn add_block(&self, number: u64, txs: Vec<(Transaction, Option<Receipt>)>) {
        let mut block = empty_block(number);
        let mut receipts = self.receipts.lock().unwrap();
        for (tx, receipt) in txs {
            if let Some(r) = receipt {
                receipts.insert(tx.hash.clone(), r);
            }
            block.transactions.push(tx);
        }
        self.blocks.lock().unwrap().insert(number, block);
    }

    pub fn block(&self, number: u64) -> Block {
        self.blocks.lock().unwrap()[&number].clone()
    }

    pub fn receipt_calls(&self) -> u32 {
        self.receipt_calls.load(Ordering::SeqCst)
    }
}

fn empty_block(number: u64) -> Block {
    Block {
        number,
        hash: format!("0x{number:064x}"),
        parent_hash: format!("0x{:064x}", number.saturating_sub(1)),
        timestamp: 1_700_000_000 + number,
        transactions: vec![],
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn latest_height(&self) -> Result<u64, IndexerError> {
        let delay = self.head_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let failing = self
            .failing_heads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(IndexerError::Connectivity("connection refused".into()));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_block(&self, height: u64) -> Result<Option<Block>, IndexerError> {
        Ok(self.blocks.lock().unwrap().get(&height).cloned())
    }

    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, IndexerError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        if self.timed_out_receipts.lock().unwrap().contains(hash) {
            return Err(IndexerError::Timeout { ms: 10_000 });
        }
        Ok(self.receipts.lock().unwrap().get(hash).cloned())
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<Vec<Log>, IndexerError> {
        let blocks = self.blocks.lock().unwrap();
        let receipts = self.receipts.lock().unwrap();
        let mut logs = Vec::new();
        for height in from..=to {
            let Some(block) = blocks.get(&height) else {
                continue;
            };
            for tx in &block.transactions {
                if let Some(receipt) = receipts.get(&tx.hash) {
                    logs.extend(
                        receipt
                            .logs
                            .iter()
                            .filter(|l| filter.matches_address(&l.address))
                            .cloned(),
                    );
                }
            }
        }
        Ok(logs)
    }

    async fn chain_id(&self) -> Result<u64, IndexerError> {
        Ok(5234)
    }
}

/// Hands out the same [`MockChain`] on every connect.
pub struct MockConnector {
    pub chain: Arc<MockChain>,
    pub connects: AtomicU32,
    failing: AtomicU32,
}

impl MockConnector {
    pub fn new(chain: Arc<MockChain>) -> Self {
        Self {
            chain,
            connects: AtomicU32::new(0),
            failing: AtomicU32::new(0),
        }
    }

    /// The next `n` connects fail.
    pub fn fail_connects(&self, n: u32) {
        self.failing.store(n, Ordering::SeqCst);
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainConnector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn ChainClient>, IndexerError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(IndexerError::Connectivity("node unreachable".into()));
        }
        Ok(self.chain.clone())
    }
}
