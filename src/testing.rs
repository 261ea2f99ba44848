//! In-memory chain used by unit tests.
use crate::config::TRANSFER_TOPIC;
use crate::data::{BlockHeader, ChainSource, LogEntry, LogQuery};
use crate::error::DashboardResult;
use alloy::transports::TransportErrorKind;
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct FakeChain {
    heads: Mutex<VecDeque<u64>>,
    headers: HashMap<u64, BlockHeader>,
    logs: HashMap<u64, Vec<LogEntry>>,
    failing: HashSet<u64>,
    failing_logs: HashSet<u64>,
    panicking: HashSet<u64>,
    fail_head: bool,
}

impl FakeChain {
    pub fn new(head: u64) -> Self {
        Self {
            heads: Mutex::new(VecDeque::from([head])),
            ..Default::default()
        }
    }

    /// Successive head polls return these numbers; the last one repeats.
    pub fn with_heads(self, heads: impl IntoIterator<Item = u64>) -> Self {
        *self.heads.lock().unwrap() = heads.into_iter().collect();
        self
    }

    pub fn with_header(mut self, number: u64, base_fee: Option<u64>, used: u64, limit: u64) -> Self {
        self.headers.insert(
            number,
            BlockHeader {
                number,
                base_fee_per_gas: base_fee.map(U256::from),
                gas_used: U256::from(used),
                gas_limit: U256::from(limit),
            },
        );
        self
    }

    pub fn with_logs(mut self, number: u64, logs: Vec<LogEntry>) -> Self {
        self.logs.insert(number, logs);
        self
    }

    pub fn failing(mut self, number: u64) -> Self {
        self.failing.insert(number);
        self
    }

    /// Log queries for `number` fail; headers still resolve.
    pub fn failing_logs(mut self, number: u64) -> Self {
        self.failing_logs.insert(number);
        self
    }

    /// Any fetch for `number` panics.
    pub fn panicking(mut self, number: u64) -> Self {
        self.panicking.insert(number);
        self
    }

    pub fn failing_head(mut self) -> Self {
        self.fail_head = true;
        self
    }

    pub fn transfer(address: Address, data: Bytes) -> LogEntry {
        LogEntry {
            address,
            topics: vec![TRANSFER_TOPIC],
            data,
        }
    }

    pub fn transfer_amount(address: Address, amount: U256) -> LogEntry {
        Self::transfer(address, Bytes::from(amount.to_be_bytes::<32>().to_vec()))
    }

    fn check(&self, number: u64) -> DashboardResult<()> {
        if self.panicking.contains(&number) {
            panic!("fetch for block {} panicked", number);
        }
        if self.failing.contains(&number) {
            return Err(TransportErrorKind::custom_str(&format!("block {} unavailable", number)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSource for FakeChain {
    async fn head_block_number(&self) -> DashboardResult<u64> {
        if self.fail_head {
            return Err(TransportErrorKind::custom_str("head unavailable").into());
        }
        let mut heads = self.heads.lock().unwrap();
        let head = heads.front().copied().unwrap_or_default();
        if heads.len() > 1 {
            heads.pop_front();
        }
        Ok(head)
    }

    async fn block_header(&self, number: u64) -> DashboardResult<BlockHeader> {
        self.check(number)?;
        Ok(self.headers.get(&number).cloned().unwrap_or(BlockHeader {
            number,
            base_fee_per_gas: Some(U256::from(1_000_000_000u64 + number)),
            gas_used: U256::from(15_000_000u64),
            gas_limit: U256::from(30_000_000u64),
        }))
    }

    async fn logs(&self, query: &LogQuery) -> DashboardResult<Vec<LogEntry>> {
        self.check(query.block)?;
        if self.failing_logs.contains(&query.block) {
            return Err(TransportErrorKind::custom_str("logs unavailable").into());
        }
        Ok(self.logs.get(&query.block).cloned().unwrap_or_default())
    }
}
