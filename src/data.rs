use crate::chart::ChartKind;
use crate::config::STALE_AFTER;
use crate::error::{DashboardError, DashboardResult};
use alloy::eips::BlockNumberOrTag;
use alloy::rpc::types::Filter;
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_provider::{Provider as ProviderTrait, RootProvider as AlloyProvider};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use url::Url;

/// One metric value for one block, as shown on a chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMetricSample {
    pub block_number: u64,
    pub value: String,
}

impl BlockMetricSample {
    pub fn new(block_number: u64, value: impl Into<String>) -> Self {
        Self {
            block_number,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub base_fee_per_gas: Option<U256>,
    pub gas_used: U256,
    pub gas_limit: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Logs of a single block emitted by `address` whose first topic is one of
/// `topics` (any topic when empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub block: u64,
    pub address: Address,
    pub topics: Vec<B256>,
}

impl LogQuery {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        entry.address == self.address
            && (self.topics.is_empty()
                || entry
                    .topics
                    .first()
                    .is_some_and(|t| self.topics.contains(t)))
    }
}

/// Chain data the dashboard reads.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn head_block_number(&self) -> DashboardResult<u64>;

    async fn block_header(&self, number: u64) -> DashboardResult<BlockHeader>;

    async fn logs(&self, query: &LogQuery) -> DashboardResult<Vec<LogEntry>>;
}

pub struct AlloyChainSource {
    provider: AlloyProvider,
}

impl AlloyChainSource {
    pub fn new(rpc_url: &str) -> DashboardResult<Self> {
        let url = Url::parse(rpc_url)?;
        let provider = AlloyProvider::new_http(url);
        Ok(Self { provider })
    }
}

#[async_trait]
impl ChainSource for AlloyChainSource {
    async fn head_block_number(&self) -> DashboardResult<u64> {
        let block_number = self.provider.get_block_number().await?;
        Ok(block_number)
    }

    async fn block_header(&self, number: u64) -> DashboardResult<BlockHeader> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await?
            .ok_or(DashboardError::BlockNotFound(number))?;

        Ok(BlockHeader {
            number: block.header.number,
            base_fee_per_gas: block.header.base_fee_per_gas.map(U256::from),
            gas_used: U256::from(block.header.gas_used),
            gas_limit: U256::from(block.header.gas_limit),
        })
    }

    async fn logs(&self, query: &LogQuery) -> DashboardResult<Vec<LogEntry>> {
        let mut filter = Filter::new()
            .from_block(query.block)
            .to_block(query.block)
            .address(query.address);
        if !query.topics.is_empty() {
            filter = filter.event_signature(query.topics.clone());
        }

        let logs = self.provider.get_logs(&filter).await?;
        Ok(logs
            .into_iter()
            .map(|log| LogEntry {
                address: log.address(),
                topics: log.topics().to_vec(),
                data: log.data().data.clone(),
            })
            .collect())
    }
}

/// Turns block numbers into chart samples for a given metric.
pub struct MetricAggregator<C> {
    source: Arc<C>,
}

impl<C> Clone for MetricAggregator<C> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<C: ChainSource> MetricAggregator<C> {
    pub fn new(source: Arc<C>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<C> {
        &self.source
    }

    /// Fetches every block concurrently. Any failed fetch fails the batch;
    /// samples come back in the order of `blocks`.
    pub async fn aggregate(
        &self,
        kind: &ChartKind,
        blocks: &[u64],
    ) -> DashboardResult<Vec<BlockMetricSample>> {
        try_join_all(blocks.iter().map(|&number| self.sample(kind, number))).await
    }

    async fn sample(&self, kind: &ChartKind, number: u64) -> DashboardResult<BlockMetricSample> {
        let value = match kind {
            ChartKind::TransferCount { address, topics } => {
                let query = log_query(number, *address, topics);
                let logs = self.source.logs(&query).await?;
                count_transfers(&query, &logs).to_string()
            }
            ChartKind::TransferVolume {
                address,
                topics,
                decimals,
            } => {
                let query = log_query(number, *address, topics);
                let logs = self.source.logs(&query).await?;
                transfer_volume(&query, &logs, *decimals)?.to_string()
            }
            ChartKind::BaseFee => base_fee(&self.source.block_header(number).await?)?.to_string(),
            ChartKind::GasRatio => gas_ratio(&self.source.block_header(number).await?)?.to_string(),
        };
        Ok(BlockMetricSample::new(number, value))
    }
}

fn log_query(block: u64, address: Address, topics: &[B256]) -> LogQuery {
    LogQuery {
        block,
        address,
        topics: topics.to_vec(),
    }
}

pub fn count_transfers(query: &LogQuery, logs: &[LogEntry]) -> usize {
    logs.iter().filter(|log| query.matches(log)).count()
}

/// Sum of the matching logs' data words, scaled down by `10^decimals` and
/// truncated.
pub fn transfer_volume(query: &LogQuery, logs: &[LogEntry], decimals: u8) -> DashboardResult<U256> {
    let mut total = U256::ZERO;
    for log in logs.iter().filter(|log| query.matches(log)) {
        let amount = if log.data.is_empty() {
            U256::ZERO
        } else {
            U256::try_from_be_slice(&log.data).ok_or(DashboardError::MalformedLogData {
                block: query.block,
                len: log.data.len(),
            })?
        };
        total = total
            .checked_add(amount)
            .ok_or(DashboardError::VolumeOverflow(query.block))?;
    }

    match U256::from(10u8).checked_pow(U256::from(decimals)) {
        Some(unit) => Ok(total / unit),
        // 10^decimals exceeds any representable amount
        None => Ok(U256::ZERO),
    }
}

pub fn base_fee(header: &BlockHeader) -> DashboardResult<U256> {
    header
        .base_fee_per_gas
        .ok_or(DashboardError::MissingBaseFee(header.number))
}

/// floor(gas_used * 100 / gas_limit)
pub fn gas_ratio(header: &BlockHeader) -> DashboardResult<U256> {
    if header.gas_limit.is_zero() {
        return Err(DashboardError::ZeroGasLimit(header.number));
    }
    Ok(header.gas_used.saturating_mul(U256::from(100u8)) / header.gas_limit)
}

// ========================= FEED STATUS =========================

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Stale,
    Disconnected,
    Error(String),
}

/// Health of the block feed, shown in the dashboard header.
#[derive(Debug, Clone)]
pub struct FeedStatus {
    pub rpc_url: String,
    pub head: Option<u64>,
    pub connection_status: ConnectionStatus,
    pub last_successful: Option<Instant>,
    pub failed_updates: u64,
}

impl FeedStatus {
    pub fn new(rpc_url: String) -> Self {
        Self {
            rpc_url,
            head: None,
            connection_status: ConnectionStatus::Disconnected,
            last_successful: None,
            failed_updates: 0,
        }
    }

    pub fn record_head(&mut self, head: u64) {
        if self.head.is_none_or(|cur| head > cur) {
            self.head = Some(head);
        }
        self.connection_status = ConnectionStatus::Connected;
        self.last_successful = Some(Instant::now());
    }

    /// Counts a failed update. Only provider failures change the connection
    /// state; payload errors leave the link marked as it was.
    pub fn record_error(&mut self, err: &DashboardError) {
        self.failed_updates += 1;
        if err.is_connection_error() {
            self.connection_status = ConnectionStatus::Error(err.to_string());
        }
    }

    pub fn record_failed_update(&mut self) {
        self.failed_updates += 1;
    }

    pub fn check_staleness(&mut self) {
        if matches!(
            self.connection_status,
            ConnectionStatus::Connected | ConnectionStatus::Stale
        ) {
            if let Some(last_ok) = self.last_successful {
                if last_ok.elapsed() > STALE_AFTER {
                    self.connection_status = ConnectionStatus::Stale;
                }
            }
        }
    }
}

pub type SharedStatus = Arc<RwLock<FeedStatus>>;

pub fn shared_status(rpc_url: String) -> SharedStatus {
    Arc::new(RwLock::new(FeedStatus::new(rpc_url)))
}

pub fn status_read(status: &SharedStatus) -> RwLockReadGuard<'_, FeedStatus> {
    status.read().unwrap_or_else(|e| e.into_inner())
}

pub fn status_write(status: &SharedStatus) -> RwLockWriteGuard<'_, FeedStatus> {
    status.write().unwrap_or_else(|e| e.into_inner())
}
