use alloy_primitives::{Address, B256, U256};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::data::BlockMetricSample;

/// What a chart measures, with only the inputs that metric needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartKind {
    TransferCount { address: Address, topics: Vec<B256> },
    TransferVolume { address: Address, topics: Vec<B256>, decimals: u8 },
    BaseFee,
    GasRatio,
}

impl ChartKind {
    pub fn title(&self) -> &'static str {
        match self {
            ChartKind::TransferCount { .. } => "Token transfers",
            ChartKind::TransferVolume { .. } => "Token transfer volume",
            ChartKind::BaseFee => "BASEFEE",
            ChartKind::GasRatio => "Gas used / gas limit (%)",
        }
    }

    /// Short rendering of a raw metric value for bar captions.
    pub fn display_value(&self, raw: &str) -> String {
        match self {
            ChartKind::BaseFee => match U256::from_str(raw) {
                Ok(wei) => format!("{}g", wei / U256::from(1_000_000_000u64)),
                Err(_) => raw.to_string(),
            },
            ChartKind::GasRatio => format!("{}%", raw),
            _ => raw.to_string(),
        }
    }
}

/// Rolling window of per-block samples backing one chart.
#[derive(Debug, Clone)]
pub struct ChartSeries {
    pub kind: ChartKind,
    pub labels: VecDeque<String>,
    pub values: VecDeque<String>,
    pub max_window: usize,
    /// Bumped on every mutation; the terminal loop redraws on change.
    pub revision: u64,
}

impl ChartSeries {
    pub fn new(kind: ChartKind, max_window: usize) -> Self {
        let max_window = max_window.max(1);
        Self {
            kind,
            labels: VecDeque::with_capacity(max_window),
            values: VecDeque::with_capacity(max_window),
            max_window,
            revision: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Pushes samples in the order given, then keeps only the newest
    /// `max_window` entries.
    pub fn append<'a, I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = &'a BlockMetricSample>,
    {
        for sample in samples {
            self.labels.push_back(sample.block_number.to_string());
            self.values.push_back(sample.value.clone());
        }
        self.truncate();
        self.touch();
    }

    /// Replaces the window wholesale, ordered by block number.
    pub fn initialize(&mut self, samples: &[BlockMetricSample]) {
        let mut ordered: Vec<&BlockMetricSample> = samples.iter().collect();
        ordered.sort_by_key(|s| s.block_number);

        self.labels = ordered.iter().map(|s| s.block_number.to_string()).collect();
        self.values = ordered.iter().map(|s| s.value.clone()).collect();
        self.truncate();
        self.touch();
    }

    /// (label, value) pairs oldest first.
    pub fn points(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels
            .iter()
            .zip(self.values.iter())
            .map(|(l, v)| (l.as_str(), v.as_str()))
    }

    pub fn latest(&self) -> Option<(&str, &str)> {
        self.labels
            .back()
            .zip(self.values.back())
            .map(|(l, v)| (l.as_str(), v.as_str()))
    }

    fn truncate(&mut self) {
        while self.labels.len() > self.max_window {
            self.labels.pop_front();
        }
        while self.values.len() > self.max_window {
            self.values.pop_front();
        }
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

pub type SharedSeries = Arc<RwLock<ChartSeries>>;

/// Application-owned set of charts handed to the drivers and the renderer.
#[derive(Debug, Clone, Default)]
pub struct ChartBoard {
    series: Vec<SharedSeries>,
}

impl ChartBoard {
    pub fn new(kinds: Vec<ChartKind>, max_window: usize) -> Self {
        let series = kinds
            .into_iter()
            .map(|kind| Arc::new(RwLock::new(ChartSeries::new(kind, max_window))))
            .collect();
        Self { series }
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn get(&self, idx: usize) -> Option<&SharedSeries> {
        self.series.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedSeries> {
        self.series.iter()
    }

    /// Sum of all series revisions; changes whenever any chart changes.
    pub fn revision(&self) -> u64 {
        self.series
            .iter()
            .fold(0u64, |acc, s| acc.wrapping_add(read(s).revision))
    }
}

// A panic while holding the lock leaves the window consistent (append and
// truncate never unwind midway), so poisoning is ignored.
pub fn read(series: &SharedSeries) -> RwLockReadGuard<'_, ChartSeries> {
    series.read().unwrap_or_else(|e| e.into_inner())
}

pub fn write(series: &SharedSeries) -> RwLockWriteGuard<'_, ChartSeries> {
    series.write().unwrap_or_else(|e| e.into_inner())
}
