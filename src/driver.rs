//! Startup and per-block drivers that feed the charts.
use futures::FutureExt;
use futures::future::join_all;
use futures::stream::{self, Stream, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::chart::{self, ChartBoard, SharedSeries};
use crate::data::{ChainSource, MetricAggregator, SharedStatus, status_write};
use crate::error::DashboardResult;

/// The `len` block numbers ending at `head`, oldest first. Shorter near genesis.
pub fn lookback_window(head: u64, len: u64) -> Vec<u64> {
    if len == 0 {
        return Vec::new();
    }
    let start = head.saturating_sub(len - 1);
    (start..=head).collect()
}

/// Resolves the head once, then fills every chart with the lookback window.
/// Charts fail independently; an empty chart stays empty until the next block.
pub async fn initial_draw<C: ChainSource>(
    board: &ChartBoard,
    aggregator: &MetricAggregator<C>,
    status: &SharedStatus,
    lookback: u64,
) -> DashboardResult<u64> {
    let head = aggregator.source().head_block_number().await?;
    status_write(status).record_head(head);

    let window = lookback_window(head, lookback);
    let window = &window;
    let draws = board.iter().enumerate().map(|(idx, series)| {
        let kind = chart::read(series).kind.clone();
        async move { (idx, series, aggregator.aggregate(&kind, window).await) }
    });

    for (idx, series, result) in join_all(draws).await {
        match result {
            Ok(samples) => {
                chart::write(series).initialize(&samples);
                debug!(chart = idx, samples = samples.len(), "chart initialized");
            }
            Err(e) => {
                warn!(chart = idx, error = %e, "initial draw failed");
                status_write(status).record_error(&e);
            }
        }
    }

    info!(head, from = window.first().copied().unwrap_or(head), "initial draw complete");
    Ok(head)
}

/// Polls the head and yields each new head number once. Heads skipped
/// between two polls are not replayed.
pub fn watch_new_blocks<C: ChainSource + 'static>(
    source: Arc<C>,
    poll_interval: Duration,
    last_seen: Option<u64>,
    status: SharedStatus,
) -> impl Stream<Item = u64> + Send + 'static {
    let mut ticker = time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold(
        (source, ticker, last_seen, status),
        |(source, mut ticker, mut last, status)| async move {
            loop {
                ticker.tick().await;
                match source.head_block_number().await {
                    Ok(head) => {
                        status_write(&status).record_head(head);
                        if last.is_none_or(|prev| head > prev) {
                            last = Some(head);
                            return Some((head, (source, ticker, last, status)));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "head poll failed");
                        status_write(&status).record_error(&e);
                    }
                }
            }
        },
    )
}

/// Applies each new block to every chart.
pub struct LiveUpdater<C> {
    board: ChartBoard,
    aggregator: MetricAggregator<C>,
    status: SharedStatus,
}

impl<C: ChainSource + 'static> LiveUpdater<C> {
    pub fn new(board: ChartBoard, aggregator: MetricAggregator<C>, status: SharedStatus) -> Self {
        Self {
            board,
            aggregator,
            status,
        }
    }

    /// Runs until the block stream ends. The update handles are dropped, so a
    /// slow chart never holds back the next block; each task logs its own
    /// failure or panic.
    pub async fn run<S>(self, blocks: S)
    where
        S: Stream<Item = u64>,
    {
        let mut blocks = std::pin::pin!(blocks);
        while let Some(number) = blocks.next().await {
            debug!(block = number, "new block");
            drop(self.on_new_block(number));
        }
        info!("block stream ended");
    }

    /// Spawns one update task per chart for `number`.
    pub fn on_new_block(&self, number: u64) -> Vec<JoinHandle<()>> {
        self.board
            .iter()
            .enumerate()
            .map(|(idx, series)| {
                let series = Arc::clone(series);
                let aggregator = self.aggregator.clone();
                let status = Arc::clone(&self.status);
                tokio::spawn(async move {
                    let update = AssertUnwindSafe(update_chart(&aggregator, &series, number));
                    match update.catch_unwind().await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            warn!(chart = idx, block = number, error = %e, "chart update failed");
                            status_write(&status).record_error(&e);
                        }
                        Err(panic) => {
                            error!(
                                chart = idx,
                                block = number,
                                panic = panic_message(panic.as_ref()),
                                "chart update panicked"
                            );
                            status_write(&status).record_failed_update();
                        }
                    }
                })
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

pub async fn update_chart<C: ChainSource>(
    aggregator: &MetricAggregator<C>,
    series: &SharedSeries,
    number: u64,
) -> DashboardResult<()> {
    let kind = chart::read(series).kind.clone();
    let samples = aggregator.aggregate(&kind, &[number]).await?;
    chart::write(series).append(&samples);
    Ok(())
}
