//! Configuration parameters for the blockpulse dashboard
use std::{path::PathBuf, time::Duration};

use alloy_primitives::{Address, B256, address, b256};
use clap::{Parser, ValueEnum};

use crate::chart::ChartKind;
use crate::error::{DashboardError, DashboardResult};

pub const STALE_AFTER: Duration = Duration::from_secs(60);

/// Number of samples each chart keeps on screen
pub const DEFAULT_MAX_WINDOW: usize = 10;

/// Number of blocks aggregated by the initial draw
pub const LOOKBACK_BLOCKS: u64 = 10;

/// How often the head block number is polled for new blocks
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 4_000;

/// Terminal redraw / input poll tick
pub const UI_TICK: Duration = Duration::from_millis(100);

pub const ALCHEMY_MAINNET_URL: &str = "https://eth-mainnet.g.alchemy.com/v2/";

// ========================= TOKEN CONFIG =========================
/// LINK token contract on mainnet
pub const LINK_TOKEN: Address = address!("514910771af9ca656af840dff83e8264ecf986ca");
/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChartChoice {
    TransferCount,
    TransferVolume,
    BaseFee,
    GasRatio,
}

#[derive(Debug, Parser)]
#[command(name = "blockpulse", about = "Live per-block Ethereum metrics in the terminal")]
pub struct Cli {
    /// Alchemy API key used to build the mainnet endpoint
    #[arg(long, env = "ALCHEMY_KEY", hide_env_values = true)]
    pub alchemy_key: Option<String>,

    /// Base endpoint the key is appended to
    #[arg(long, env = "RPC_URL", default_value = ALCHEMY_MAINNET_URL)]
    pub rpc_url: String,

    /// ERC-20 contract whose Transfer events are charted
    #[arg(long, env = "TOKEN_ADDRESS", default_value_t = LINK_TOKEN)]
    pub token: Address,

    #[arg(long, default_value_t = DEFAULT_TOKEN_DECIMALS)]
    pub decimals: u8,

    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = [ChartChoice::TransferVolume, ChartChoice::BaseFee, ChartChoice::GasRatio]
    )]
    pub charts: Vec<ChartChoice>,

    /// Samples kept per chart
    #[arg(long, default_value_t = DEFAULT_MAX_WINDOW, value_parser = parse_window)]
    pub window: usize,

    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    #[arg(long, default_value = "blockpulse.log")]
    pub log_file: PathBuf,
}

fn parse_window(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("window must hold at least one sample".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub rpc_url: String,
    pub charts: Vec<ChartKind>,
    pub max_window: usize,
    pub poll_interval: Duration,
    pub log_file: PathBuf,
}

impl Config {
    /// Validates the parsed command line. Fails when no API key is present.
    pub fn from_cli(cli: Cli) -> DashboardResult<Self> {
        let api_key = cli
            .alchemy_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(DashboardError::MissingApiKey)?;

        let topics = vec![TRANSFER_TOPIC];
        let charts = cli
            .charts
            .iter()
            .map(|choice| match choice {
                ChartChoice::TransferCount => ChartKind::TransferCount {
                    address: cli.token,
                    topics: topics.clone(),
                },
                ChartChoice::TransferVolume => ChartKind::TransferVolume {
                    address: cli.token,
                    topics: topics.clone(),
                    decimals: cli.decimals,
                },
                ChartChoice::BaseFee => ChartKind::BaseFee,
                ChartChoice::GasRatio => ChartKind::GasRatio,
            })
            .collect();

        Ok(Self {
            rpc_url: endpoint(&cli.rpc_url, &api_key),
            api_key,
            charts,
            max_window: cli.window,
            poll_interval: Duration::from_millis(cli.poll_interval_ms.max(1)),
            log_file: cli.log_file,
        })
    }

    /// Endpoint with the key masked, safe for logs and the header line
    pub fn display_url(&self) -> String {
        match self.rpc_url.strip_suffix(self.api_key.as_str()) {
            Some(base) => format!("{}{}", base, mask(&self.api_key)),
            None => self.rpc_url.clone(),
        }
    }
}

fn endpoint(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

fn mask(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{}****", visible)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["blockpulse"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn missing_key_is_fatal() {
        let mut cli = parse(&[]);
        cli.alchemy_key = None;
        assert!(matches!(
            Config::from_cli(cli),
            Err(DashboardError::MissingApiKey)
        ));
    }

    #[test]
    fn blank_key_is_rejected() {
        let cli = parse(&["--alchemy-key", "  "]);
        assert!(matches!(
            Config::from_cli(cli),
            Err(DashboardError::MissingApiKey)
        ));
    }

    #[test]
    fn defaults_to_three_charts() {
        let config = Config::from_cli(parse(&["--alchemy-key", "abcdef123"])).unwrap();
        assert_eq!(config.max_window, 10);
        assert_eq!(config.charts.len(), 3);
        assert!(matches!(config.charts[0], ChartKind::TransferVolume { decimals: 18, .. }));
        assert!(matches!(config.charts[1], ChartKind::BaseFee));
        assert!(matches!(config.charts[2], ChartKind::GasRatio));
        assert_eq!(
            config.rpc_url,
            "https://eth-mainnet.g.alchemy.com/v2/abcdef123"
        );
        assert_eq!(
            config.display_url(),
            "https://eth-mainnet.g.alchemy.com/v2/abcd****"
        );
    }

    #[test]
    fn chart_list_is_comma_separated() {
        let config = Config::from_cli(parse(&[
            "--alchemy-key",
            "k",
            "--charts",
            "transfer-count,gas-ratio",
        ]))
        .unwrap();
        assert_eq!(config.charts.len(), 2);
        match &config.charts[0] {
            ChartKind::TransferCount { address, topics } => {
                assert_eq!(*address, LINK_TOKEN);
                assert_eq!(topics, &vec![TRANSFER_TOPIC]);
            }
            other => panic!("unexpected chart {:?}", other),
        }
    }

    #[test]
    fn zero_window_is_rejected() {
        let argv = ["blockpulse", "--alchemy-key", "k", "--window", "0"];
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
