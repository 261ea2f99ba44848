use alloy::transports::TransportError;
use thiserror::Error;

pub type DashboardResult<T> = std::result::Result<T, DashboardError>;

#[derive(Debug, Error)]
pub enum DashboardError {
    /// No API credential was supplied on the command line or in the environment.
    #[error("Please, specify an Alchemy API key with --alchemy-key or ALCHEMY_KEY")]
    MissingApiKey,
    #[error("invalid rpc url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("rpc error: {0}")]
    Transport(#[from] TransportError),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    /// Pre-London blocks carry no base fee.
    #[error("block {0} has no base fee")]
    MissingBaseFee(u64),
    #[error("block {0} reports a zero gas limit")]
    ZeroGasLimit(u64),
    #[error("transfer volume in block {0} overflows 256 bits")]
    VolumeOverflow(u64),
    #[error("log in block {block} has {len} data bytes, expected at most 32")]
    MalformedLogData { block: u64, len: usize },
}

impl DashboardError {
    /// True when the provider could not be reached or answered with an RPC
    /// error, as opposed to a reply whose payload could not be used.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DashboardError::Transport(_) | DashboardError::InvalidUrl(_))
    }
}
