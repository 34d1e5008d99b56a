pub mod client;
mod rpc;

pub use client::Client;
pub use client::RetryPolicy;
use paddock_execution::ChainError;
use paddock_types::CompileError;
use thiserror::Error;

/// JSON-RPC error codes the ledger network uses for transactions that will
/// never land as sent.
pub const RPC_SEND_TRANSACTION_PREFLIGHT_FAILURE: i64 = -32002;
pub const RPC_TRANSACTION_SIGNATURE_VERIFICATION_FAILURE: i64 = -32003;
pub const RPC_BLOCKHASH_NOT_FOUND: &str = "Blockhash not found";

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid data: {0}")]
    InvalidData(#[from] commonware_codec::Error),
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("unexpected response")]
    UnexpectedResponse,
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for ChainError {
    fn from(err: Error) -> Self {
        match err {
            Error::Rpc { code, message } => {
                if message.contains(RPC_BLOCKHASH_NOT_FOUND) {
                    ChainError::BlockhashExpired
                } else if code == RPC_SEND_TRANSACTION_PREFLIGHT_FAILURE
                    || code == RPC_TRANSACTION_SIGNATURE_VERIFICATION_FAILURE
                {
                    ChainError::Rejected { reason: message }
                } else {
                    ChainError::Transport(format!("rpc error {code}: {message}"))
                }
            }
            // A message that cannot be compiled will not compile on retry either.
            Error::Compile(err) => ChainError::Rejected {
                reason: err.to_string(),
            },
            Error::InvalidData(_) | Error::InvalidHex(_) | Error::UnexpectedResponse => {
                ChainError::Decode(err.to_string())
            }
            Error::Reqwest(_)
            | Error::Failed(_)
            | Error::FailedWithBody { .. }
            | Error::Url(_)
            | Error::InvalidScheme(_) => ChainError::Transport(err.to_string()),
        }
    }
}
