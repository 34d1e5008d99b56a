//! JSON-RPC envelopes and the response shapes the client reads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub(crate) const JSONRPC_VERSION: &str = "2.0";

/// Encoding requested for account data and sent for transactions.
pub(crate) const HEX_ENCODING: &str = "hex";

#[derive(Serialize)]
pub(crate) struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

#[derive(Deserialize)]
pub(crate) struct Response<T> {
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

#[derive(Deserialize)]
pub(crate) struct ErrorObject {
    pub code: i64,
    pub message: String,
}

/// Results wrapped with the slot they were read at.
#[derive(Deserialize)]
pub(crate) struct WithContext<T> {
    pub value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LatestBlockhash {
    pub blockhash: String,
    pub last_valid_block_height: u64,
}

#[derive(Deserialize)]
pub(crate) struct AccountInfo {
    /// `[data, encoding]`
    pub data: (String, String),
    pub lamports: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignatureStatus {
    #[serde(default)]
    pub confirmation_status: Option<String>,
    #[serde(default)]
    pub err: Option<Value>,
}

impl SignatureStatus {
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.confirmation_status.as_deref(),
            Some("confirmed") | Some("finalized")
        )
    }
}
