use crate::{
    rpc::{
        AccountInfo, LatestBlockhash, Request, Response, SignatureStatus, WithContext, HEX_ENCODING,
        JSONRPC_VERSION,
    },
    Error, Result,
};
use commonware_codec::{DecodeExt, Encode};
use commonware_cryptography::{ed25519::PrivateKey, Signer};
use commonware_utils::{from_hex, hex};
use paddock_execution::{ChainClient, ChainError, Submission, TxStatus};
use paddock_types::{
    constants::COMPUTE_UNIT_PRICE_MICRO_LAMPORTS, program, Address, Blockhash, GameSnapshot,
    Instruction, Lamports, Message, PoolId, SignedTransaction, Signature,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use url::Url;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONFIRM_POLL: Duration = Duration::from_millis(500);

/// Retry policy for RPC calls.
///
/// Reads are retried on transport errors, `429` and `5xx`. `sendTransaction`
/// is only retried when `retry_non_idempotent` is set; the settlement engine
/// retries submissions itself.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub retry_non_idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            retry_non_idempotent: false,
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        paddock_execution::RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: self.initial_backoff,
            max_backoff: self.max_backoff,
        }
        .delay(&mut rand::thread_rng(), attempt)
    }
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Ledger network client signing every transaction with the race authority.
#[derive(Clone)]
pub struct Client {
    pub base_url: Url,
    http: reqwest::Client,
    retry_policy: RetryPolicy,
    program: Address,
    signer: Arc<PrivateKey>,
    authority: Address,
    compute_unit_price: u64,
    confirm_timeout: Duration,
    confirm_poll: Duration,
    next_id: Arc<AtomicU64>,
    /// Blockhash each signature we sent was anchored to.
    sent: Arc<Mutex<HashMap<Signature, Blockhash>>>,
}

impl Client {
    pub fn new(base_url: &str, program: Address, signer: PrivateKey) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Error::InvalidScheme(scheme.to_string())),
        }
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()?;
        let authority = Address::from(&signer.public_key());
        Ok(Self {
            base_url,
            http,
            retry_policy: RetryPolicy::default(),
            program,
            signer: Arc::new(signer),
            authority,
            compute_unit_price: COMPUTE_UNIT_PRICE_MICRO_LAMPORTS,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            confirm_poll: DEFAULT_CONFIRM_POLL,
            next_id: Arc::new(AtomicU64::new(1)),
            sent: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_confirmation(mut self, timeout: Duration, poll: Duration) -> Self {
        self.confirm_timeout = timeout;
        self.confirm_poll = poll;
        self
    }

    pub fn with_compute_unit_price(mut self, micro_lamports: u64) -> Self {
        self.compute_unit_price = micro_lamports;
        self
    }

    pub fn program(&self) -> Address {
        self.program
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        idempotent: bool,
    ) -> Result<T> {
        let request = Request {
            jsonrpc: JSONRPC_VERSION,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let may_retry = idempotent || self.retry_policy.retry_non_idempotent;
        let max_attempts = if may_retry {
            self.retry_policy.max_attempts.max(1)
        } else {
            1
        };

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let err = match self
                .http
                .post(self.base_url.clone())
                .json(&request)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => break response,
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable_status(status) || attempt >= max_attempts {
                        let body = response.text().await.unwrap_or_default();
                        return Err(Error::FailedWithBody {
                            status,
                            body: format!("{method} {}: {body}", self.base_url),
                        });
                    }
                    Error::Failed(status)
                }
                Err(err) => {
                    if attempt >= max_attempts {
                        return Err(err.into());
                    }
                    err.into()
                }
            };
            let delay = self.retry_policy.delay(attempt);
            debug!(method, attempt, ?delay, %err, "rpc call failed, retrying");
            sleep(delay).await;
        };

        let response: Response<T> = response.json().await?;
        if let Some(error) = response.error {
            return Err(Error::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response.result.ok_or(Error::UnexpectedResponse)
    }

    pub async fn latest_blockhash(&self) -> Result<Blockhash> {
        let latest: WithContext<LatestBlockhash> = self
            .call(
                "getLatestBlockhash",
                json!([{ "commitment": "finalized" }]),
                true,
            )
            .await?;
        debug!(
            blockhash = %latest.value.blockhash,
            last_valid_block_height = latest.value.last_valid_block_height,
            "fetched blockhash"
        );
        latest
            .value
            .blockhash
            .parse()
            .map_err(|_| Error::InvalidHex(latest.value.blockhash))
    }

    pub async fn slot(&self) -> Result<u64> {
        self.call("getSlot", json!([{ "commitment": "finalized" }]), true)
            .await
    }

    pub async fn balance(&self, address: &Address) -> Result<Lamports> {
        let balance: WithContext<u64> = self
            .call("getBalance", json!([address.to_string()]), true)
            .await?;
        Ok(Lamports(balance.value))
    }

    /// Raw account data, `None` if the account does not exist.
    pub async fn account_data(&self, address: &Address) -> Result<Option<Vec<u8>>> {
        let account: WithContext<Option<AccountInfo>> = self
            .call(
                "getAccountInfo",
                json!([address.to_string(), { "encoding": HEX_ENCODING }]),
                true,
            )
            .await?;
        let Some(account) = account.value else {
            return Ok(None);
        };
        let (data, encoding) = account.data;
        if encoding != HEX_ENCODING {
            return Err(Error::UnexpectedResponse);
        }
        debug!(%address, lamports = account.lamports, bytes = data.len() / 2, "fetched account");
        from_hex(&data).map(Some).ok_or(Error::InvalidHex(data))
    }

    pub async fn is_blockhash_valid(&self, blockhash: &Blockhash) -> Result<bool> {
        let valid: WithContext<bool> = self
            .call("isBlockhashValid", json!([blockhash.to_string()]), true)
            .await?;
        Ok(valid.value)
    }

    async fn status(&self, signature: &Signature) -> Result<Option<SignatureStatus>> {
        let statuses: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature.as_str()], { "searchTransactionHistory": true }]),
                true,
            )
            .await?;
        Ok(statuses.value.into_iter().next().flatten())
    }

    /// Compile, sign and send without waiting for confirmation.
    pub async fn send(&self, submission: &Submission) -> Result<(Signature, Blockhash)> {
        let mut instructions = Vec::with_capacity(submission.instructions.len() + 1);
        instructions.push(program::set_compute_unit_price(self.compute_unit_price));
        instructions.extend(submission.instructions.iter().cloned());

        let blockhash = self.latest_blockhash().await?;
        let message = Message::compile(
            &self.authority,
            blockhash,
            &instructions,
            &submission.lookup_tables,
        )?;
        let transaction = SignedTransaction::sign(&self.signer, message);
        let signature = transaction.signature();
        let encoded = hex(&transaction.encode());

        let reported: String = self
            .call(
                "sendTransaction",
                json!([encoded, { "encoding": HEX_ENCODING }]),
                false,
            )
            .await?;
        if reported != signature.as_str() {
            warn!(%signature, %reported, "node reported a different signature");
        }
        self.remember(&signature, blockhash);
        Ok((signature, blockhash))
    }

    fn remember(&self, signature: &Signature, blockhash: Blockhash) {
        let mut sent = self
            .sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sent.insert(signature.clone(), blockhash);
    }

    fn anchored_blockhash(&self, signature: &Signature) -> Option<Blockhash> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(signature)
            .copied()
    }

    /// Poll until `signature` confirms, fails, or its blockhash expires.
    async fn confirm(
        &self,
        signature: &Signature,
        blockhash: &Blockhash,
    ) -> std::result::Result<(), ChainError> {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            match self.status(signature).await {
                Ok(Some(status)) => {
                    if let Some(err) = status.err {
                        return Err(ChainError::Rejected {
                            reason: err.to_string(),
                        });
                    }
                    if status.is_confirmed() {
                        return Ok(());
                    }
                }
                Ok(None) => {
                    // Never seen and no longer able to land.
                    if !self.is_blockhash_valid(blockhash).await? {
                        return Err(ChainError::BlockhashExpired);
                    }
                }
                Err(err) => {
                    debug!(%signature, %err, "status poll failed");
                }
            }
            if Instant::now() + self.confirm_poll > deadline {
                return Err(ChainError::ConfirmationTimeout {
                    signature: signature.clone(),
                });
            }
            sleep(self.confirm_poll).await;
        }
    }
}

impl ChainClient for Client {
    fn authority(&self) -> Address {
        self.authority
    }

    async fn query_race_state(&self) -> std::result::Result<GameSnapshot, ChainError> {
        let game = program::game_address(&self.program);
        let Some(data) = self.account_data(&game).await? else {
            debug!(%game, "game account not initialized");
            return Ok(GameSnapshot::default());
        };
        GameSnapshot::decode(data.as_slice()).map_err(|err| ChainError::Decode(err.to_string()))
    }

    async fn wallet_balance(&self, wallet: &Address) -> std::result::Result<Lamports, ChainError> {
        Ok(self.balance(wallet).await?)
    }

    fn build_place_bet_instruction(
        &self,
        payer: &Address,
        pool: PoolId,
        amount: Lamports,
    ) -> Instruction {
        program::place_bet(&self.program, payer, pool, amount)
    }

    fn build_resolve_instructions(
        &self,
        winning_pool: PoolId,
        active_pools: &[PoolId],
        participants: &[(Address, Lamports)],
    ) -> Vec<Instruction> {
        vec![
            program::pre_resolve(&self.program, &self.authority, active_pools),
            program::resolve_bet(&self.program, &self.authority, winning_pool, participants),
        ]
    }

    async fn create_lookup_table(
        &self,
        authority: &Address,
    ) -> std::result::Result<(Instruction, Address), ChainError> {
        let slot = self.slot().await?;
        Ok(program::create_lookup_table(authority, slot))
    }

    fn extend_lookup_table(&self, table: &Address, addresses: &[Address]) -> Instruction {
        program::extend_lookup_table(table, &self.authority, addresses)
    }

    fn close_lookup_table(&self, table: &Address) -> Instruction {
        program::close_lookup_table(table, &self.authority)
    }

    async fn lookup_table_exists(&self, table: &Address) -> std::result::Result<bool, ChainError> {
        Ok(self.account_data(table).await?.is_some())
    }

    async fn submit_and_confirm(
        &self,
        submission: Submission,
    ) -> std::result::Result<Signature, ChainError> {
        // Only the authority key is held here.
        if let Some(signer) = submission
            .signers
            .iter()
            .find(|signer| **signer != self.authority)
        {
            return Err(ChainError::MissingSigner(*signer));
        }
        let (signature, blockhash) = self.send(&submission).await?;
        debug!(%signature, instructions = submission.instructions.len(), "transaction sent");
        self.confirm(&signature, &blockhash).await?;
        Ok(signature)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> std::result::Result<TxStatus, ChainError> {
        if let Some(status) = self.status(signature).await? {
            if let Some(err) = status.err {
                return Ok(TxStatus::Failed(err.to_string()));
            }
            if status.is_confirmed() {
                return Ok(TxStatus::Confirmed);
            }
            return Ok(TxStatus::Pending);
        }
        // Unknown to the network: it can still land only while its blockhash
        // is valid. Signatures sent before a restart are treated as dropped.
        match self.anchored_blockhash(signature) {
            Some(blockhash) if self.is_blockhash_valid(&blockhash).await? => Ok(TxStatus::Pending),
            _ => Ok(TxStatus::Dropped),
        }
    }
}
