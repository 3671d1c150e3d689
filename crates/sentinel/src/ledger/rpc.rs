//! JSON-RPC ledger client for EVM-compatible nodes.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

use super::abi;
use super::LedgerClient;
use crate::entity::UnitIndex;
use crate::error::{LedgerError, LedgerResult};

/// JSON-RPC error codes that signal a transient condition.
///
/// -32005: limit exceeded, -32029 / 429: provider rate limiting,
/// -32603: internal node error.
const RETRYABLE_RPC_CODES: &[i64] = &[-32005, -32029, -32603, 429];

/// Ledger client speaking Ethereum JSON-RPC over HTTP.
pub struct RpcLedgerClient {
    client: reqwest::Client,
    url: String,
    checker: String,
    action_topic: Option<String>,
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl RpcLedgerClient {
    /// Create a client for `url` querying the checker contract at `checker`.
    pub fn new(
        url: impl Into<String>,
        checker: impl Into<String>,
        action_topic: Option<String>,
        timeout: Duration,
    ) -> LedgerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            checker: checker.into(),
            action_topic,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> LedgerResult<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        trace!(method, id = request.id, "JSON-RPC request");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: RpcResponse = response.json().await.map_err(classify_transport)?;

        if let Some(err) = body.error {
            debug!(method, code = err.code, message = %err.message, "JSON-RPC error");
            let message = format!("{method}: {} ({})", err.message, err.code);
            return Err(if RETRYABLE_RPC_CODES.contains(&err.code) {
                LedgerError::retryable(message)
            } else {
                LedgerError::fatal(message)
            });
        }

        let result = body
            .result
            .ok_or_else(|| LedgerError::fatal(format!("{method}: response without result")))?;
        serde_json::from_value(result)
            .map_err(|e| LedgerError::fatal(format!("{method}: unexpected result shape: {e}")))
    }

    async fn eth_call(&self, data: String, block: &str) -> LedgerResult<String> {
        self.call(
            "eth_call",
            json!([{ "to": self.checker, "data": data }, block]),
        )
        .await
    }
}

fn classify_transport(err: reqwest::Error) -> LedgerError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        LedgerError::retryable(format!("transport: {err}"))
    } else {
        LedgerError::fatal(format!("transport: {err}"))
    }
}

fn classify_status(status: StatusCode, body: &str) -> LedgerError {
    let message = format!("HTTP {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        LedgerError::retryable(message)
    } else {
        LedgerError::fatal(message)
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn head_unit(&self) -> LedgerResult<UnitIndex> {
        let quantity: String = self.call("eth_blockNumber", json!([])).await?;
        abi::parse_quantity(&quantity)
    }

    async fn list_entities(&self) -> LedgerResult<Vec<String>> {
        let data = self.eth_call(abi::encode_list_entities(), "latest").await?;
        abi::decode_address_array(&data)
    }

    async fn check_eligible(&self, entity_id: &str, unit: UnitIndex) -> LedgerResult<bool> {
        let data = self
            .eth_call(abi::encode_is_eligible(entity_id), &abi::block_tag(unit))
            .await?;
        abi::decode_bool(&data)
    }

    async fn confirm_acted(&self, entity_id: &str, unit: UnitIndex) -> LedgerResult<bool> {
        let Some(topic) = &self.action_topic else {
            return Ok(false);
        };

        let block = abi::block_tag(unit);
        let logs: Vec<Value> = self
            .call(
                "eth_getLogs",
                json!([{
                    "fromBlock": block,
                    "toBlock": block,
                    "address": self.checker,
                    "topics": [topic, abi::address_topic(entity_id)],
                }]),
            )
            .await?;
        Ok(!logs.is_empty())
    }
}
