//! Generic polling-JSON-RPC ledger driver shared by the `fabric` and `opb`
//! chain families (spec §4.1, §9). Both families expose a JSON-RPC surface
//! with no push-subscription discipline, so this driver implements the scan
//! algorithm directly instead of decoding chain-native logs the way
//! [`crate::driver::eth::EthDriver`] does.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::driver::{pick_node_url, LedgerDriver, RawEvent, Receipt};
use crate::error::DriverError;
use crate::request::{normalise_call_data, EndpointInfo, InterchainRequest};

/// Per-chain configuration for [`PollingJsonRpcDriver`] (spec §3).
#[derive(Debug, Clone)]
pub struct PollingDriverConfig {
    pub rpc_urls: Vec<String>,
    pub endpoint_id: String,
    pub mining_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcEnvelope<T> {
    result: Option<T>,
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawChainEvent {
    height: u64,
    request_id: String,
    endpoint_info: String,
    method: String,
    call_data: String,
    sender: String,
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
struct RawReceipt {
    tx_hash: String,
    height: u64,
    success: bool,
}

/// Polling [`LedgerDriver`] for the `fabric` and `opb` chain families.
///
/// Every call picks a node uniformly at random from the configured set
/// (spec §4.1) rather than pinning to one endpoint, matching the `eth`
/// driver's node-selection discipline.
pub struct PollingJsonRpcDriver {
    http: reqwest::Client,
    rpc_urls: Vec<String>,
    endpoint_id: String,
    mining_timeout_secs: u64,
}

impl PollingJsonRpcDriver {
    pub fn new(config: PollingDriverConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_urls: config.rpc_urls,
            endpoint_id: config.endpoint_id,
            mining_timeout_secs: config.mining_timeout_secs,
        }
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, DriverError> {
        let url = pick_node_url(&self.rpc_urls)?;
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        let envelope: JsonRpcEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        match envelope.result {
            Some(result) => Ok(result),
            None => {
                let message = envelope
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "empty JSON-RPC response".to_string());
                Err(DriverError::Transport(message))
            }
        }
    }

    fn decode_event(raw: RawChainEvent) -> Result<RawEvent, DriverError> {
        let endpoint: EndpointInfo = serde_json::from_str(&raw.endpoint_info)
            .map_err(|e| DriverError::Transport(format!("malformed endpoint_info: {e}")))?;
        let request = InterchainRequest {
            id: raw.request_id,
            source_chain_id: String::new(),
            dest_chain_id: endpoint.dest_chain_id,
            dest_sub_chain_id: endpoint.dest_sub_chain_id,
            dest_chain_type: endpoint.dest_chain_type,
            endpoint_address: endpoint.endpoint_address,
            endpoint_type: endpoint.endpoint_type,
            method: raw.method,
            call_data: normalise_call_data(raw.call_data.as_bytes()),
            sender: raw.sender,
            tx_hash: raw.tx_hash,
        };
        Ok(RawEvent {
            height: raw.height,
            request,
        })
    }
}

#[async_trait]
impl LedgerDriver for PollingJsonRpcDriver {
    async fn scan(&self, from_height: u64, to_height: u64) -> Result<Vec<RawEvent>, DriverError> {
        let raw: Vec<RawChainEvent> = self
            .call(
                "scanInterchainEvents",
                json!({
                    "endpoint_id": self.endpoint_id,
                    "from_height": from_height,
                    "to_height": to_height,
                }),
            )
            .await?;
        raw.into_iter().map(Self::decode_event).collect()
    }

    async fn height(&self) -> Result<u64, DriverError> {
        self.call("getHeight", json!({})).await
    }

    async fn submit_response(
        &self,
        request_id: &str,
        output: &[u8],
        is_error: bool,
    ) -> Result<String, DriverError> {
        self.call(
            "setResponse",
            json!({
                "request_id": request_id,
                "is_error": is_error,
                "output": hex::encode(output),
            }),
        )
        .await
    }

    async fn wait_mined(&self, tx_hash: &str) -> Result<Receipt, DriverError> {
        let deadline =
            tokio::time::Instant::now() + std::time::Duration::from_secs(self.mining_timeout_secs);
        loop {
            if let Some(receipt) = self.query_tx(tx_hash).await? {
                return Ok(receipt);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DriverError::MiningTimeout(tx_hash.to_string()));
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    }

    async fn query_tx(&self, tx_hash: &str) -> Result<Option<Receipt>, DriverError> {
        let raw: Option<RawReceipt> = self
            .call("queryTx", json!({ "tx_hash": tx_hash }))
            .await
            .or_else(|e| match e {
                DriverError::Transport(_) => Ok(None),
                other => Err(other),
            })?;
        Ok(raw.map(|r| Receipt {
            tx_hash: r.tx_hash,
            height: r.height,
            success: r.success,
        }))
    }
}
