//! The hub's JSON-RPC transport surface, abstracted behind [`HubTransport`]
//! so [`crate::hub::HubClient`] can be driven by a fake in tests (spec §5).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::HubError;
use crate::request::ResponseAdaptor;

use super::ServiceInput;

/// What `InvokeService` returns (spec §5.1/§5.2).
///
/// `immediate_response` is set when the hub was able to resolve the
/// response inline (the "fast path"); otherwise callers must fall back to
/// the subscription path using `info.ic_request_id`.
#[derive(Debug, Clone)]
pub struct InvokeServiceResult {
    pub info: crate::request::InterchainRequestInfo,
    pub immediate_response: Option<ResponseAdaptor>,
}

/// One tick of the subscription path (spec §5.3).
#[derive(Debug, Clone)]
pub struct SubscriptionOutcome {
    pub response: ResponseAdaptor,
    pub batch_completed: bool,
}

/// The hub's RPC surface as seen by the relayer (spec §5).
///
/// Implementations must be cheaply cloneable and safe to share across the
/// pipelines of every registered chain.
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Submits a `ServiceInput` via `InvokeService` (spec §5.1). Rejections
    /// are returned as `Err(HubError::Rejected)`; callers check
    /// [`HubError::is_duplicate_request_sequence`] before treating a
    /// rejection as a real failure.
    async fn invoke_service(&self, input: &ServiceInput) -> Result<InvokeServiceResult, HubError>;

    /// Subscribes to future responses for `ic_request_id`, returning an
    /// opaque subscription handle for subsequent polling and unsubscription.
    async fn subscribe_service_response(
        &self,
        ic_request_id: &str,
        dest_chain_id: &str,
    ) -> Result<String, HubError>;

    /// Polls a subscription for a new response, if any arrived since the
    /// last call.
    async fn query_service_response(
        &self,
        subscription: &str,
    ) -> Result<Option<SubscriptionOutcome>, HubError>;

    /// Whether `subscription`'s expiration height has already passed
    /// (spec §5.3 watchdog expiry check).
    async fn subscription_expired(&self, subscription: &str) -> Result<bool, HubError>;

    /// Releases a subscription. Idempotent.
    async fn unsubscribe(&self, subscription: &str) -> Result<(), HubError>;

    /// The hub's current block height, used by the registry/pipeline for
    /// catch-up bookkeeping (spec §4.4).
    async fn hub_height(&self) -> Result<u64, HubError>;
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
struct InvokeServiceResponse {
    hub_req_tx_id: String,
    ic_request_id: String,
    response: Option<ResponseAdaptor>,
}

#[derive(Debug, Deserialize)]
struct SubscribeResponse {
    subscription_id: String,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    response: Option<ResponseAdaptor>,
    batch_completed: bool,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u32,
    method: &'a str,
    params: Value,
}

/// `reqwest`-based [`HubTransport`] talking JSON-RPC to the hub's generic
/// cross-chain service broker (spec §5).
#[derive(Clone)]
pub struct HttpHubTransport {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpHubTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, HubError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| HubError::Transport(e.to_string()))?;
        let envelope: JsonRpcEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| HubError::Transport(e.to_string()))?;
        match envelope.result {
            Some(result) => Ok(result),
            None => {
                let message = envelope
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "empty JSON-RPC response".to_string());
                Err(HubError::Rejected(message))
            }
        }
    }
}

#[async_trait]
impl HubTransport for HttpHubTransport {
    async fn invoke_service(&self, input: &ServiceInput) -> Result<InvokeServiceResult, HubError> {
        let raw: InvokeServiceResponse = self
            .call("InvokeService", json!({ "input": input }))
            .await?;
        Ok(InvokeServiceResult {
            info: crate::request::InterchainRequestInfo {
                hub_req_tx_id: raw.hub_req_tx_id,
                ic_request_id: raw.ic_request_id,
            },
            immediate_response: raw.response,
        })
    }

    async fn subscribe_service_response(
        &self,
        ic_request_id: &str,
        dest_chain_id: &str,
    ) -> Result<String, HubError> {
        let raw: SubscribeResponse = self
            .call(
                "SubscribeServiceResponse",
                json!({ "ic_request_id": ic_request_id, "dest_chain_id": dest_chain_id }),
            )
            .await?;
        Ok(raw.subscription_id)
    }

    async fn query_service_response(
        &self,
        subscription: &str,
    ) -> Result<Option<SubscriptionOutcome>, HubError> {
        let raw: PollResponse = self
            .call(
                "QueryServiceResponse",
                json!({ "subscription_id": subscription }),
            )
            .await?;
        Ok(raw.response.map(|response| SubscriptionOutcome {
            response,
            batch_completed: raw.batch_completed,
        }))
    }

    async fn subscription_expired(&self, subscription: &str) -> Result<bool, HubError> {
        self.call(
            "SubscriptionExpired",
            json!({ "subscription_id": subscription }),
        )
        .await
    }

    async fn unsubscribe(&self, subscription: &str) -> Result<(), HubError> {
        let _: Value = self
            .call("Unsubscribe", json!({ "subscription_id": subscription }))
            .await?;
        Ok(())
    }

    async fn hub_height(&self) -> Result<u64, HubError> {
        self.call("HubHeight", json!({})).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory [`HubTransport`] for pipeline/hub-client unit tests.
    #[derive(Clone, Default)]
    pub struct FakeHubTransport {
        pub invoke_calls: Arc<AtomicUsize>,
        pub reject_with: Option<String>,
    }

    #[async_trait]
    impl HubTransport for FakeHubTransport {
        async fn invoke_service(
            &self,
            input: &ServiceInput,
        ) -> Result<InvokeServiceResult, HubError> {
            self.invoke_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(reason) = &self.reject_with {
                return Err(HubError::Rejected(reason.clone()));
            }
            Ok(InvokeServiceResult {
                info: crate::request::InterchainRequestInfo {
                    hub_req_tx_id: "hub-tx-1".to_string(),
                    ic_request_id: format!("ic-{}", input.header.id),
                },
                immediate_response: Some(ResponseAdaptor {
                    status_code: 200,
                    result: "ok".to_string(),
                    output: "42".to_string(),
                    ic_request_id: format!("ic-{}", input.header.id),
                }),
            })
        }

        async fn subscribe_service_response(
            &self,
            ic_request_id: &str,
            _dest_chain_id: &str,
        ) -> Result<String, HubError> {
            Ok(format!("sub-{ic_request_id}"))
        }

        async fn query_service_response(
            &self,
            _subscription: &str,
        ) -> Result<Option<SubscriptionOutcome>, HubError> {
            Ok(None)
        }

        async fn subscription_expired(&self, _subscription: &str) -> Result<bool, HubError> {
            Ok(false)
        }

        async fn unsubscribe(&self, _subscription: &str) -> Result<(), HubError> {
            Ok(())
        }

        async fn hub_height(&self) -> Result<u64, HubError> {
            Ok(100)
        }
    }

    #[tokio::test]
    async fn duplicate_sequence_rejection_is_detected() {
        let transport = FakeHubTransport {
            reject_with: Some("duplicated request sequence for ic-1".to_string()),
            ..Default::default()
        };
        let request = crate::request::InterchainRequest {
            id: "req-1".to_string(),
            source_chain_id: "eth-a".to_string(),
            dest_chain_id: "hub".to_string(),
            dest_sub_chain_id: String::new(),
            dest_chain_type: "fabric".to_string(),
            endpoint_address: "addr".to_string(),
            endpoint_type: "contract".to_string(),
            method: "ping".to_string(),
            call_data: vec![],
            sender: "0xabc".to_string(),
            tx_hash: "0xsrc".to_string(),
        };
        let input = ServiceInput::from_request(&request);
        let err = transport.invoke_service(&input).await.unwrap_err();
        assert!(err.is_duplicate_request_sequence());
    }
}
