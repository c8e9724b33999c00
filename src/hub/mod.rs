//! C5: the hub client — submitting `InvokeService` requests and delivering
//! responses back to per-chain pipelines (spec §5, §6).

pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::error::HubError;
use crate::request::{InterchainRequest, InterchainRequestInfo, ResponseAdaptor};
pub use transport::{HttpHubTransport, HubTransport};

/// The wire body of an `InvokeService` submission (spec §6 `ServiceInput`).
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInput {
    pub header: Header,
    pub body: Body,
}

/// `req_sequence` is the hub's idempotence key (`req_sequence = req.id`,
/// spec §4.3 step 1); `id` names the same request for the hub's own
/// bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct Header {
    pub req_sequence: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Body {
    pub source: SourceEndpoint,
    pub dest: DestEndpoint,
    pub method: String,
    pub calldata: Vec<u8>,
}

/// The origin side of a `ServiceInput` (spec §6 `body.source`).
#[derive(Debug, Clone, Serialize)]
pub struct SourceEndpoint {
    pub id: String,
    pub chain_id: String,
    pub sub_chain_id: String,
    pub endpoint_type: String,
    pub endpoint_address: String,
    pub sender: String,
    pub tx_hash: String,
}

/// The destination side of a `ServiceInput` (spec §6 `body.dest`).
#[derive(Debug, Clone, Serialize)]
pub struct DestEndpoint {
    pub id: String,
    pub chain_id: String,
    pub sub_chain_id: String,
    pub endpoint_type: String,
    pub endpoint_address: String,
}

/// Resolves the hub's `dest_id` deterministically from `(dest_chain_type,
/// dest_sub_chain_id, dest_chain_id)` (spec §4.3 step 2).
fn resolve_dest_id(dest_chain_type: &str, dest_sub_chain_id: &str, dest_chain_id: &str) -> String {
    format!("{dest_chain_type}.{dest_sub_chain_id}.{dest_chain_id}")
}

impl ServiceInput {
    pub fn from_request(req: &InterchainRequest) -> Self {
        Self {
            header: Header {
                req_sequence: req.id.clone(),
                id: req.id.clone(),
            },
            body: Body {
                source: SourceEndpoint {
                    id: req.id.clone(),
                    chain_id: req.source_chain_id.clone(),
                    sub_chain_id: String::new(),
                    endpoint_type: String::new(),
                    endpoint_address: String::new(),
                    sender: req.sender.clone(),
                    tx_hash: req.tx_hash.clone(),
                },
                dest: DestEndpoint {
                    id: resolve_dest_id(&req.dest_chain_type, &req.dest_sub_chain_id, &req.dest_chain_id),
                    chain_id: req.dest_chain_id.clone(),
                    sub_chain_id: req.dest_sub_chain_id.clone(),
                    endpoint_type: req.endpoint_type.clone(),
                    endpoint_address: req.endpoint_address.clone(),
                },
                method: req.method.clone(),
                calldata: req.call_data.clone(),
            },
        }
    }
}

type ResponseCallback = Box<dyn FnOnce(ResponseAdaptor) + Send + 'static>;

/// Tracks in-flight requests awaiting a response from either the fast path
/// (the `InvokeService` call itself returns a response, spec §5.2) or the
/// subscription path (a later push on the response topic, spec §5.3).
#[derive(Default)]
struct PendingResponses {
    by_ic_request_id: HashMap<String, ResponseCallback>,
}

/// The hub-facing client used by every chain pipeline (spec §5).
///
/// One [`HubClient`] is shared across all registered chains; each chain's
/// pipeline calls [`HubClient::send_interchain_request`] with a callback
/// that's invoked exactly once, whichever path delivers the response first.
pub struct HubClient<T: HubTransport> {
    transport: Arc<T>,
    pending: Arc<Mutex<PendingResponses>>,
    watchdog_interval: Duration,
}

impl<T: HubTransport + 'static> HubClient<T> {
    pub fn new(transport: T, watchdog_interval: Duration) -> Self {
        Self {
            transport: Arc::new(transport),
            pending: Arc::new(Mutex::new(PendingResponses::default())),
            watchdog_interval,
        }
    }

    /// Submits an interchain request to the hub and arranges for `on_response`
    /// to be invoked once, whichever delivery path wins (spec §5.4).
    ///
    /// Returns immediately after submission is accepted; `on_response` runs
    /// on whatever task observes the response first and is not itself
    /// awaited by this method.
    #[instrument(skip_all, fields(request_id = %req.id))]
    pub async fn send_interchain_request(
        &self,
        req: &InterchainRequest,
        on_response: impl FnOnce(ResponseAdaptor) + Send + 'static,
    ) -> Result<InterchainRequestInfo, HubError> {
        let input = ServiceInput::from_request(req);
        let submission = self.transport.invoke_service(&input).await?;

        if let Some(fast_response) = submission.immediate_response {
            on_response(fast_response);
            return Ok(submission.info);
        }

        let ic_request_id = submission.info.ic_request_id.clone();
        {
            let mut pending = self.pending.lock().await;
            pending
                .by_ic_request_id
                .insert(ic_request_id.clone(), Box::new(on_response));
        }
        self.spawn_subscription_watchdog(ic_request_id, req.dest_chain_id.clone());
        Ok(submission.info)
    }

    /// Subscribes for the response on a background task and unsubscribes
    /// once it's delivered, the batch completes, or the expiration height is
    /// exceeded — whichever happens first (spec §5.3 "watchdog unsubscribe
    /// logic").
    fn spawn_subscription_watchdog(&self, ic_request_id: String, dest_chain_id: String) {
        let transport = self.transport.clone();
        let pending = self.pending.clone();
        let interval = self.watchdog_interval;
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let subscription = match transport
                .subscribe_service_response(&ic_request_id, &dest_chain_id)
                .await
            {
                Ok(sub) => sub,
                Err(e) => {
                    warn!(%ic_request_id, error = %e, "failed to subscribe for hub response");
                    Self::fire_error(&pending, &ic_request_id, e).await;
                    return;
                }
            };

            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match transport.query_service_response(&subscription).await {
                            Ok(Some(outcome)) => {
                                Self::deliver(&pending, &ic_request_id, outcome.response).await;
                                if outcome.batch_completed {
                                    let _ = transport.unsubscribe(&subscription).await;
                                    return;
                                }
                            }
                            Ok(None) => {
                                if outcome_expired(&transport, &subscription).await {
                                    let _ = transport.unsubscribe(&subscription).await;
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(%ic_request_id, error = %e, "hub response subscription failed");
                                let _ = transport.unsubscribe(&subscription).await;
                                Self::fire_error(&pending, &ic_request_id, e).await;
                                return;
                            }
                        }
                    }
                }
            }
        });
    }

    async fn deliver(
        pending: &Arc<Mutex<PendingResponses>>,
        ic_request_id: &str,
        response: ResponseAdaptor,
    ) {
        let callback = pending.lock().await.by_ic_request_id.remove(ic_request_id);
        if let Some(callback) = callback {
            callback(response);
        }
    }

    async fn fire_error(pending: &Arc<Mutex<PendingResponses>>, ic_request_id: &str, err: HubError) {
        let callback = pending.lock().await.by_ic_request_id.remove(ic_request_id);
        if let Some(callback) = callback {
            callback(ResponseAdaptor {
                status_code: 500,
                result: "error".to_string(),
                output: err.to_string(),
                ic_request_id: ic_request_id.to_string(),
            });
        }
    }
}

/// A oneshot-backed convenience for callers that want to `.await` the
/// response rather than supply a callback closure.
pub fn oneshot_callback() -> (
    impl FnOnce(ResponseAdaptor) + Send + 'static,
    oneshot::Receiver<ResponseAdaptor>,
) {
    let (tx, rx) = oneshot::channel();
    (
        move |resp: ResponseAdaptor| {
            let _ = tx.send(resp);
        },
        rx,
    )
}

async fn outcome_expired<T: HubTransport>(transport: &Arc<T>, subscription: &str) -> bool {
    transport
        .subscription_expired(subscription)
        .await
        .unwrap_or(true)
}
