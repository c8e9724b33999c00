//! C4: the per-chain source pipeline — ingest loop, event filtering,
//! submit-to-hub, audit recording, and response delivery (spec §4).

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::audit::{AuditLog, TxStatus};
use crate::chain_params::PipelineHandle;
use crate::driver::{LedgerDriver, RawEvent};
use crate::error::PipelineError;
use crate::hub::HubClient;
use crate::hub::HubTransport;
use crate::kvstore::{keys, KvStore, KvStoreExt};
use crate::request::{InterchainRequest, ResponseAdaptor};

/// The pipeline's lifecycle state (spec §4.7 `{Init, Running, Stopping,
/// Stopped}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Running,
    Stopping,
    Stopped,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Init,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// How often the pipeline polls its driver for new blocks.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Runs the ingest loop for a single source chain: scan, filter, normalise,
/// submit to the hub, record to the audit log, and deliver the hub's
/// response back onto the source chain (spec §4).
pub struct ChainPipeline<T: HubTransport> {
    chain_id: String,
    chain_type: String,
    driver: Arc<dyn LedgerDriver>,
    hub: Arc<HubClient<T>>,
    audit: Arc<dyn AuditLog>,
    kv: Arc<dyn KvStore>,
    state: AtomicU8,
    last_height: AtomicU64,
    poll_interval: Duration,
}

impl<T: HubTransport + 'static> ChainPipeline<T> {
    pub fn new(
        chain_id: String,
        chain_type: String,
        driver: Arc<dyn LedgerDriver>,
        hub: Arc<HubClient<T>>,
        audit: Arc<dyn AuditLog>,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            chain_id,
            chain_type,
            driver,
            hub,
            audit,
            kv,
            state: AtomicU8::new(PipelineState::Init as u8),
            last_height: AtomicU64::new(0),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn last_height(&self) -> u64 {
        self.last_height.load(Ordering::SeqCst)
    }

    /// Runs the ingest loop until `cancel` fires. Spec §4.1 "scan algorithm":
    /// on first run, start from `current_height - 1` unless a persisted
    /// height exists; thereafter replay `[last_height+1, current_height]`
    /// every tick so no block is skipped across restarts.
    #[instrument(skip_all, fields(chain_id = %self.chain_id))]
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.state.store(PipelineState::Running as u8, Ordering::SeqCst);

        if let Err(e) = self.restore_height().await {
            warn!(error = %e, "failed to restore persisted height, starting from tip");
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "ingest tick failed");
                    }
                }
            }
        }

        self.state.store(PipelineState::Stopping as u8, Ordering::SeqCst);
        self.state.store(PipelineState::Stopped as u8, Ordering::SeqCst);
    }

    async fn restore_height(&self) -> Result<(), PipelineError> {
        let key = keys::height(&self.chain_type, &self.chain_id);
        if let Some(height) = self.kv.get_json::<u64>(&key).await.map_err(|e| {
            PipelineError::MalformedEvent(format!("failed to read persisted height: {e}"))
        })? {
            self.last_height.store(height, Ordering::SeqCst);
        } else {
            let tip = self.driver.height().await?;
            self.last_height.store(tip.saturating_sub(1), Ordering::SeqCst);
        }
        Ok(())
    }

    async fn persist_height(&self, height: u64) {
        let key = keys::height(&self.chain_type, &self.chain_id);
        if let Err(e) = self.kv.set_json(&key, &height).await {
            warn!(error = %e, "failed to persist ingest height");
        }
    }

    async fn tick(&self) -> Result<(), PipelineError> {
        let tip = self.driver.height().await?;
        let from = self.last_height.load(Ordering::SeqCst) + 1;
        if from > tip {
            return Ok(());
        }
        let events = self.driver.scan(from, tip).await?;
        for event in events {
            self.handle_event(event).await;
        }
        self.last_height.store(tip, Ordering::SeqCst);
        self.persist_height(tip).await;
        Ok(())
    }

    /// Event filter (spec §4.2): only requests whose `dest_chain_type` the
    /// relayer's hub integration understands are forwarded; everything else
    /// is dropped without an audit row, matching the original behavior of
    /// silently skipping events this relayer process has no business
    /// relaying.
    fn passes_filter(&self, event: &RawEvent) -> bool {
        !event.request.dest_chain_type.is_empty() && !event.request.id.is_empty()
    }

    #[instrument(skip_all, fields(request_id = %event.request.id, height = event.height))]
    async fn handle_event(&self, event: RawEvent) {
        if !self.passes_filter(&event) {
            return;
        }
        let mut request = event.request;
        request.source_chain_id = self.chain_id.clone();
        self.submit_to_hub(request).await;
    }

    /// Submits a request to the hub, recording the outcome in the audit log
    /// per spec §4.5's recording rules: a successful submission (including a
    /// duplicate-sequence rejection, treated as the at-least-once replay
    /// success path) gets an audit row; any other rejection is logged but
    /// does not create a row, since no `hub_req_tx_id` exists to key it on.
    async fn submit_to_hub(&self, request: InterchainRequest) {
        let audit = self.audit.clone();
        let driver = self.driver.clone();
        let chain_id = self.chain_id.clone();
        let request_id = request.id.clone();
        let tx_hash = request.tx_hash.clone();
        let dest_chain_id = request.dest_chain_id.clone();

        let callback_audit = audit.clone();
        let callback_driver = driver.clone();
        let callback_request_id = request_id.clone();

        let result = self
            .hub
            .send_interchain_request(&request, move |response: ResponseAdaptor| {
                let audit = callback_audit;
                let driver = callback_driver;
                let request_id = callback_request_id;
                tokio::spawn(async move {
                    deliver_response(driver, audit, request_id, response).await;
                });
            })
            .await;

        match result {
            Ok(info) => {
                if let Err(e) = audit
                    .init_relayer_trans(
                        &request_id,
                        &chain_id,
                        &tx_hash,
                        &dest_chain_id,
                        &info.hub_req_tx_id,
                        &info.ic_request_id,
                        TxStatus::Unknown,
                        "",
                    )
                    .await
                {
                    warn!(%request_id, error = %e, "failed to record audit row");
                }
            }
            Err(e) if e.is_duplicate_request_sequence() => {
                info!(%request_id, "hub reported duplicate request sequence, treating as already-submitted");
            }
            Err(e) => {
                error!(%request_id, error = %e, "hub rejected interchain request");
                if let Err(audit_err) = audit
                    .init_relayer_trans(
                        &request_id, &chain_id, &tx_hash, &dest_chain_id, "", "", TxStatus::Error,
                        &e.to_string(),
                    )
                    .await
                {
                    warn!(%request_id, error = %audit_err, "failed to record audit row for rejected request");
                }
            }
        }
    }
}

impl<T: HubTransport + 'static> PipelineHandle for ChainPipeline<T> {
    fn state(&self) -> PipelineState {
        ChainPipeline::state(self)
    }

    fn last_height(&self) -> u64 {
        ChainPipeline::last_height(self)
    }
}

/// Delivers the hub's response back to the source chain via the driver's
/// `setResponse`-equivalent entry point, waits for it to mine, and records
/// the outcome (spec §4.6, §4.5).
async fn deliver_response(
    driver: Arc<dyn LedgerDriver>,
    audit: Arc<dyn AuditLog>,
    request_id: String,
    response: ResponseAdaptor,
) {
    let is_error = response.is_error();
    let output = response.output.as_bytes();
    let submit_result = driver.submit_response(&request_id, output, is_error).await;

    match submit_result {
        Ok(tx_hash) => match driver.wait_mined(&tx_hash).await {
            Ok(receipt) => {
                let status = if receipt.success {
                    TxStatus::Success
                } else {
                    TxStatus::Error
                };
                if let Err(e) = audit
                    .relayer_response_record(&request_id, &tx_hash, status, "")
                    .await
                {
                    warn!(%request_id, error = %e, "failed to record response delivery");
                }
            }
            Err(e) => {
                error!(%request_id, error = %e, "response transaction failed to mine");
                if let Err(audit_err) = audit
                    .relayer_response_record(&request_id, &tx_hash, TxStatus::Error, &e.to_string())
                    .await
                {
                    warn!(%request_id, error = %audit_err, "failed to record response mining failure");
                }
            }
        },
        Err(e) => {
            error!(%request_id, error = %e, "failed to submit response to source chain");
            if let Err(audit_err) = audit
                .relayer_response_record(&request_id, "", TxStatus::Error, &e.to_string())
                .await
            {
                warn!(%request_id, error = %audit_err, "failed to record response submission failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NullAuditLog;
    use crate::driver::Receipt;
    use crate::error::DriverError;
    use crate::hub::transport::{HubTransport, InvokeServiceResult, SubscriptionOutcome};
    use crate::kvstore::MemoryKvStore;
    use crate::request::InterchainRequestInfo;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FakeDriver {
        events: Vec<RawEvent>,
        tip: u64,
        submitted: AtomicUsize,
    }

    #[async_trait]
    impl LedgerDriver for FakeDriver {
        async fn scan(&self, _from: u64, _to: u64) -> Result<Vec<RawEvent>, DriverError> {
            Ok(self.events.clone())
        }

        async fn height(&self) -> Result<u64, DriverError> {
            Ok(self.tip)
        }

        async fn submit_response(
            &self,
            _request_id: &str,
            _output: &[u8],
            _is_error: bool,
        ) -> Result<String, DriverError> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            Ok("0xresponse".to_string())
        }

        async fn wait_mined(&self, tx_hash: &str) -> Result<Receipt, DriverError> {
            Ok(Receipt {
                tx_hash: tx_hash.to_string(),
                height: self.tip,
                success: true,
            })
        }

        async fn query_tx(&self, tx_hash: &str) -> Result<Option<Receipt>, DriverError> {
            Ok(Some(Receipt {
                tx_hash: tx_hash.to_string(),
                height: self.tip,
                success: true,
            }))
        }
    }

    #[derive(Clone, Default)]
    struct FakeHubTransport {
        reject_with: Option<String>,
    }

    #[async_trait]
    impl HubTransport for FakeHubTransport {
        async fn invoke_service(
            &self,
            input: &crate::hub::ServiceInput,
        ) -> Result<InvokeServiceResult, crate::error::HubError> {
            if let Some(reason) = &self.reject_with {
                return Err(crate::error::HubError::Rejected(reason.clone()));
            }
            Ok(InvokeServiceResult {
                info: InterchainRequestInfo {
                    hub_req_tx_id: "hub-tx".to_string(),
                    ic_request_id: format!("ic-{}", input.header.id),
                },
                immediate_response: Some(crate::request::ResponseAdaptor {
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
        ) -> Result<String, crate::error::HubError> {
            Ok(format!("sub-{ic_request_id}"))
        }

        async fn query_service_response(
            &self,
            _subscription: &str,
        ) -> Result<Option<SubscriptionOutcome>, crate::error::HubError> {
            Ok(None)
        }

        async fn subscription_expired(&self, _subscription: &str) -> Result<bool, crate::error::HubError> {
            Ok(true)
        }

        async fn unsubscribe(&self, _subscription: &str) -> Result<(), crate::error::HubError> {
            Ok(())
        }

        async fn hub_height(&self) -> Result<u64, crate::error::HubError> {
            Ok(1)
        }
    }

    fn sample_event(id: &str) -> RawEvent {
        RawEvent {
            height: 10,
            request: InterchainRequest {
                id: id.to_string(),
                source_chain_id: String::new(),
                dest_chain_id: "hub-dest".to_string(),
                dest_sub_chain_id: String::new(),
                dest_chain_type: "fabric".to_string(),
                endpoint_address: "addr".to_string(),
                endpoint_type: "contract".to_string(),
                method: "ping".to_string(),
                call_data: vec![1, 2, 3],
                sender: "0xabc".to_string(),
                tx_hash: "0xsrc".to_string(),
            },
        }
    }

    fn pipeline_with(
        driver: FakeDriver,
        transport: FakeHubTransport,
    ) -> Arc<ChainPipeline<FakeHubTransport>> {
        let hub = Arc::new(HubClient::new(transport, Duration::from_millis(50)));
        Arc::new(ChainPipeline::new(
            "eth-a".to_string(),
            "eth".to_string(),
            Arc::new(driver) as Arc<dyn LedgerDriver>,
            hub,
            Arc::new(NullAuditLog),
            Arc::new(MemoryKvStore::default()),
        ))
    }

    #[tokio::test]
    async fn filter_drops_events_with_empty_dest_chain_type() {
        let pipeline = pipeline_with(
            FakeDriver {
                events: vec![],
                tip: 10,
                submitted: AtomicUsize::new(0),
            },
            FakeHubTransport::default(),
        );
        let mut event = sample_event("req-1");
        event.request.dest_chain_type = String::new();
        assert!(!pipeline.passes_filter(&event));
    }

    #[tokio::test]
    async fn tick_advances_and_persists_height_even_with_no_events() {
        let pipeline = pipeline_with(
            FakeDriver {
                events: vec![],
                tip: 42,
                submitted: AtomicUsize::new(0),
            },
            FakeHubTransport::default(),
        );
        pipeline.tick().await.unwrap();
        assert_eq!(pipeline.last_height(), 42);
    }

    #[tokio::test]
    async fn submit_to_hub_does_not_error_on_duplicate_sequence_rejection() {
        let pipeline = pipeline_with(
            FakeDriver {
                events: vec![sample_event("req-dup")],
                tip: 10,
                submitted: AtomicUsize::new(0),
            },
            FakeHubTransport {
                reject_with: Some("duplicated request sequence for req-dup".to_string()),
            },
        );
        // Should not panic; duplicate-sequence rejections are swallowed.
        pipeline
            .submit_to_hub(sample_event("req-dup").request)
            .await;
    }
}
