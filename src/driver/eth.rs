//! EVM ledger driver (spec §4.1, chain_type `eth`), built on Alloy's
//! provider/filler/signer stack for EIP-155 chains.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alloy_network::{Ethereum, EthereumWallet, NetworkWallet, TransactionBuilder};
use alloy_primitives::{Address, B256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::{BlockNumberOrTag, Filter, TransactionReceipt, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall, SolEvent};
use async_trait::async_trait;

use crate::driver::{pick_node_url, LedgerDriver, RawEvent, Receipt};
use crate::error::DriverError;
use crate::request::{normalise_call_data, EndpointInfo, InterchainRequest};

sol! {
    /// Emitted by `IServiceCoreEx` when a request is ready to relay to the
    /// hub (spec §6 "source event shape").
    #[derive(Debug)]
    event CrossChainRequestSent(
        bytes32 _requestID,
        string _endpointInfo,
        string _method,
        bytes _callData,
        address _sender
    );

    /// The contract's callback entry point for hub-delivered responses
    /// (spec §4.6 `setResponse`).
    function setResponse(bytes32 requestID, string errMsg, string output) external;
}

/// Per-chain EVM configuration (spec §3 "eth chain params").
#[derive(Debug, Clone)]
pub struct EthDriverConfig {
    pub rpc_urls: Vec<String>,
    pub contract_address: Address,
    pub signer_keys: Vec<B256>,
    pub eip1559: bool,
    pub confirmations: u64,
    pub mining_timeout_secs: u64,
}

/// EVM [`LedgerDriver`] implementation.
///
/// Log scanning goes through a plain `eth_getLogs` filter rather than a
/// push subscription: the ingest loop in [`crate::pipeline`] drives this
/// with its own poll cadence regardless of whether the underlying RPC
/// transport happens to support `eth_subscribe` (spec §9).
pub struct EthDriver {
    provider: RootProvider,
    contract_address: Address,
    signer_addresses: Arc<Vec<Address>>,
    signer_cursor: Arc<AtomicUsize>,
    wallet: EthereumWallet,
    eip1559: bool,
    confirmations: u64,
    mining_timeout_secs: u64,
}

impl EthDriver {
    pub async fn connect(config: EthDriverConfig) -> Result<Self, DriverError> {
        if config.signer_keys.is_empty() {
            return Err(DriverError::Transport(
                "at least one signer key must be configured".to_string(),
            ));
        }
        let signers: Vec<PrivateKeySigner> = config
            .signer_keys
            .iter()
            .map(PrivateKeySigner::from_bytes)
            .collect::<Result<_, _>>()
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        let mut iter = signers.into_iter();
        let mut wallet = EthereumWallet::from(iter.next().expect("checked non-empty above"));
        for signer in iter {
            wallet.register_signer(signer);
        }
        let signer_addresses: Vec<Address> =
            NetworkWallet::<Ethereum>::signer_addresses(&wallet).collect();

        let rpc_url = pick_node_url(&config.rpc_urls)?;
        let url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| DriverError::Transport(e.to_string()))?;
        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Self {
            provider,
            contract_address: config.contract_address,
            signer_addresses: Arc::new(signer_addresses),
            signer_cursor: Arc::new(AtomicUsize::new(0)),
            wallet,
            eip1559: config.eip1559,
            confirmations: config.confirmations,
            mining_timeout_secs: config.mining_timeout_secs,
        })
    }

    fn next_signer_address(&self) -> Address {
        if self.signer_addresses.len() == 1 {
            self.signer_addresses[0]
        } else {
            let next =
                self.signer_cursor.fetch_add(1, Ordering::Relaxed) % self.signer_addresses.len();
            self.signer_addresses[next]
        }
    }

    fn decode_event(log: &alloy_rpc_types_eth::Log) -> Result<RawEvent, DriverError> {
        let height = log.block_number.ok_or_else(|| {
            DriverError::Transport("log missing block number".to_string())
        })?;
        let decoded = CrossChainRequestSent::decode_log(&log.inner)
            .map_err(|e| DriverError::Transport(format!("failed to decode event: {e}")))?;
        let endpoint: EndpointInfo = serde_json::from_str(&decoded._endpointInfo)
            .map_err(|e| DriverError::Transport(format!("malformed endpointInfo: {e}")))?;
        let tx_hash = log
            .transaction_hash
            .map(|h| format!("0x{}", hex::encode(h)))
            .unwrap_or_default();
        let request = InterchainRequest {
            id: hex::encode(decoded._requestID),
            source_chain_id: String::new(),
            dest_chain_id: endpoint.dest_chain_id,
            dest_sub_chain_id: endpoint.dest_sub_chain_id,
            dest_chain_type: endpoint.dest_chain_type,
            endpoint_address: endpoint.endpoint_address,
            endpoint_type: endpoint.endpoint_type,
            method: decoded._method.clone(),
            call_data: normalise_call_data(&decoded._callData),
            sender: decoded._sender.to_string(),
            tx_hash,
        };
        Ok(RawEvent { height, request })
    }
}

#[async_trait]
impl LedgerDriver for EthDriver {
    async fn scan(&self, from_height: u64, to_height: u64) -> Result<Vec<RawEvent>, DriverError> {
        let filter = Filter::new()
            .address(self.contract_address)
            .event_signature(CrossChainRequestSent::SIGNATURE_HASH)
            .from_block(BlockNumberOrTag::Number(from_height))
            .to_block(BlockNumberOrTag::Number(to_height));
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        logs.iter().map(Self::decode_event).collect()
    }

    async fn height(&self) -> Result<u64, DriverError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))
    }

    async fn submit_response(
        &self,
        request_id: &str,
        output: &[u8],
        is_error: bool,
    ) -> Result<String, DriverError> {
        let output_str = String::from_utf8_lossy(output).into_owned();
        let request_id_bytes = hex::decode(request_id.trim_start_matches("0x"))
            .ok()
            .filter(|b| b.len() == 32)
            .map(|b| B256::from_slice(&b))
            .ok_or_else(|| DriverError::Transport(format!("invalid request id {request_id}")))?;
        let call = setResponseCall {
            requestID: request_id_bytes,
            errMsg: if is_error { output_str.clone() } else { String::new() },
            output: if is_error { String::new() } else { output_str },
        };
        let from = self.next_signer_address();
        let mut txr = TransactionRequest::default()
            .with_to(self.contract_address)
            .with_from(from)
            .with_input(call.abi_encode());

        let provider = self
            .provider
            .clone()
            .join_with(alloy_provider::fillers::WalletFiller::new(
                self.wallet.clone(),
            ));

        if !self.eip1559 {
            let gas_price = provider
                .get_gas_price()
                .await
                .map_err(|e| DriverError::Transport(e.to_string()))?;
            txr.set_gas_price(gas_price);
        }

        let pending = provider
            .send_transaction(txr)
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(pending.tx_hash())))
    }

    async fn wait_mined(&self, tx_hash: &str) -> Result<Receipt, DriverError> {
        let hash: B256 = tx_hash
            .trim_start_matches("0x")
            .parse()
            .map_err(|_| DriverError::Transport(format!("invalid tx hash {tx_hash}")))?;
        let timeout = std::time::Duration::from_secs(self.mining_timeout_secs);
        let receipt: TransactionReceipt = tokio::time::timeout(
            timeout,
            self.provider.watch_pending_transaction(
                alloy_provider::PendingTransactionConfig::new(hash)
                    .with_required_confirmations(self.confirmations),
            ),
        )
        .await
        .map_err(|_| DriverError::MiningTimeout(tx_hash.to_string()))?
        .map_err(|e| DriverError::Transport(e.to_string()))?
        .get_receipt()
        .await
        .map_err(|e| DriverError::Transport(e.to_string()))?;

        if !receipt.status() {
            return Err(DriverError::ExecutionFailed(tx_hash.to_string()));
        }

        Ok(Receipt {
            tx_hash: tx_hash.to_string(),
            height: receipt.block_number.unwrap_or_default(),
            success: true,
        })
    }

    async fn query_tx(&self, tx_hash: &str) -> Result<Option<Receipt>, DriverError> {
        let hash: B256 = tx_hash
            .trim_start_matches("0x")
            .parse()
            .map_err(|_| DriverError::Transport(format!("invalid tx hash {tx_hash}")))?;
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        Ok(receipt.map(|r| Receipt {
            tx_hash: tx_hash.to_string(),
            height: r.block_number.unwrap_or_default(),
            success: r.status(),
        }))
    }
}
