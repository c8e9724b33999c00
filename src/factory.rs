//! Tagged dispatch from `chain_type` to a concrete [`LedgerDriver`].

use std::sync::Arc;

use alloy_primitives::{Address, B256};

use crate::chain_params::{ChainParams, ChainType};
use crate::driver::eth::{EthDriver, EthDriverConfig};
use crate::driver::polling::{PollingDriverConfig, PollingJsonRpcDriver};
use crate::driver::LedgerDriver;
use crate::error::RegistryError;

/// Builds the right driver for a chain's `chain_type`: `eth | fisco |
/// fabric | opb`. Only `eth` is backed by a chain-native provider today;
/// `fisco`, `fabric`, and `opb` share the generic polling JSON-RPC driver,
/// since none of them expose a push-subscription discipline this relayer
/// needs to special-case.
#[derive(Default)]
pub struct ChainFactory;

impl ChainFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn build_driver(&self, params: &ChainParams) -> Result<DriverHandle, RegistryError> {
        match params.chain_type {
            ChainType::Eth => Ok(DriverHandle::Eth(eth_config(params)?)),
            ChainType::Fisco | ChainType::Fabric | ChainType::Opb => {
                Ok(DriverHandle::Polling(polling_config(params)))
            }
        }
    }
}

fn eth_config(params: &ChainParams) -> Result<EthDriverConfig, RegistryError> {
    let contract_address: Address = params
        .contract_address
        .parse()
        .map_err(|e| RegistryError::InvalidParams(format!("invalid contract_address: {e}")))?;
    let signer_keys = params
        .signer_keys
        .iter()
        .map(|k| {
            let trimmed = k.trim_start_matches("0x");
            hex::decode(trimmed)
                .ok()
                .filter(|b| b.len() == 32)
                .map(|b| B256::from_slice(&b))
                .ok_or_else(|| RegistryError::InvalidParams(format!("invalid signer key: {k}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(EthDriverConfig {
        rpc_urls: params.rpc_urls.clone(),
        contract_address,
        signer_keys,
        eip1559: params.eip1559,
        confirmations: params.confirmations,
        mining_timeout_secs: params.mining_timeout_secs,
    })
}

fn polling_config(params: &ChainParams) -> PollingDriverConfig {
    PollingDriverConfig {
        rpc_urls: params.rpc_urls.clone(),
        endpoint_id: params.contract_address.clone(),
        mining_timeout_secs: params.mining_timeout_secs,
    }
}

/// Deferred driver construction: [`EthDriver::connect`] is async (it
/// resolves signer addresses against the RPC), so the factory hands back
/// enough config to build the driver from an async context rather than
/// building it itself.
pub enum DriverHandle {
    Eth(EthDriverConfig),
    Polling(PollingDriverConfig),
}

impl DriverHandle {
    pub async fn connect(self) -> Result<Arc<dyn LedgerDriver>, RegistryError> {
        match self {
            DriverHandle::Eth(config) => {
                let driver = EthDriver::connect(config).await?;
                Ok(Arc::new(driver))
            }
            DriverHandle::Polling(config) => Ok(Arc::new(PollingJsonRpcDriver::new(config))),
        }
    }
}
