//! Per-family chain parameter shapes and the registry's runtime handle to a
//! running chain.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pipeline::PipelineState;

/// Tagged chain-type discriminator dispatched on by the chain factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Eth,
    Fisco,
    Fabric,
    Opb,
}

impl ChainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainType::Eth => "eth",
            ChainType::Fisco => "fisco",
            ChainType::Fabric => "fabric",
            ChainType::Opb => "opb",
        }
    }
}

impl std::fmt::Display for ChainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChainType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eth" => Ok(ChainType::Eth),
            "fisco" => Ok(ChainType::Fisco),
            "fabric" => Ok(ChainType::Fabric),
            "opb" => Ok(ChainType::Opb),
            other => Err(format!("unknown chain_type '{other}'")),
        }
    }
}

/// Per-chain parameters as stored under `<type>:params:<chain_id>`. Kept as
/// a single permissive shape across chain families since the key-value
/// store has no schema; the chain factory picks out the fields each driver
/// needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainParams {
    pub chain_id: String,
    pub chain_type: ChainType,
    pub rpc_urls: Vec<String>,
    pub contract_address: String,
    #[serde(default)]
    pub signer_keys: Vec<String>,
    #[serde(default)]
    pub eip1559: bool,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_mining_timeout")]
    pub mining_timeout_secs: u64,
}

fn default_confirmations() -> u64 {
    1
}

fn default_mining_timeout() -> u64 {
    120
}

/// A handle letting the registry read a running pipeline's live state
/// without knowing its [`crate::hub::HubTransport`] type parameter.
pub trait PipelineHandle: Send + Sync {
    fn state(&self) -> PipelineState;
    fn last_height(&self) -> u64;
}

/// A registered, possibly-running chain.
pub struct AppChain {
    pub params: ChainParams,
    pub state: PipelineState,
    pub task: Option<JoinHandle<()>>,
    pub cancel: Option<CancellationToken>,
    pub pipeline: Option<Arc<dyn PipelineHandle>>,
}

impl AppChain {
    pub fn new(params: ChainParams) -> Self {
        Self {
            params,
            state: PipelineState::Init,
            task: None,
            cancel: None,
            pipeline: None,
        }
    }
}
