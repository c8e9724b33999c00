//! C6: the chain registry — add/update/delete/start/stop/status/list, with
//! rollback on add failure and startup recovery (spec §4.4).

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::audit::AuditLog;
use crate::chain_params::{AppChain, ChainParams, ChainType};
use crate::error::RegistryError;
use crate::factory::ChainFactory;
use crate::hub::{HubClient, HubTransport};
use crate::kvstore::{keys, read_chain_id_index, write_chain_id_index, KvStore, KvStoreExt};
use crate::pipeline::{ChainPipeline, PipelineState};

/// A snapshot of one chain's registration status (spec §4.4 `status`/`list`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChainStatus {
    pub chain_id: String,
    pub chain_type: String,
    pub state: String,
    pub last_height: u64,
}

/// Registry of chains for a single application-chain family, shared by the
/// admin HTTP façade (spec §6).
///
/// Uses [`DashMap`] for its per-shard locking: concurrent reads (status,
/// list) never block each other, and a writer only takes the lock for the
/// one shard holding the chain it's mutating.
pub struct ChainRegistry<T: HubTransport> {
    chain_type: ChainType,
    chains: DashMap<String, AppChain>,
    kv: Arc<dyn KvStore>,
    audit: Arc<dyn AuditLog>,
    hub: Arc<HubClient<T>>,
    factory: ChainFactory,
}

impl<T: HubTransport + 'static> ChainRegistry<T> {
    pub fn new(
        chain_type: ChainType,
        kv: Arc<dyn KvStore>,
        audit: Arc<dyn AuditLog>,
        hub: Arc<HubClient<T>>,
    ) -> Self {
        Self {
            chain_type,
            chains: DashMap::new(),
            kv,
            audit,
            hub,
            factory: ChainFactory::new(),
        }
    }

    /// Re-registers every chain this process owns from the persisted
    /// `chainIDs` index, starting each one (spec §4.4 "startup recovery").
    /// A chain whose pipeline fails to start aborts the whole boot sequence
    /// (spec §4.4: "Pipelines whose start fails abort the boot"), matching
    /// the fatal-startup-failure behavior of spec §7.
    pub async fn recover(&self) -> Result<(), RegistryError> {
        let index = read_chain_id_index(self.kv.as_ref()).await?;
        for (chain_id, chain_type) in index {
            if chain_type != self.chain_type.as_str() {
                continue;
            }
            let key = keys::params(&chain_type, &chain_id);
            match self.kv.get_json::<ChainParams>(&key).await {
                Ok(Some(params)) => {
                    self.add(params).await?;
                    self.start(&chain_id).await?;
                }
                Ok(None) => {
                    warn!(%chain_id, "chain listed in index but has no persisted params");
                }
                Err(e) => {
                    error!(%chain_id, error = %e, "failed to read persisted chain params");
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Registers a new chain. Persists its params and updates the
    /// `chainIDs` index before admitting it to the in-memory map; if either
    /// persistence step fails, no partial state is left behind (spec §4.4
    /// "rollback on add failure").
    pub async fn add(&self, params: ChainParams) -> Result<(), RegistryError> {
        if self.chains.contains_key(&params.chain_id) {
            return Err(RegistryError::AlreadyExists(params.chain_id.clone()));
        }
        let chain_id = params.chain_id.clone();
        let key = keys::params(self.chain_type.as_str(), &chain_id);

        self.kv.set_json(&key, &params).await?;

        let mut index = read_chain_id_index(self.kv.as_ref()).await?;
        index.insert(chain_id.clone(), self.chain_type.as_str().to_string());
        if let Err(e) = write_chain_id_index(self.kv.as_ref(), &index).await {
            // Roll back the params write so a half-registered chain isn't
            // left in the store.
            let _ = self.kv.delete(&key).await;
            return Err(e.into());
        }

        self.chains.insert(chain_id, AppChain::new(params));
        Ok(())
    }

    /// Replaces a chain's params. Implemented as delete-then-add (spec §4.4
    /// "update = delete-then-add"): a running chain is stopped first.
    pub async fn update(&self, chain_id: &str, params: ChainParams) -> Result<(), RegistryError> {
        let was_running = self
            .chains
            .get(chain_id)
            .map(|c| c.state == PipelineState::Running)
            .unwrap_or(false);
        self.delete(chain_id).await?;
        self.add(params).await?;
        if was_running {
            self.start(chain_id).await?;
        }
        Ok(())
    }

    /// Unregisters a chain, stopping it first if running.
    pub async fn delete(&self, chain_id: &str) -> Result<(), RegistryError> {
        if !self.chains.contains_key(chain_id) {
            return Err(RegistryError::NotFound(chain_id.to_string()));
        }
        let _ = self.stop(chain_id).await;

        let key = keys::params(self.chain_type.as_str(), chain_id);
        self.kv.delete(&key).await?;

        let mut index = read_chain_id_index(self.kv.as_ref()).await?;
        index.remove(chain_id);
        write_chain_id_index(self.kv.as_ref(), &index).await?;

        self.chains.remove(chain_id);
        Ok(())
    }

    /// Starts a registered chain's ingest pipeline.
    pub async fn start(&self, chain_id: &str) -> Result<(), RegistryError> {
        let params = {
            let chain = self
                .chains
                .get(chain_id)
                .ok_or_else(|| RegistryError::NotFound(chain_id.to_string()))?;
            if chain.state == PipelineState::Running {
                return Err(RegistryError::AlreadyRunning(chain_id.to_string()));
            }
            chain.params.clone()
        };

        let driver = self.factory.build_driver(&params)?.connect().await?;
        let pipeline = Arc::new(ChainPipeline::new(
            chain_id.to_string(),
            self.chain_type.as_str().to_string(),
            driver,
            self.hub.clone(),
            self.audit.clone(),
            self.kv.clone(),
        ));
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let pipeline = pipeline.clone();
            let cancel = cancel.clone();
            async move {
                pipeline.run(cancel).await;
            }
        });

        let mut chain = self
            .chains
            .get_mut(chain_id)
            .ok_or_else(|| RegistryError::NotFound(chain_id.to_string()))?;
        chain.state = PipelineState::Running;
        chain.task = Some(task);
        chain.cancel = Some(cancel);
        chain.pipeline = Some(pipeline as Arc<dyn crate::chain_params::PipelineHandle>);
        info!(%chain_id, "chain started");
        Ok(())
    }

    /// Signals a running chain's pipeline to stop and waits for it to exit.
    pub async fn stop(&self, chain_id: &str) -> Result<(), RegistryError> {
        let (cancel, task) = {
            let mut chain = self
                .chains
                .get_mut(chain_id)
                .ok_or_else(|| RegistryError::NotFound(chain_id.to_string()))?;
            if chain.state != PipelineState::Running {
                return Err(RegistryError::AlreadyStopped(chain_id.to_string()));
            }
            chain.state = PipelineState::Stopping;
            (chain.cancel.take(), chain.task.take())
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(task) = task {
            let _ = task.await;
        }
        if let Some(mut chain) = self.chains.get_mut(chain_id) {
            chain.state = PipelineState::Stopped;
            chain.pipeline = None;
        }
        info!(%chain_id, "chain stopped");
        Ok(())
    }

    pub fn status(&self, chain_id: &str) -> Result<ChainStatus, RegistryError> {
        let chain = self
            .chains
            .get(chain_id)
            .ok_or_else(|| RegistryError::NotFound(chain_id.to_string()))?;
        Ok(Self::status_of(chain_id, &chain))
    }

    pub fn list(&self) -> Vec<ChainStatus> {
        self.chains
            .iter()
            .map(|entry| Self::status_of(entry.key(), entry.value()))
            .collect()
    }

    fn status_of(chain_id: &str, chain: &AppChain) -> ChainStatus {
        let last_height = chain
            .pipeline
            .as_ref()
            .map(|p| p.last_height())
            .unwrap_or(0);
        let state = chain
            .pipeline
            .as_ref()
            .map(|p| format!("{:?}", p.state()))
            .unwrap_or_else(|| format!("{:?}", chain.state));
        ChainStatus {
            chain_id: chain_id.to_string(),
            chain_type: chain.params.chain_type.as_str().to_string(),
            state,
            last_height,
        }
    }
}
