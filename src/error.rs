//! Error types for the relayer's core components.

use thiserror::Error;

/// Errors surfaced by a [`crate::driver::LedgerDriver`].
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("no RPC node URLs configured")]
    NoNodeUrls,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("transaction {0} execution failed")]
    ExecutionFailed(String),
    #[error("transaction {0} was not mined within the configured timeout")]
    MiningTimeout(String),
    #[error("subscription error: {0}")]
    Subscription(String),
}

/// Errors surfaced by the hub client ([`crate::hub::HubClient`]).
#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub rejected the request: {0}")]
    Rejected(String),
    #[error("hub returned no request under context {0}")]
    EmptyRequestContext(String),
    #[error("hub transport error: {0}")]
    Transport(String),
    #[error("invalid service fee cap: {0}")]
    InvalidFeeCap(String),
}

impl HubError {
    /// Spec §4.2/§7: a duplicate-sequence rejection is the at-least-once
    /// replay success path, not a failure. Checked by substring, matching the
    /// original relayer's `strings.Contains(err.Error(), "duplicated request
    /// sequence")`.
    pub fn is_duplicate_request_sequence(&self) -> bool {
        matches!(self, HubError::Rejected(msg) if msg.contains("duplicated request sequence"))
    }
}

/// Errors surfaced by the per-chain pipeline ([`crate::pipeline::ChainPipeline`]).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Hub(#[from] HubError),
    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

/// Errors surfaced by the chain registry ([`crate::registry::ChainRegistry`]).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("chain {0} not found")]
    NotFound(String),
    #[error("chain {0} already registered")]
    AlreadyExists(String),
    #[error("chain {0} is already running")]
    AlreadyRunning(String),
    #[error("chain {0} is already stopped")]
    AlreadyStopped(String),
    #[error("invalid chain params: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Errors surfaced by the key-value store ([`crate::kvstore::KvStore`]).
#[derive(Debug, Error)]
pub enum KvError {
    #[error("key-value store backend error: {0}")]
    Backend(String),
    #[error("failed to (de)serialize value: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors surfaced by the audit log ([`crate::audit::AuditLog`]). Per spec
/// §4.5, audit operations are fire-and-forget on the core path — this type
/// exists so implementations have something concrete to log, not to be
/// propagated to callers.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log backend error: {0}")]
    Backend(String),
}

/// Errors surfaced while loading [`crate::config::Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(std::path::PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("environment variable '{0}' not found")]
    MissingEnvVar(String),
}
