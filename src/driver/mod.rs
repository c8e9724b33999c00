//! C3: the ledger driver abstraction unifying subscribe- and poll-based
//! source chains behind one interface (spec §4.1, §9).

pub mod eth;
pub mod polling;

use async_trait::async_trait;
use rand::seq::IndexedRandom;

use crate::error::DriverError;
use crate::request::InterchainRequest;

/// A single decoded cross-chain event, together with the height it was
/// observed at. Emitted by both the subscription- and polling-style
/// disciplines so [`crate::pipeline::ChainPipeline`] can treat them
/// uniformly (spec §9 "poll vs subscribe unification").
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub height: u64,
    pub request: InterchainRequest,
}

/// The outcome of a mined transaction.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub tx_hash: String,
    pub height: u64,
    pub success: bool,
}

/// A chain's unified read/write surface (spec §4.1 "ledger driver").
///
/// Implementations may back onto a subscription (WebSocket log feed) or a
/// polling loop over a block-height range; callers only see [`RawEvent`]s
/// and don't need to know which discipline produced them.
#[async_trait]
pub trait LedgerDriver: Send + Sync {
    /// Scans `[from_height, to_height]` inclusive for matching events.
    /// Used both by the polling disciplines directly and, for
    /// subscription-based drivers, to replay any gap left by a restart.
    async fn scan(&self, from_height: u64, to_height: u64) -> Result<Vec<RawEvent>, DriverError>;

    /// The chain's current block height.
    async fn height(&self) -> Result<u64, DriverError>;

    /// Submits a response back to the source chain's `setResponse`-style
    /// entry point (spec §4.6) and returns once the submission is accepted
    /// by a node (not necessarily mined — see [`LedgerDriver::wait_mined`]).
    async fn submit_response(
        &self,
        request_id: &str,
        output: &[u8],
        is_error: bool,
    ) -> Result<String, DriverError>;

    /// Blocks until `tx_hash` is mined, returning its receipt.
    async fn wait_mined(&self, tx_hash: &str) -> Result<Receipt, DriverError>;

    /// Looks up a previously submitted transaction by hash.
    async fn query_tx(&self, tx_hash: &str) -> Result<Option<Receipt>, DriverError>;
}

/// Picks a node URL uniformly at random from the configured set (spec §4.1:
/// "no preferred node; any configured RPC endpoint may serve a given call").
pub fn pick_node_url(urls: &[String]) -> Result<&str, DriverError> {
    urls.choose(&mut rand::rng())
        .map(String::as_str)
        .ok_or(DriverError::NoNodeUrls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_node_url_rejects_empty_set() {
        let urls: Vec<String> = vec![];
        assert!(matches!(pick_node_url(&urls), Err(DriverError::NoNodeUrls)));
    }

    #[test]
    fn pick_node_url_picks_a_configured_url() {
        let urls = vec!["http://a".to_string(), "http://b".to_string()];
        let picked = pick_node_url(&urls).unwrap();
        assert!(urls.iter().any(|u| u == picked));
    }
}
