//! The administrative HTTP façade over [`crate::registry::ChainRegistry`]:
//! register, start, stop, update, delete, and inspect chains at runtime.
//!
//! A thin `axum` surface that does no business logic of its own, just JSON
//! (de)serialization and a uniform `{code, result}` / `{code, error}`
//! response envelope.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::chain_params::ChainParams;
use crate::error::RegistryError;
use crate::hub::HubTransport;
use crate::registry::ChainRegistry;

/// Envelope wrapping every successful response: `{code: 0, result}`.
#[derive(Serialize)]
struct Envelope<T: Serialize> {
    code: u8,
    result: T,
}

fn ok<T: Serialize>(result: T) -> Response {
    (StatusCode::OK, Json(Envelope { code: 0, result })).into_response()
}

impl IntoResponse for RegistryError {
    /// Validation errors are `400`; everything else — not-found included —
    /// surfaces as `500`. Both carry `{code: 1, error}`.
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "code": 1, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Builds the admin router for one chain family, mounted by the caller at
/// `/api/v0/<family>`.
pub fn routes<T: HubTransport + 'static>() -> Router<Arc<ChainRegistry<T>>> {
    Router::new()
        .route("/chains", post(add_chain::<T>))
        .route("/chains", get(list_chains::<T>))
        .route("/chains/{id}/update", post(update_chain::<T>))
        .route("/chains/{id}/delete", post(delete_chain::<T>))
        .route("/chains/{id}/start", post(start_chain::<T>))
        .route("/chains/{id}/stop", post(stop_chain::<T>))
        .route("/chains/{id}/status", get(chain_status::<T>))
        .route("/health", get(health))
}

/// Liveness probe independent of any chain's state.
#[instrument(skip_all)]
async fn health() -> Response {
    ok(json!({ "result": true }))
}

/// Registers a new chain from a chain-params JSON body and starts its
/// pipeline.
#[instrument(skip_all)]
async fn add_chain<T: HubTransport + 'static>(
    State(registry): State<Arc<ChainRegistry<T>>>,
    Json(params): Json<ChainParams>,
) -> Response {
    let chain_id = params.chain_id.clone();
    match registry.add(params).await {
        Ok(()) => match registry.start(&chain_id).await {
            Ok(()) => ok(json!({ "chain_id": chain_id })),
            Err(start_err) => {
                let _ = registry.delete(&chain_id).await;
                start_err.into_response()
            }
        },
        Err(e) => e.into_response(),
    }
}

/// Replaces a chain's params; internally a delete followed by an add.
#[instrument(skip_all, fields(chain_id = %id))]
async fn update_chain<T: HubTransport + 'static>(
    State(registry): State<Arc<ChainRegistry<T>>>,
    Path(id): Path<String>,
    Json(params): Json<ChainParams>,
) -> Response {
    match registry.update(&id, params).await {
        Ok(()) => ok(json!({ "chain_id": id })),
        Err(e) => e.into_response(),
    }
}

/// Unregisters a chain, stopping it first if running.
#[instrument(skip_all, fields(chain_id = %id))]
async fn delete_chain<T: HubTransport + 'static>(
    State(registry): State<Arc<ChainRegistry<T>>>,
    Path(id): Path<String>,
) -> Response {
    match registry.delete(&id).await {
        Ok(()) => ok(Value::Null),
        Err(e) => e.into_response(),
    }
}

/// Starts a registered chain's ingest pipeline.
#[instrument(skip_all, fields(chain_id = %id))]
async fn start_chain<T: HubTransport + 'static>(
    State(registry): State<Arc<ChainRegistry<T>>>,
    Path(id): Path<String>,
) -> Response {
    match registry.start(&id).await {
        Ok(()) => ok(Value::Null),
        Err(e) => e.into_response(),
    }
}

/// Stops a running chain's ingest pipeline.
#[instrument(skip_all, fields(chain_id = %id))]
async fn stop_chain<T: HubTransport + 'static>(
    State(registry): State<Arc<ChainRegistry<T>>>,
    Path(id): Path<String>,
) -> Response {
    match registry.stop(&id).await {
        Ok(()) => ok(Value::Null),
        Err(e) => e.into_response(),
    }
}

/// Summary of every registered chain.
#[instrument(skip_all)]
async fn list_chains<T: HubTransport + 'static>(
    State(registry): State<Arc<ChainRegistry<T>>>,
) -> Response {
    ok(registry.list())
}

/// Current state and last-seen height for one chain.
#[instrument(skip_all, fields(chain_id = %id))]
async fn chain_status<T: HubTransport + 'static>(
    State(registry): State<Arc<ChainRegistry<T>>>,
    Path(id): Path<String>,
) -> Response {
    match registry.status(&id) {
        Ok(status) => ok(status),
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NullAuditLog;
    use crate::hub::HubClient;
    use crate::hub::transport::tests::FakeHubTransport;
    use crate::kvstore::MemoryKvStore;
    use axum::body::Body;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_registry() -> Arc<ChainRegistry<FakeHubTransport>> {
        let hub = Arc::new(HubClient::new(
            FakeHubTransport::default(),
            Duration::from_millis(10),
        ));
        Arc::new(ChainRegistry::new(
            crate::chain_params::ChainType::Fabric,
            Arc::new(MemoryKvStore::default()),
            Arc::new(NullAuditLog),
            hub,
        ))
    }

    #[tokio::test]
    async fn health_returns_ok_envelope() {
        let registry = test_registry();
        let router = routes::<FakeHubTransport>().with_state(registry);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_of_unknown_chain_is_500_with_error_envelope() {
        let registry = test_registry();
        let router = routes::<FakeHubTransport>().with_state(registry);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/chains/does-not-exist/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
