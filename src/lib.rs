//! Core library of the interchain relayer: a long-running process that
//! bridges asynchronous service invocations between an application chain
//! and a central hub chain implementing a generic cross-chain service
//! broker (spec §1).
//!
//! # Overview
//!
//! A single relayer process serves one [`chain_params::ChainType`] family
//! (EVM, Fabric, or WASM/OPB) but can run many sub-chains of that family at
//! once, each registered through the administrative HTTP API in [`admin`].
//!
//! # Modules
//!
//! - [`admin`] — C8: the administrative HTTP façade (`/api/v0/<family>/...`).
//! - [`audit`] — C2: the `cc_tx` audit log recording every request's lifecycle.
//! - [`chain_params`] — Per-family chain parameter shapes and the registry's
//!   runtime handle to a running chain.
//! - [`config`] — Process configuration (chain family, HTTP bind address,
//!   key/value store path, audit database, hub settings).
//! - [`driver`] — C3: the ledger driver trait and its `eth`/polling
//!   implementations.
//! - [`error`] — `thiserror`-derived error types for every component.
//! - [`factory`] — C7: dispatch from `chain_type` to a concrete driver.
//! - [`hub`] — C5: the hub client (request submission, response delivery).
//! - [`kvstore`] — C1: the persistent key/value store.
//! - [`pipeline`] — C4: the per-chain ingest/response pipeline.
//! - [`registry`] — C6: the in-memory multi-chain lifecycle manager.
//! - [`request`] — Ledger-agnostic request/response data types.
//! - [`util`] — Graceful shutdown and logging setup.

pub mod admin;
pub mod audit;
pub mod chain_params;
pub mod config;
pub mod driver;
pub mod error;
pub mod factory;
pub mod hub;
pub mod kvstore;
pub mod pipeline;
pub mod registry;
pub mod request;
pub mod util;
