//! The `cc_tx` audit log, recording the lifecycle of every relayed request.
//!
//! All operations here are fire-and-forget on the core path: callers log and
//! continue on error rather than letting an audit-log failure interrupt the
//! actual relaying.

use chrono::{NaiveDateTime, Utc};
use sqlx::MySqlPool;

use crate::error::AuditError;

/// `source_service` discriminator: which role recorded this row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum SourceService {
    Relayer = 0,
    Provider = 1,
}

/// `tx_status` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum TxStatus {
    Unknown = 0,
    Success = 1,
    Error = 2,
}

/// One row of the `cc_tx` table, as read back for diagnosis.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    pub request_id: String,
    pub from_chainid: Option<String>,
    pub from_tx: Option<String>,
    pub hub_req_tx: Option<String>,
    pub ic_request_id: Option<String>,
    pub to_chainid: Option<String>,
    pub to_tx: Option<String>,
    pub hub_res_tx: Option<String>,
    pub from_res_tx: Option<String>,
    pub tx_status: i8,
    pub tx_createtime: NaiveDateTime,
    pub tx_time: Option<NaiveDateTime>,
    pub error: Option<String>,
    pub source_service: i8,
}

/// The audit log's public operations. A given `(request_id,
/// source_service)` pair is inserted at most once on the happy path;
/// subsequent calls update the existing row.
#[async_trait::async_trait]
pub trait AuditLog: Send + Sync {
    async fn init_relayer_trans(
        &self,
        request_id: &str,
        from_chain: &str,
        from_tx: &str,
        to_chain: &str,
        hub_req_tx: &str,
        ic_request_id: &str,
        status: TxStatus,
        err: &str,
    ) -> Result<(), AuditError>;

    async fn relayer_response_record(
        &self,
        request_id: &str,
        from_res_tx: &str,
        status: TxStatus,
        err: &str,
    ) -> Result<(), AuditError>;

    async fn init_provider_trans(
        &self,
        ic_request_id: &str,
        from_chain: &str,
        hub_req_tx: &str,
        status: TxStatus,
        err: &str,
    ) -> Result<(), AuditError>;

    async fn provider_callback_trans(
        &self,
        ic_request_id: &str,
        to_tx: &str,
        status: TxStatus,
        err: &str,
    ) -> Result<(), AuditError>;
}

/// MySQL-backed [`AuditLog`].
pub struct SqlAuditLog {
    pool: MySqlPool,
}

impl SqlAuditLog {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates the `cc_tx` table if it doesn't already exist. Safe to call on
    /// every startup.
    pub async fn migrate(&self) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cc_tx (
                id              BIGINT UNSIGNED AUTO_INCREMENT PRIMARY KEY,
                request_id      VARCHAR(128) NOT NULL,
                from_chainid    VARCHAR(128),
                from_tx         VARCHAR(128),
                hub_req_tx      VARCHAR(128),
                ic_request_id   VARCHAR(128),
                to_chainid      VARCHAR(128),
                to_tx           VARCHAR(128),
                hub_res_tx      VARCHAR(128),
                from_res_tx     VARCHAR(128),
                tx_status       TINYINT NOT NULL DEFAULT 0,
                tx_createtime   DATETIME NOT NULL,
                tx_time         DATETIME,
                error           TEXT,
                source_service  TINYINT NOT NULL,
                UNIQUE KEY uq_request_service (request_id, source_service)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Backend(e.to_string()))?;
        Ok(())
    }

    /// Reads back a row by `(request_id, source_service)`, for operator
    /// diagnosis.
    pub async fn find(
        &self,
        request_id: &str,
        source_service: SourceService,
    ) -> Result<Option<AuditRow>, AuditError> {
        sqlx::query_as::<_, AuditRow>(
            "SELECT request_id, from_chainid, from_tx, hub_req_tx, ic_request_id, to_chainid, \
             to_tx, hub_res_tx, from_res_tx, tx_status, tx_createtime, tx_time, error, \
             source_service FROM cc_tx WHERE request_id = ? AND source_service = ?",
        )
        .bind(request_id)
        .bind(source_service as i8)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuditError::Backend(e.to_string()))
    }
}

#[async_trait::async_trait]
impl AuditLog for SqlAuditLog {
    async fn init_relayer_trans(
        &self,
        request_id: &str,
        from_chain: &str,
        from_tx: &str,
        to_chain: &str,
        hub_req_tx: &str,
        ic_request_id: &str,
        status: TxStatus,
        err: &str,
    ) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO cc_tx (request_id, from_chainid, from_tx, to_chainid, hub_req_tx, \
             ic_request_id, tx_status, tx_createtime, error, source_service) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(request_id)
        .bind(from_chain)
        .bind(from_tx)
        .bind(to_chain)
        .bind(hub_req_tx)
        .bind(ic_request_id)
        .bind(status as i8)
        .bind(Utc::now().naive_utc())
        .bind(err)
        .bind(SourceService::Relayer as i8)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn relayer_response_record(
        &self,
        request_id: &str,
        from_res_tx: &str,
        status: TxStatus,
        err: &str,
    ) -> Result<(), AuditError> {
        sqlx::query(
            "UPDATE cc_tx SET from_res_tx = ?, tx_status = ?, tx_time = ?, error = ? \
             WHERE request_id = ? AND source_service = ?",
        )
        .bind(from_res_tx)
        .bind(status as i8)
        .bind(Utc::now().naive_utc())
        .bind(err)
        .bind(request_id)
        .bind(SourceService::Relayer as i8)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn init_provider_trans(
        &self,
        ic_request_id: &str,
        from_chain: &str,
        hub_req_tx: &str,
        status: TxStatus,
        err: &str,
    ) -> Result<(), AuditError> {
        sqlx::query(
            "INSERT INTO cc_tx (request_id, ic_request_id, from_chainid, hub_req_tx, tx_status, \
             tx_createtime, error, source_service) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ic_request_id)
        .bind(ic_request_id)
        .bind(from_chain)
        .bind(hub_req_tx)
        .bind(status as i8)
        .bind(Utc::now().naive_utc())
        .bind(err)
        .bind(SourceService::Provider as i8)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn provider_callback_trans(
        &self,
        ic_request_id: &str,
        to_tx: &str,
        status: TxStatus,
        err: &str,
    ) -> Result<(), AuditError> {
        sqlx::query(
            "UPDATE cc_tx SET to_tx = ?, tx_status = ?, tx_time = ?, error = ? \
             WHERE ic_request_id = ? AND source_service = ?",
        )
        .bind(to_tx)
        .bind(status as i8)
        .bind(Utc::now().naive_utc())
        .bind(err)
        .bind(ic_request_id)
        .bind(SourceService::Provider as i8)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Backend(e.to_string()))?;
        Ok(())
    }
}

/// No-op [`AuditLog`] used in pipeline unit tests where persistence is
/// irrelevant to the behavior under test.
#[derive(Default, Clone)]
pub struct NullAuditLog;

#[async_trait::async_trait]
impl AuditLog for NullAuditLog {
    async fn init_relayer_trans(
        &self,
        _request_id: &str,
        _from_chain: &str,
        _from_tx: &str,
        _to_chain: &str,
        _hub_req_tx: &str,
        _ic_request_id: &str,
        _status: TxStatus,
        _err: &str,
    ) -> Result<(), AuditError> {
        Ok(())
    }

    async fn relayer_response_record(
        &self,
        _request_id: &str,
        _from_res_tx: &str,
        _status: TxStatus,
        _err: &str,
    ) -> Result<(), AuditError> {
        Ok(())
    }

    async fn init_provider_trans(
        &self,
        _ic_request_id: &str,
        _from_chain: &str,
        _hub_req_tx: &str,
        _status: TxStatus,
        _err: &str,
    ) -> Result<(), AuditError> {
        Ok(())
    }

    async fn provider_callback_trans(
        &self,
        _ic_request_id: &str,
        _to_tx: &str,
        _status: TxStatus,
        _err: &str,
    ) -> Result<(), AuditError> {
        Ok(())
    }
}
