use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::mpsc::{channel, Sender};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{OracleError, OracleResult};
use crate::extractor::CallerMetadata;

/// key: audit-outcome
/// How a pipeline run that got past admission ended.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Released,
    DecryptFailed,
    Rejected,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Released => "released",
            AuditOutcome::DecryptFailed => "decrypt_failed",
            AuditOutcome::Rejected => "rejected",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "released" => Some(Self::Released),
            "decrypt_failed" => Some(Self::DecryptFailed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// key: audit-log-entry
/// Immutable record of one decryption attempt. Holds fingerprints only, never
/// plaintext or the recovered key.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub request_digest: String,
    pub response_digest: Option<String>,
    pub caller_ip: String,
    pub user_agent: String,
    pub outcome: AuditOutcome,
    pub error_name: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        request_digest: String,
        response_digest: Option<String>,
        caller: &CallerMetadata,
        outcome: AuditOutcome,
        error_name: Option<&str>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_digest,
            response_digest,
            caller_ip: caller.ip.clone(),
            user_agent: caller.user_agent.clone(),
            outcome,
            error_name: error_name.map(str::to_string),
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> OracleResult<()>;
}

/// key: audit-sink-postgres
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, entry: &AuditLogEntry) -> OracleResult<()> {
        sqlx::query(
            "INSERT INTO decryption_audit_log(id, request_sha256, response_dsha256, request_ip_address, request_user_agent, outcome, error_name, recorded_at) VALUES($1,$2,$3,$4,$5,$6,$7,$8)",
        )
        .bind(entry.id)
        .bind(&entry.request_digest)
        .bind(&entry.response_digest)
        .bind(&entry.caller_ip)
        .bind(&entry.user_agent)
        .bind(entry.outcome.as_str())
        .bind(&entry.error_name)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            error!(
                ?err,
                request_sha256 = %entry.request_digest,
                "DB error writing audit entry"
            );
            OracleError::AuditPersistence(err.to_string())
        })?;
        debug!(id = %entry.id, outcome = entry.outcome.as_str(), "audit entry persisted");
        Ok(())
    }
}

/// key: audit-sink-memory
/// Process-local log, kept in insertion order.
#[derive(Default)]
pub struct InMemoryAuditSink {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: &AuditLogEntry) -> OracleResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}

/// key: audit-sink-queued
/// Moves the durable write off the request path. `append` succeeds once the
/// entry is queued; a full queue applies backpressure instead of dropping.
#[derive(Clone)]
pub struct QueuedAuditSink {
    sender: Sender<AuditLogEntry>,
}

#[async_trait]
impl AuditSink for QueuedAuditSink {
    async fn append(&self, entry: &AuditLogEntry) -> OracleResult<()> {
        self.sender.send(entry.clone()).await.map_err(|_| {
            OracleError::AuditPersistence("audit queue is no longer accepting entries".into())
        })
    }
}

pub fn start_audit_worker(inner: Arc<dyn AuditSink>, capacity: usize) -> QueuedAuditSink {
    let (tx, mut rx) = channel::<AuditLogEntry>(capacity.max(1));
    tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            if let Err(err) = inner.append(&entry).await {
                error!(
                    ?err,
                    id = %entry.id,
                    request_sha256 = %entry.request_digest,
                    "queued audit write failed",
                );
            }
        }
        debug!("audit queue closed; worker exiting");
    });
    QueuedAuditSink { sender: tx }
}
