//! Rate-gated decrypt-and-release pipeline.
//!
//! A request moves through the stages of [`PipelineStage`] in order and stops
//! at the first failure. The length check always runs before admission, so
//! the forced-limit flag never short-circuits a malformed ciphertext. Every
//! run that gets past admission leaves one audit entry; a release is only
//! returned once its entry has been accepted by the audit sink.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::{AuditLogEntry, AuditOutcome, AuditSink};
use crate::digest::{request_fingerprint, response_fingerprint};
use crate::error::{OracleError, OracleResult};
use crate::extractor::CallerMetadata;
use crate::limiter::{Clock, FixedWindowLimiter, LimiterSnapshot, SystemClock};
use crate::oracle::Decryptor;
use crate::payload::validate_payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    ReceivedShape,
    LengthValidated,
    AdmissionChecked,
    Decrypted,
    PayloadValidated,
    Logged,
    Responded,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::ReceivedShape => "received_shape",
            PipelineStage::LengthValidated => "length_validated",
            PipelineStage::AdmissionChecked => "admission_checked",
            PipelineStage::Decrypted => "decrypted",
            PipelineStage::PayloadValidated => "payload_validated",
            PipelineStage::Logged => "logged",
            PipelineStage::Responded => "responded",
        }
    }
}

/// key: decryption-request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionRequest {
    pub ciphertext: Vec<u8>,
    /// Forces the rate-limited outcome once the ciphertext has passed the length check.
    pub force_over_limit: bool,
}

impl DecryptionRequest {
    pub fn from_base64(encoded: &str, force_over_limit: bool) -> OracleResult<Self> {
        let ciphertext = STANDARD.decode(encoded)?;
        Ok(Self {
            ciphertext,
            force_over_limit,
        })
    }
}

/// key: decrypt-response
/// Body shared by the released and rate-limited outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecryptResponse {
    pub key_recovered: String,
    pub request_sha256: String,
    pub ratelimit_limit: u32,
    pub ratelimit_remaining: u32,
    pub ratelimit_resets_in: u64,
}

impl DecryptResponse {
    fn released(key: String, request_sha256: String, snapshot: LimiterSnapshot) -> Self {
        Self {
            key_recovered: key,
            request_sha256,
            ratelimit_limit: snapshot.limit,
            ratelimit_remaining: snapshot.remaining,
            ratelimit_resets_in: snapshot.reset_in_secs,
        }
    }

    fn limited(request_sha256: String, snapshot: LimiterSnapshot) -> Self {
        Self {
            key_recovered: String::new(),
            request_sha256,
            ratelimit_limit: snapshot.limit,
            ratelimit_remaining: 0,
            ratelimit_resets_in: snapshot.reset_in_secs,
        }
    }
}

pub struct DecryptionPipeline<C = SystemClock> {
    oracle: Arc<dyn Decryptor>,
    limiter: Arc<FixedWindowLimiter<C>>,
    audit: Arc<dyn AuditSink>,
}

impl<C: Clock + 'static> DecryptionPipeline<C> {
    pub fn new(
        oracle: Arc<dyn Decryptor>,
        limiter: Arc<FixedWindowLimiter<C>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            oracle,
            limiter,
            audit,
        }
    }

    pub fn limiter(&self) -> &FixedWindowLimiter<C> {
        &self.limiter
    }

    pub async fn run(
        &self,
        request: DecryptionRequest,
        caller: &CallerMetadata,
    ) -> OracleResult<DecryptResponse> {
        debug!(
            stage = PipelineStage::ReceivedShape.as_str(),
            len = request.ciphertext.len()
        );

        let expected = self.oracle.modulus_len();
        if request.ciphertext.len() != expected {
            return Err(OracleError::InvalidCiphertextLength {
                expected,
                actual: request.ciphertext.len(),
            });
        }
        let request_digest = request_fingerprint(&request.ciphertext);
        debug!(
            stage = PipelineStage::LengthValidated.as_str(),
            request_sha256 = %request_digest
        );

        if request.force_over_limit || !self.limiter.allow() {
            let snapshot = self.limiter.snapshot();
            return Err(OracleError::RateLimited(DecryptResponse::limited(
                request_digest,
                snapshot,
            )));
        }
        debug!(
            stage = PipelineStage::AdmissionChecked.as_str(),
            request_sha256 = %request_digest
        );

        let oracle = Arc::clone(&self.oracle);
        let ciphertext = request.ciphertext;
        let decrypted = tokio::task::spawn_blocking(move || oracle.decrypt(&ciphertext))
            .await
            .unwrap_or_else(|e| Err(OracleError::DecryptionFailure(e.to_string())));
        let plaintext = match decrypted {
            Ok(plaintext) => plaintext,
            Err(err) => {
                let entry = AuditLogEntry::new(
                    request_digest,
                    None,
                    caller,
                    AuditOutcome::DecryptFailed,
                    Some(err.name()),
                );
                return Err(self.audit_failure(entry, err).await);
            }
        };
        let response_digest = response_fingerprint(&plaintext);
        debug!(
            stage = PipelineStage::Decrypted.as_str(),
            request_sha256 = %request_digest,
            response_dsha256 = %response_digest
        );

        let payload = match validate_payload(&plaintext, Utc::now()) {
            Ok(payload) => payload,
            Err(err) => {
                let entry = AuditLogEntry::new(
                    request_digest,
                    Some(response_digest),
                    caller,
                    AuditOutcome::Rejected,
                    Some(err.name()),
                );
                return Err(self.audit_failure(entry, err).await);
            }
        };
        drop(plaintext);
        debug!(
            stage = PipelineStage::PayloadValidated.as_str(),
            request_sha256 = %request_digest
        );

        let entry = AuditLogEntry::new(
            request_digest.clone(),
            Some(response_digest),
            caller,
            AuditOutcome::Released,
            None,
        );
        // Without a recorded entry the key is withheld.
        self.audit.append(&entry).await?;
        debug!(
            stage = PipelineStage::Logged.as_str(),
            audit_id = %entry.id
        );

        let response =
            DecryptResponse::released(payload.key, request_digest, self.limiter.snapshot());
        info!(
            stage = PipelineStage::Responded.as_str(),
            request_sha256 = %response.request_sha256,
            caller_ip = %caller.ip,
            remaining = response.ratelimit_remaining,
            "released recovered key"
        );
        Ok(response)
    }

    async fn audit_failure(&self, entry: AuditLogEntry, err: OracleError) -> OracleError {
        if let Err(audit_err) = self.audit.append(&entry).await {
            warn!(
                ?audit_err,
                request_sha256 = %entry.request_digest,
                outcome = entry.outcome.as_str(),
                "could not record failed decryption attempt"
            );
        }
        err
    }
}
