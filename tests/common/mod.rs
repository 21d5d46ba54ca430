#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use decrypt_oracle::audit::InMemoryAuditSink;
use decrypt_oracle::limiter::FixedWindowLimiter;
use decrypt_oracle::oracle::RsaOaepOracle;
use decrypt_oracle::pipeline::DecryptionPipeline;
use rand_core::OsRng;
use rsa::{Oaep, RsaPublicKey};
use serde_json::Value;
use sha2::Sha256;

pub const TEST_KEY: &str = include_str!("../fixtures/oracle_test_key.pem");

pub struct TestService {
    pub pipeline: Arc<DecryptionPipeline>,
    pub audit: Arc<InMemoryAuditSink>,
    pub public_key: RsaPublicKey,
}

pub fn service(limit: u32) -> TestService {
    let oracle = RsaOaepOracle::from_pem(TEST_KEY).expect("fixture key parses");
    let public_key = oracle.public_key();
    let audit = Arc::new(InMemoryAuditSink::new());
    let limiter = Arc::new(FixedWindowLimiter::new(limit, Duration::from_secs(3600)));
    let pipeline = Arc::new(DecryptionPipeline::new(
        Arc::new(oracle),
        limiter,
        audit.clone(),
    ));
    TestService {
        pipeline,
        audit,
        public_key,
    }
}

pub fn encrypt_b64(public_key: &RsaPublicKey, message: &[u8]) -> String {
    let ciphertext = public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), message)
        .expect("encryption succeeds");
    STANDARD.encode(ciphertext)
}

pub fn decrypt_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/decrypt")
        .header("content-type", "application/json")
        .header("user-agent", "oracle-tests/1.0")
        .header("x-forwarded-for", "203.0.113.5")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn json_body(response: Response<axum::body::BoxBody>) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).expect("response body is JSON")
}
