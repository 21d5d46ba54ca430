use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::OracleResult;
use crate::extractor::CallerMetadata;
use crate::pipeline::{DecryptResponse, DecryptionPipeline, DecryptionRequest};

/// key: decrypt-api
/// Liveness probe plus the single decrypt endpoint.
pub fn routes() -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/api/v1/decrypt", post(decrypt))
}

#[derive(Debug, Deserialize)]
pub struct DecryptRequestBody {
    pub asymmetric_ciphertext_b64: String,
    #[serde(default)]
    pub over_limit: bool,
}

async fn ping() -> &'static str {
    "Pong"
}

async fn decrypt(
    Extension(pipeline): Extension<Arc<DecryptionPipeline>>,
    caller: CallerMetadata,
    Json(payload): Json<DecryptRequestBody>,
) -> OracleResult<Json<DecryptResponse>> {
    let request =
        DecryptionRequest::from_base64(&payload.asymmetric_ciphertext_b64, payload.over_limit)?;
    let response = pipeline.run(request, &caller).await?;
    Ok(Json(response))
}
