pub mod api;
pub mod audit;
pub mod config;
pub mod digest;
pub mod error;
pub mod extractor;
pub mod limiter;
pub mod oracle;
pub mod payload;
pub mod pipeline;

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use crate::pipeline::DecryptionPipeline;

async fn root() -> &'static str {
    "Decrypt Oracle API"
}

/// Router with every route the service exposes except `/metrics`, which the
/// binary attaches together with its recorder.
pub fn app(pipeline: Arc<DecryptionPipeline>) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(api::routes())
        .layer(Extension(pipeline))
}
