use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use decrypt_oracle::audit::{start_audit_worker, AuditSink, PgAuditSink};
use decrypt_oracle::config::{self, AuditWriteMode};
use decrypt_oracle::pipeline::DecryptionPipeline;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    // Fail fast if the private key is missing, malformed or the wrong size
    let oracle = config::oracle_from_env()?;
    tracing::info!(bits = oracle.key_bits(), "Loaded oracle private key");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config::DATABASE_URL.as_str())
        .await?;

    if let Err(error) = sqlx::migrate!().run(&pool).await {
        if *config::ALLOW_MIGRATION_FAILURE {
            tracing::warn!(
                ?error,
                "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
            );
        } else {
            return Err(Box::new(error) as Box<dyn std::error::Error>);
        }
    }

    let store: Arc<dyn AuditSink> = Arc::new(PgAuditSink::new(pool.clone()));
    let audit_mode = *config::AUDIT_WRITE_MODE;
    let audit: Arc<dyn AuditSink> = match audit_mode {
        AuditWriteMode::Sync => store,
        AuditWriteMode::Queued => {
            Arc::new(start_audit_worker(store, *config::AUDIT_QUEUE_CAPACITY))
        }
    };

    let limiter = Arc::new(config::limiter_from_env());
    tracing::info!(
        limit = limiter.limit(),
        period_secs = limiter.period().as_secs(),
        audit_mode = audit_mode.as_str(),
        "Decrypt limiter configured"
    );
    let pipeline = Arc::new(DecryptionPipeline::new(Arc::new(oracle), limiter, audit));

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = decrypt_oracle::app(pipeline)
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .layer(prometheus_layer);

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .map_err(|error| Box::new(error) as Box<dyn std::error::Error>)?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}
