use std::{sync::Arc, time::Duration};

use api_router::{api_routes, api_state::ApiState};
use axum::Router;
use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::config::get_config,
};
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let storage = StorageManager::new(&config).await?;
    info!(
        backend = ?storage.backend_kind(),
        namespace = %config.pdf_namespace,
        "Blob storage initialized"
    );

    let api_state = ApiState::new(&config, storage).await?;

    let _monitor = spawn_health_monitor(
        Arc::clone(&api_state.db),
        api_state.storage.clone(),
        config.pdf_namespace.clone(),
        Duration::from_secs(config.health_check_interval_secs.max(1)),
    );

    let app = app(api_state);

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn app(api_state: ApiState) -> Router {
    Router::new()
        .merge(api_routes(&api_state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(api_state)
}

/// Periodically probes both stores so `/ready` and the logs reflect outages
/// between requests.
fn spawn_health_monitor(
    db: Arc<SurrealDbClient>,
    storage: StorageManager,
    namespace: String,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        let mut storage_ok = true;
        loop {
            ticker.tick().await;
            db.probe().await;

            match storage.check_available(&namespace).await {
                Ok(()) if !storage_ok => {
                    info!("blob storage available again");
                    storage_ok = true;
                }
                Ok(()) => {}
                Err(err) => {
                    if storage_ok {
                        warn!(error = %err, "blob storage unavailable");
                    }
                    storage_ok = false;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use common::{
        storage::db::ConnectionState,
        utils::config::{AppConfig, StorageKind},
    };
    use std::path::Path;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn smoke_test_config(namespace: &str, database: &str, data_dir: &Path) -> AppConfig {
        AppConfig {
            surrealdb_address: "mem://".into(),
            surrealdb_username: "root".into(),
            surrealdb_password: "root".into(),
            surrealdb_namespace: namespace.into(),
            surrealdb_database: database.into(),
            data_dir: data_dir.to_string_lossy().into_owned(),
            http_port: 0,
            storage: StorageKind::Local,
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_with_in_memory_surrealdb() {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let data_dir = std::env::temp_dir().join(format!("nfe_smoke_{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&data_dir)
            .await
            .expect("failed to create temp data directory");

        let config = smoke_test_config(namespace, &database, &data_dir);
        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        db.ensure_initialized()
            .await
            .expect("failed to initialize schema");

        let storage = StorageManager::new(&config)
            .await
            .expect("failed to build storage manager");

        let api_state = ApiState::from_parts(db.clone(), config.clone(), storage.clone());
        let app = app(api_state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let ready_response = app
            .oneshot(
                Request::builder()
                    .uri("/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("ready response");
        assert_eq!(ready_response.status(), StatusCode::OK);

        let monitor = spawn_health_monitor(
            db.clone(),
            storage,
            config.pdf_namespace.clone(),
            Duration::from_millis(10),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(db.connection_state(), ConnectionState::Connected);
        monitor.abort();

        tokio::fs::remove_dir_all(&data_dir).await.ok();
    }
}
