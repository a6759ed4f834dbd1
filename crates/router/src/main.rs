use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, routing::post, Json,
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use tierroute_common::api::route::{RouteRequest, RouteResponse};
use tierroute_common::RequestId;

use tierroute_router::backend::EmbeddingBackend;
use tierroute_router::config;
use tierroute_router::embedder::{Embedder, EmbedderChain};
use tierroute_router::registry::HttpRegistryClient;
use tierroute_router::router::SemanticRouter;

/// Shared application state accessible from axum handlers.
struct AppState {
    router: Arc<SemanticRouter>,
    registry: Arc<HttpRegistryClient>,
    metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("TierRoute router starting");

    // Load configuration — fail loudly on misconfiguration.
    let config_dir = std::env::var("TIERROUTE_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    let system_config = match config::load_config(&config_dir) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration — refusing to start");
            std::process::exit(1);
        }
    };

    // Install Prometheus metrics recorder.
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    // Build the embedding backend chain. A backend whose credential is
    // missing is skipped with a warning rather than blocking startup. Each
    // usable backend gets a background availability probe at its own
    // configured interval.
    let mut backends: Vec<Arc<EmbeddingBackend>> = Vec::new();
    for backend_config in &system_config.backends {
        match EmbeddingBackend::new(backend_config.clone()) {
            Ok(backend) => {
                let backend = Arc::new(backend);

                let probe = Arc::clone(&backend);
                let interval =
                    std::time::Duration::from_secs(backend_config.availability_check_seconds);
                tokio::spawn(async move {
                    loop {
                        tokio::time::sleep(interval).await;
                        probe.check_availability().await;
                    }
                });

                backends.push(backend);
            }
            Err(e) => {
                tracing::warn!(
                    provider = backend_config.provider.as_str(),
                    model = backend_config.model.as_str(),
                    error = %e,
                    "Skipping embedding backend"
                );
            }
        }
    }

    if backends.is_empty() {
        tracing::warn!("No usable embedding backends — routing will rely on keyword fallback");
    }

    // Warm up backends so local models load before the first request.
    for backend in &backends {
        let _ = backend.spawn_warmup();
    }

    let chain: Arc<dyn Embedder> = Arc::new(EmbedderChain::new(
        backends
            .iter()
            .map(|b| Arc::clone(b) as Arc<dyn Embedder>)
            .collect(),
    ));

    // Registry sidecar client.
    let registry_base_url =
        std::env::var("REGISTRY_BASE_URL").unwrap_or_else(|_| "http://localhost:8090".into());
    let registry = Arc::new(HttpRegistryClient::new(&registry_base_url));

    let router = match SemanticRouter::new(
        Arc::clone(&chain),
        registry.clone(),
        &system_config.router,
        &system_config.models,
    ) {
        Ok(router) => Arc::new(router),
        Err(e) => {
            tracing::error!(error = %e, "Failed to construct router — refusing to start");
            std::process::exit(1);
        }
    };

    // Initial index build. A down registry is not fatal: the refresh loop
    // keeps retrying and the router degrades to Novel/Frontier meanwhile.
    if let Err(e) = router.initialize().await {
        tracing::warn!(error = %e, "Initial index build failed — starting with an empty index");
    }

    // Periodic refresh, independent of request traffic.
    {
        let router = Arc::clone(&router);
        let period = std::time::Duration::from_secs(system_config.router.refresh_seconds);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if let Err(e) = router.refresh_if_needed().await {
                    tracing::warn!(error = %e, "Periodic index refresh failed");
                }
            }
        });
    }

    let state = Arc::new(AppState {
        router,
        registry,
        metrics_handle,
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/route", post(route_handler))
        .route("/stats", get(stats_handler))
        .with_state(state);

    let port: u16 = std::env::var("ROUTER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8085);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!(port = port, "TierRoute router listening");

    axum::serve(listener, app).await.expect("HTTP server error");
}

/// Health check: registry reachability plus embedder availability. The
/// embedder being down degrades routing but does not fail health, since
/// keyword fallback still serves.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry_ok = state.registry.health_check().await.is_ok();
    let embedder_ok = state.router.embedder_available();

    let status = if registry_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "status": if registry_ok { "healthy" } else { "unhealthy" },
        "services": {
            "registry": if registry_ok { "healthy" } else { "unhealthy" },
            "embedder": if embedder_ok { "available" } else { "unavailable" },
        }
    });

    (status, Json(body))
}

/// Prometheus metrics endpoint.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

/// POST /route — produce a routing decision for one request.
async fn route_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RouteRequest>,
) -> impl IntoResponse {
    if req.input.trim().is_empty() {
        let body = serde_json::json!({ "error": "input must not be empty" });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    let request_id = RequestId::new();
    let result = state.router.route(&req.input).await;

    tracing::info!(
        request_id = %request_id,
        decision = ?result.decision,
        tier = %result.recommended_tier,
        model = result.recommended_model.as_str(),
        embedding_failed = result.embedding_failed,
        processing_ms = result.processing_ms,
        "Routed request"
    );

    let response = RouteResponse { request_id, result };
    (StatusCode::OK, Json(response)).into_response()
}

/// GET /stats — router snapshot.
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.router.stats())
}
