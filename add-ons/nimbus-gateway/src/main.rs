//! Axum-based HTTP gateway for nimbus. Config-driven via CoreConfig; every command turn is
//! delegated to `Orchestrator::handle`.

mod handlers;

use axum::{
    extract::State,
    http::Method,
    response::sse::{Event, KeepAlive, Sse},
    routing::{delete, get, post},
    Json, Router,
};
use nimbus_core::{CoreConfig, HandlerRegistry, InMemorySessionStore, OperationCatalog, Orchestrator};
use nimbus_skills::{register_all, CloudApi, FixtureCloud, ModelRouter};
use std::path::Path as StdPath;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::field::Visit;
use tracing_subscriber::layer::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const INVENTORY_DIR: &str = "nimbus_inventory";

/// Pulls the formatted "message" field out of a tracing event.
struct MessageCollector<'a>(&'a mut String);

impl Visit for MessageCollector<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            *self.0 = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{:?}", value);
        }
    }
}

/// Mirrors each tracing event onto a broadcast channel feeding `GET /api/v1/logs`.
#[derive(Clone)]
struct LogBroadcastLayer {
    tx: broadcast::Sender<String>,
}

impl<S> tracing_subscriber::Layer<S> for LogBroadcastLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageCollector(&mut message));
        let meta = event.metadata();
        // No subscribers is the normal case; nothing to report.
        let _ = self
            .tx
            .send(format!("{} [{}] {}", meta.level(), meta.target(), message));
    }
}

fn inventory_path(config: &CoreConfig) -> std::path::PathBuf {
    StdPath::new(&config.storage_path).join(INVENTORY_DIR)
}

/// Pre-flight: config loads, the inventory opens, and the port is free.
fn run_verify() -> Result<(), String> {
    let config = CoreConfig::load().map_err(|e| format!("config load failed: {}", e))?;

    let inventory = inventory_path(&config);
    print!("Checking inventory at {}... ", inventory.display());
    let cloud = FixtureCloud::open_path(&inventory)
        .map_err(|e| format!("inventory locked or inaccessible: {}", e))?;
    drop(cloud);
    println!("OK");

    print!("Checking port {}... ", config.port);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = std::net::TcpListener::bind(addr)
        .map_err(|e| format!("port {} blocked: {}", config.port, e))?;
    drop(listener);
    println!("OK (available)");

    println!("\nAll checks passed. Ready to start {}.", config.app_name);
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[nimbus-gateway] .env not loaded: {} (using system environment)", e);
    }

    if std::env::args().any(|a| a == "--verify") {
        match run_verify() {
            Ok(()) => std::process::exit(0),
            Err(e) => {
                eprintln!("PRE-FLIGHT FAILED: {}", e);
                std::process::exit(1);
            }
        }
    }

    let (log_tx, _) = broadcast::channel(1000);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(LogBroadcastLayer { tx: log_tx.clone() })
        .init();

    if let Err(e) = run(log_tx).await {
        tracing::error!(target: "nimbus::http", error = %e, "gateway stopped");
        std::process::exit(1);
    }
}

async fn run(log_tx: broadcast::Sender<String>) -> Result<(), BoxError> {
    let config = Arc::new(CoreConfig::load()?);

    let cloud: Arc<dyn CloudApi> = Arc::new(FixtureCloud::open_path(inventory_path(&config))?);
    let mut registry = HandlerRegistry::new();
    register_all(&mut registry, cloud);

    let engine = Arc::new(ModelRouter::from_config(&config)?);
    tracing::info!(target: "nimbus::engine", mode = engine.mode().as_str(), model = %config.llm_model, "understanding engine ready");

    let orchestrator = Arc::new(
        Orchestrator::new(
            Arc::new(OperationCatalog::standard()),
            engine,
            Arc::new(registry),
            Arc::new(InMemorySessionStore::new()),
        )
        .with_idle_timeout(config.session_idle_timeout()),
    );
    for name in orchestrator.unhandled_operations() {
        tracing::warn!(target: "nimbus::gateway", operation = %name, "catalog operation has no handler");
    }

    tokio::spawn(sweep_loop(
        Arc::clone(&orchestrator),
        config.session_sweep_interval(),
    ));

    let app = build_app(AppState {
        config: Arc::clone(&config),
        orchestrator,
        log_tx,
    });

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "nimbus::http", "{} listening on {}", config.app_name, addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Purges expired conversations from memory. Expiry itself is decided on the next turn.
async fn sweep_loop(orchestrator: Arc<Orchestrator>, every: Duration) {
    tracing::info!(target: "nimbus::session", interval_secs = every.as_secs(), "session sweeper started");
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        orchestrator.sweep_expired().await;
    }
}

fn build_app(state: AppState) -> Router {
    // Local UI (3001-3099) and API (8001-8099) port ranges.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &axum::http::HeaderValue, _| {
            let port = origin
                .to_str()
                .ok()
                .and_then(|s| s.rsplit(':').next())
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(0);
            (3001..=3099).contains(&port) || (8001..=8099).contains(&port)
        }))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/v1/status", get(status))
        .route("/api/v1/health", get(health))
        .route("/api/v1/logs", get(logs_stream))
        .route("/api/v1/command", post(handlers::command::command))
        .route(
            "/api/v1/conversations/:id",
            delete(handlers::command::cancel_conversation),
        )
        .route(
            "/api/v1/conversations/:id/history",
            get(handlers::command::conversation_history),
        )
        .route("/api/v1/operations", get(handlers::command::list_operations))
        .with_state(state)
        .layer(cors)
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: Arc<CoreConfig>,
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) log_tx: broadcast::Sender<String>,
}

/// GET /api/v1/health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /v1/status – app identity, engine mode and live conversation count.
async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "app_name": state.config.app_name,
        "port": state.config.port,
        "llm_mode": state.config.llm_mode,
        "engine": state.orchestrator.engine_name(),
        "operations": state.orchestrator.catalog().len(),
        "active_conversations": state.orchestrator.active_conversations().await,
    }))
}

/// GET /api/v1/logs – Server-Sent Events stream of gateway log lines.
async fn logs_stream(
    State(state): State<AppState>,
) -> Sse<impl futures_util::Stream<Item = Result<Event, std::convert::Infallible>> + Send + 'static> {
    use async_stream::stream;
    let mut rx = state.log_tx.subscribe();
    let stream = stream! {
        loop {
            match rx.recv().await {
                Ok(line) => yield Ok(Event::default().data(line)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    yield Ok(Event::default().data(format!("... {} log lines dropped", n)));
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use nimbus_skills::LlmMode;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn test_config() -> CoreConfig {
        CoreConfig {
            app_name: "Test Gateway".to_string(),
            port: 8001,
            storage_path: "./data".to_string(),
            llm_mode: "mock".to_string(),
            llm_model: "test".to_string(),
            session_idle_timeout_secs: 900,
            session_sweep_interval_secs: 60,
        }
    }

    fn test_app() -> Router {
        let cloud: Arc<dyn CloudApi> = Arc::new(FixtureCloud::temporary().unwrap());
        let mut registry = HandlerRegistry::new();
        register_all(&mut registry, cloud);
        let orchestrator = Orchestrator::new(
            Arc::new(OperationCatalog::standard()),
            Arc::new(ModelRouter::new(LlmMode::Mock, "test").unwrap()),
            Arc::new(registry),
            Arc::new(InMemorySessionStore::new()),
        );
        let (log_tx, _) = broadcast::channel(1);
        build_app(AppState {
            config: Arc::new(test_config()),
            orchestrator: Arc::new(orchestrator),
            log_tx,
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn status_reports_identity_and_catalog_size() {
        let app = test_app();
        let (code, json) = send(&app, "GET", "/v1/status", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(json["app_name"], "Test Gateway");
        assert_eq!(json["llm_mode"], "mock");
        assert_eq!(json["engine"], "ModelRouter");
        assert_eq!(json["operations"], 16);
        assert_eq!(json["active_conversations"], 0);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (code, json) = send(&test_app(), "GET", "/api/v1/health", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn list_servers_command_succeeds() {
        let app = test_app();
        let (code, json) = send(
            &app,
            "POST",
            "/api/v1/command",
            Some(json!({ "utterance": "list all servers" })),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert!(!json["conversation_id"].as_str().unwrap().is_empty());
        assert_eq!(json["output"][0], "No servers found.");
    }

    #[tokio::test]
    async fn create_then_delete_requires_confirmation() {
        let app = test_app();
        let (_, created) = send(
            &app,
            "POST",
            "/api/v1/command",
            Some(json!({
                "conversation_id": "http-1",
                "utterance": "create a server named web-1 with Ubuntu 22.04 on m1.small"
            })),
        )
        .await;
        assert_eq!(created["status"], "success");

        let (_, asked) = send(
            &app,
            "POST",
            "/api/v1/command",
            Some(json!({ "conversation_id": "http-1", "utterance": "delete server web-1" })),
        )
        .await;
        assert_eq!(asked["status"], "confirmation_required");
        assert!(asked["action_details"].as_str().unwrap().contains("web-1"));
        let token = asked["confirmation_token"].as_str().unwrap().to_string();

        let (code, done) = send(
            &app,
            "POST",
            "/api/v1/command",
            Some(json!({
                "conversation_id": "http-1",
                "structured_input": { "confirmation_id": token, "confirm": true }
            })),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(done["status"], "success");

        let (_, listed) = send(
            &app,
            "POST",
            "/api/v1/command",
            Some(json!({ "conversation_id": "http-1", "utterance": "list servers" })),
        )
        .await;
        assert_eq!(listed["output"][0], "No servers found.");
    }

    #[tokio::test]
    async fn delete_conversation_cancels_pending_call() {
        let app = test_app();
        let (_, asked) = send(
            &app,
            "POST",
            "/api/v1/command",
            Some(json!({ "conversation_id": "http-2", "utterance": "delete server vm-123" })),
        )
        .await;
        assert_eq!(asked["status"], "confirmation_required");

        let (code, canceled) = send(&app, "DELETE", "/api/v1/conversations/http-2", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(canceled["status"], "info");
        assert_eq!(canceled["message"], "Canceled. Nothing was executed.");
        assert_eq!(canceled["conversation_id"], "http-2");
    }

    #[tokio::test]
    async fn history_lists_executed_commands() {
        let app = test_app();
        let (_, empty) = send(&app, "GET", "/api/v1/conversations/http-3/history", None).await;
        assert_eq!(empty, json!([]));

        send(
            &app,
            "POST",
            "/api/v1/command",
            Some(json!({ "conversation_id": "http-3", "utterance": "list all servers" })),
        )
        .await;
        let (code, history) =
            send(&app, "GET", "/api/v1/conversations/http-3/history", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["command"]["operation"], "list_servers");
        assert_eq!(history[0]["output"][0], "No servers found.");
    }

    #[tokio::test]
    async fn operations_lists_the_catalog_in_order() {
        let (code, json) = send(&test_app(), "GET", "/api/v1/operations", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(json["count"], 16);
        assert_eq!(json["operations"][0]["name"], "list_servers");
        let delete_server = json["operations"]
            .as_array()
            .unwrap()
            .iter()
            .find(|op| op["name"] == "delete_server")
            .unwrap();
        assert_eq!(delete_server["destructive"], true);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_by_the_extractor() {
        let app = test_app();
        let req = Request::builder()
            .method("POST")
            .uri("/api/v1/command")
            .header("content-type", "application/json")
            .body(Body::from("not json"))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert!(res.status().is_client_error());
    }
}
