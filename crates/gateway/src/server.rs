use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use {
    anyhow::Context,
    axum::{
        Router,
        extract::{DefaultBodyLimit, State},
        http::StatusCode,
        response::{IntoResponse, Json},
        routing::get,
    },
    courier_config::CourierConfig,
    courier_messages::{DispatchSettings, MessageService},
    courier_session::{EventSink, FanoutEventSink, SessionRegistry},
    courier_store::{MessageStore, SqliteMessageStore},
    courier_whatsapp::{ManagerOptions, WhatsAppManager},
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use crate::{
    events::{BroadcastEventSink, WebhookEventSink},
    message_routes::message_router,
    state::GatewayState,
    ws::ws_upgrade_handler,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app_state = AppState {
        gateway: Arc::clone(&state),
    };

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .merge(message_router(app_state.clone()));
    if state.enable_websocket {
        router = router.route("/ws", get(ws_upgrade_handler));
    }

    router
        .fallback(not_found_handler)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Wire the store, event sinks and WhatsApp sessions from `config`, then
/// serve HTTP until interrupted.
pub async fn start_gateway(config: CourierConfig) -> anyhow::Result<()> {
    let database_url = courier_config::database_url(&config);
    if config.database.url.is_none() {
        std::fs::create_dir_all(courier_config::data_dir())
            .context("failed to create data directory")?;
    }
    let store: Arc<dyn MessageStore> = Arc::new(
        SqliteMessageStore::connect(&database_url)
            .await
            .with_context(|| format!("failed to open message store at {database_url}"))?,
    );

    let broadcaster = BroadcastEventSink::new();
    let mut events = FanoutEventSink::new().with_sink(Arc::new(broadcaster.clone()));
    if let Some(webhook) = WebhookEventSink::from_config(&config.webhook)? {
        info!(url = webhook.url(), "forwarding events to webhook");
        events = events.with_sink(Arc::new(webhook));
    }
    let events: Arc<dyn EventSink> = Arc::new(events);

    let sessions = Arc::new(SessionRegistry::new());
    let messages = MessageService::with_settings(
        Arc::clone(&sessions),
        Arc::clone(&store),
        Arc::clone(&events),
        DispatchSettings {
            default_bulk_delay: config.messages.bulk_delay(),
            default_page_size: config.messages.default_page_size,
        },
    );

    let whatsapp = Arc::new(WhatsAppManager::new(
        manager_options(&config),
        Arc::clone(&sessions),
        store,
        events,
    ));
    for session_id in &config.whatsapp.sessions {
        if let Err(e) = whatsapp.start_session(session_id).await {
            warn!(session_id = %session_id, error = %e, "failed to start whatsapp session");
        }
    }

    let state = Arc::new(
        GatewayState::new(messages, broadcaster)
            .with_whatsapp(Arc::clone(&whatsapp))
            .with_websocket(config.server.enable_websocket)
            .with_max_body_bytes(config.server.max_body_bytes),
    );
    let app = build_gateway_app(state);

    let addr = bind_addr(&config.server.bind, config.server.port)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        %addr,
        websocket = config.server.enable_websocket,
        "courier gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    whatsapp.shutdown().await?;
    Ok(())
}

/// `bind` is a bare IP address, v4 or v6 (brackets allowed).
fn bind_addr(bind: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let ip: IpAddr = bind
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    Ok(SocketAddr::new(ip, port))
}

fn manager_options(config: &CourierConfig) -> ManagerOptions {
    let wa = &config.whatsapp;
    ManagerOptions {
        sidecar_port: wa.sidecar_port,
        sidecar_dir: wa.sidecar_dir.clone(),
        auth_dir: Some(
            wa.auth_dir
                .clone()
                .unwrap_or_else(|| courier_config::data_dir().join("whatsapp-auth")),
        ),
        auto_start: wa.auto_start_sidecar,
        request_timeout: wa.request_timeout(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = serde_json::json!({
        "status": "ok",
        "version": state.gateway.version,
        "sessions": state.gateway.session_count(),
    });
    if let Some(ref whatsapp) = state.gateway.whatsapp {
        let connections: serde_json::Map<String, serde_json::Value> = whatsapp
            .session_ids()
            .into_iter()
            .filter_map(|id| {
                let connection = serde_json::to_value(whatsapp.connection_state(&id)?).ok()?;
                Some((id, connection))
            })
            .collect();
        body["whatsapp"] = serde_json::Value::Object(connections);
    }
    Json(body)
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "URL not found" })),
    )
}
