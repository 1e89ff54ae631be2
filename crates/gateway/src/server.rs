use std::{convert::Infallible, sync::Arc, time::Duration};

use {
    anyhow::Context,
    axum::{
        Router,
        body::Bytes,
        extract::{Path, State},
        http::StatusCode,
        response::{
            IntoResponse, Json, Response,
            sse::{Event, KeepAlive, Sse},
        },
        routing::{get, post, put},
    },
    serde::Deserialize,
    tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream},
    tower_http::trace::TraceLayer,
    tracing::{info, warn},
};

use {
    courier_auto_reply::{
        conversations::ConversationDirectory,
        delivery::{DeliverySettings, Dispatcher},
        inbound::Inbox,
        queue::Aggregator,
        reply::{AutoReply, EchoReplyGenerator, ReplyGenerator, ReplySettings},
    },
    courier_channels::{ChannelOutbound, HistoryStore, InMemoryHistoryStore},
    courier_common::types::AssignmentMode,
    courier_config::CourierConfig,
    courier_sendapi::{SendApiOutbound, parse_webhook},
};

use crate::{broadcast::Broadcaster, reply_client::HttpReplyGenerator, state::GatewayState};

// ── Wiring ───────────────────────────────────────────────────────────────────

/// External collaborators the pipeline is wired to.
pub struct Collaborators {
    pub outbound: Arc<dyn ChannelOutbound>,
    pub generator: Arc<dyn ReplyGenerator>,
    pub history: Arc<dyn HistoryStore>,
}

/// Wire the pipeline: inbox → aggregator → auto-reply → dispatcher.
pub fn build_state(config: &CourierConfig, collaborators: Collaborators) -> Arc<GatewayState> {
    let Collaborators {
        outbound,
        generator,
        history,
    } = collaborators;
    let broadcaster = Arc::new(Broadcaster::default());
    let directory = Arc::new(ConversationDirectory::new());

    let dispatcher = Dispatcher::new(
        outbound,
        Arc::clone(&history),
        broadcaster.clone(),
        DeliverySettings::from(&config.delivery),
    );
    let auto_reply = Arc::new(AutoReply::new(
        generator,
        dispatcher,
        ReplySettings::from(&config.delivery),
    ));
    let aggregator = Aggregator::new(
        config.aggregation.quiet_period(),
        Arc::clone(&directory),
        auto_reply,
    );
    let inbox = Inbox::new(
        directory,
        aggregator,
        history,
        broadcaster.clone(),
        config.delivery.translate_markup,
    );
    GatewayState::new(inbox, broadcaster)
}

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler))
        .route(
            "/api/conversations/{correspondent_id}/assignment",
            put(assignment_handler),
        )
        .route("/api/events", get(events_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Start the gateway and serve until ctrl-c.
pub async fn start_gateway(config: CourierConfig) -> anyhow::Result<()> {
    let outbound = Arc::new(
        SendApiOutbound::new(&config.channel).context("configuring Send API channel")?,
    );
    let generator: Arc<dyn ReplyGenerator> = match config.reply.endpoint.as_deref() {
        Some(endpoint) => {
            info!(endpoint, "using HTTP reply endpoint");
            Arc::new(HttpReplyGenerator::new(
                endpoint,
                Duration::from_secs(config.reply.timeout_secs),
            )?)
        },
        None => {
            warn!("no reply endpoint configured, echoing inbound turns");
            Arc::new(EchoReplyGenerator)
        },
    };
    let state = build_state(&config, Collaborators {
        outbound,
        generator,
        history: Arc::new(InMemoryHistoryStore::new()),
    });
    let app = build_gateway_app(Arc::clone(&state));

    let bind = (config.server.bind.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {}:{}", bind.0, bind.1))?;
    info!(
        addr = %listener.local_addr()?,
        version = state.version,
        quiet_period = ?config.aggregation.quiet_period(),
        char_limit = config.delivery.char_limit,
        "courier gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.inbox.aggregator().shutdown();
    info!("courier gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "pending": state.inbox.aggregator().pending_count(),
    }))
}

/// Acknowledge right away; events are processed in order on a background task.
async fn webhook_handler(State(state): State<Arc<GatewayState>>, body: Bytes) -> StatusCode {
    let events = match parse_webhook(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "malformed webhook body");
            return StatusCode::BAD_REQUEST;
        },
    };

    tokio::spawn(async move {
        for event in events {
            let sender_id = event.sender_id.clone();
            if let Err(e) = state.inbox.receive(event).await {
                warn!(sender_id = %sender_id, error = %e, "dropping inbound event");
            }
        }
    });
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
struct AssignmentBody {
    mode: AssignmentMode,
}

async fn assignment_handler(
    State(state): State<Arc<GatewayState>>,
    Path(correspondent_id): Path<String>,
    Json(body): Json<AssignmentBody>,
) -> Response {
    let Some(conversation) = state
        .inbox
        .directory()
        .find_by_correspondent(&correspondent_id)
    else {
        return not_found(format!("no conversation for {correspondent_id}"));
    };
    match state.inbox.set_assignment(&conversation.id, body.mode).await {
        Ok(conversation) => Json(conversation).into_response(),
        Err(e) => not_found(e.to_string()),
    }
}

fn not_found(message: String) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Server-sent stream of channel events. Frames a slow observer missed are
/// skipped.
async fn events_handler(
    State(state): State<Arc<GatewayState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.broadcaster.subscribe()).filter_map(|frame| {
        frame
            .ok()
            .map(|json| Ok::<_, Infallible>(Event::default().event("channel").data(json)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
