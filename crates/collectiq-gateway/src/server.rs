//! Axum server: carrier voice webhook, media-stream websocket, health.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, header},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::connection::handle_media_stream;
use crate::state::GatewayState;
use crate::twiml;

pub const VOICE_PATH: &str = "/collect-iq/voice";
pub const MEDIA_STREAM_PATH: &str = "/collect-iq/media-stream";

#[derive(Debug, Default, Deserialize)]
pub struct CallParams {
    #[serde(rename = "payerId")]
    pub payer_id: Option<String>,
}

/// Build the gateway router.
pub fn router(state: Arc<GatewayState>) -> Router {
    let app = Router::new()
        .route(VOICE_PATH, get(voice_handler).post(voice_handler))
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .route("/health", get(health_handler));

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Start the gateway server and serve until ctrl-c.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.bind_addr();
    let app = router(state);

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// TwiML telling the carrier to stream this call's audio to us.
async fn voice_handler(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<CallParams>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let body = match params.payer_id.as_deref().map(str::trim) {
        Some(payer_id) if !payer_id.is_empty() => {
            let host = state
                .config
                .public_host()
                .map(str::to_string)
                .or_else(|| {
                    headers
                        .get(header::HOST)
                        .and_then(|h| h.to_str().ok())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("localhost:{}", state.config.gateway_port()));

            match stream_url(&host, payer_id) {
                Ok(url) => {
                    info!(payer_id, "Voice webhook connecting media stream");
                    twiml::connect_stream(&url, payer_id)
                }
                Err(e) => {
                    warn!(payer_id, %host, error = %e, "Could not build media stream URL");
                    twiml::say_and_hangup("Sorry, we are unable to take this call right now. Goodbye.")
                }
            }
        }
        _ => {
            warn!("Voice webhook called without a payer id");
            twiml::say_and_hangup("Sorry, this call could not be connected. Goodbye.")
        }
    };

    ([(header::CONTENT_TYPE, "text/xml")], body)
}

/// `wss://{host}/collect-iq/media-stream?payerId=...`, query-encoded.
pub fn stream_url(host: &str, payer_id: &str) -> anyhow::Result<String> {
    let base = format!("wss://{host}{MEDIA_STREAM_PATH}");
    let url = reqwest::Url::parse_with_params(&base, &[("payerId", payer_id)])?;
    Ok(url.to_string())
}

async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<CallParams>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_media_stream(state, socket, params.payer_id))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");

    axum::Json(json!({
        "status": "ok",
        "version": version,
        "active_calls": state.active_calls(),
        "total_calls": state.total_calls(),
    }))
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (axum::http::StatusCode::OK, handle.render()),
        None => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c; shutting down");
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url_encodes_payer() {
        assert_eq!(
            stream_url("voice.example.com", "1003").unwrap(),
            "wss://voice.example.com/collect-iq/media-stream?payerId=1003"
        );
        let url = stream_url("voice.example.com", "a b&c").unwrap();
        assert!(url.ends_with("payerId=a+b%26c"));
    }

    #[test]
    fn test_stream_url_rejects_bad_host() {
        assert!(stream_url("bad host/", "1").is_err());
    }
}
