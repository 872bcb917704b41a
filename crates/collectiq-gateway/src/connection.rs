//! Media-stream websocket lifecycle: read/write loops around one call session.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use collectiq_media::twilio::CarrierEvent;

use crate::session::CallSession;
use crate::sink::{CarrierSink, SinkMessage};
use crate::state::GatewayState;

/// How long the writer may take to flush after the session finishes.
const WRITER_DRAIN: Duration = Duration::from_secs(2);

/// Handle one carrier media-stream connection until the call ends.
pub async fn handle_media_stream(
    state: Arc<GatewayState>,
    socket: WebSocket,
    payer_id: Option<String>,
) {
    let _active = state.call_started();
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, payer_id = ?payer_id, "Media stream connected");

    let (mut ws_tx, ws_rx) = socket.split();
    let (sink, mut out_rx) = CarrierSink::channel();

    let writer_sink = sink.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match msg {
                SinkMessage::Frame(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        debug!("Carrier socket write failed");
                        break;
                    }
                }
                SinkMessage::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        writer_sink.mark_closed();
    });

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let session = CallSession::new(state.services.clone(), sink.clone(), payer_id);
    let mut session_task = tokio::spawn(session.run(event_rx));

    let outcome = tokio::select! {
        _ = read_carrier_events(ws_rx, event_tx) => (&mut session_task).await,
        outcome = &mut session_task => outcome,
    };

    sink.close();
    drop(sink);
    if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
        debug!(conn_id = %conn_id, "Carrier writer did not drain in time");
    }

    match outcome {
        Ok(outcome) => info!(conn_id = %conn_id, outcome = outcome.as_str(), "Media stream closed"),
        Err(e) => warn!(conn_id = %conn_id, error = %e, "Call session task failed"),
    }
}

/// Parse inbound frames into carrier events until the socket closes.
async fn read_carrier_events(
    mut ws_rx: SplitStream<WebSocket>,
    event_tx: mpsc::UnboundedSender<CarrierEvent>,
) {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match CarrierEvent::parse(text.as_str()) {
                Ok(event) => {
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Unparseable carrier frame");
                }
            },
            Ok(Message::Close(frame)) => {
                debug!(?frame, "Carrier closed the media stream");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Carrier socket error");
                break;
            }
        }
    }
}
