//! One WebSocket connection: inbound `replay` envelopes in, `output`
//! envelopes out.
//!
//! Requests are queued to a per-connection worker and handled strictly in
//! arrival order, so the output of two replays never interleaves. When the
//! socket goes away the session is dropped at once and queued requests are
//! discarded. A replay that is already running finishes on its own (its
//! events go nowhere) and still cleans up its artifacts.

use async_channel::Receiver;
use async_channel::Sender;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use futures::SinkExt;
use futures::StreamExt;
use logreplay_core::ConnectionId;
use logreplay_core::OutputSink;
use logreplay_core::ReplayOrchestrator;
use logreplay_core::SessionState;
use logreplay_protocol::ClientMessage;
use logreplay_protocol::OutputEvent;
use logreplay_protocol::ReplayRequest;
use logreplay_protocol::ReplayResult;
use logreplay_protocol::ServerMessage;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

const EXIT_TEXT_REJECTED: &str = "Invalid request";

enum Job {
    Replay(ReplayRequest),
    /// An inbound frame that could not be understood.
    Reject(String),
}

pub(crate) async fn handle_socket(socket: WebSocket, orchestrator: ReplayOrchestrator) {
    let connection_id = ConnectionId::new();
    let mut session = SessionState::on_connect(connection_id);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let (sink, rx_event) = OutputSink::channel();
    let (tx_job, rx_job) = async_channel::unbounded::<Job>();
    let (tx_result, rx_result) = async_channel::unbounded::<ReplayResult>();
    tokio::spawn(run_worker(
        connection_id,
        orchestrator,
        rx_job,
        sink,
        tx_result,
    ));

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                let job = match msg {
                    Some(Ok(Message::Text(text))) => match ClientMessage::from_json(text.as_str()) {
                        Ok(ClientMessage::Replay(request)) => Job::Replay(request),
                        Err(err) => {
                            warn!(%connection_id, %err, "malformed frame");
                            Job::Reject(format!("Malformed request: {err}"))
                        }
                    },
                    Some(Ok(Message::Binary(_))) => {
                        Job::Reject("Malformed request: binary frames are not supported".to_string())
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Err(err)) => {
                        warn!(%connection_id, %err, "receive error");
                        break;
                    }
                };
                if tx_job.send(job).await.is_err() {
                    break;
                }
            }

            event = rx_event.recv() => {
                let Ok(event) = event else {
                    break;
                };
                let frame = match ServerMessage::Output(event).to_json() {
                    Ok(frame) => frame,
                    Err(err) => {
                        error!(%connection_id, %err, "failed to encode output event");
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                    debug!(%connection_id, "send failed, closing");
                    break;
                }
            }

            result = rx_result.recv() => {
                if let Ok(result) = result {
                    session.on_replay_complete(result);
                }
            }
        }
    }

    tx_job.close();
    session.on_disconnect();
}

async fn run_worker(
    connection_id: ConnectionId,
    orchestrator: ReplayOrchestrator,
    rx_job: Receiver<Job>,
    sink: OutputSink,
    tx_result: Sender<ReplayResult>,
) {
    while let Ok(job) = rx_job.recv().await {
        if sink.is_closed() {
            debug!(%connection_id, "observer gone, dropping queued requests");
            break;
        }
        match job {
            Job::Replay(request) => {
                info!(
                    %connection_id,
                    log_type = request.log_type.trim(),
                    bytes = request.log_content.len(),
                    "replay started"
                );
                match orchestrator.replay(&request, &sink).await {
                    Ok(result) => {
                        info!(%connection_id, alerts = result.alerts.len(), "replay finished");
                        let _ = tx_result.send(result).await;
                    }
                    Err(err) if err.is_validation() => {
                        info!(%connection_id, %err, "replay rejected");
                    }
                    Err(err) => {
                        error!(%connection_id, %err, "replay failed");
                    }
                }
            }
            Job::Reject(message) => {
                sink.send(OutputEvent::error(message)).await;
                sink.send(OutputEvent::exit(1, EXIT_TEXT_REJECTED)).await;
            }
        }
    }
}
