use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use futures::SinkExt;
use futures::StreamExt;
use logreplay_protocol::ClientMessage;
use logreplay_protocol::OutputEvent;
use logreplay_protocol::ReplayCompletion;
use logreplay_protocol::ReplayRequest;
use logreplay_protocol::ResultStreamParser;
use logreplay_protocol::ServerMessage;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Submit one replay to the server at `url` and follow it to completion.
///
/// Every streamed event is handed to `on_event` as it arrives; the framed
/// result is reassembled on the way.
pub async fn run_replay<F>(url: &str, request: ReplayRequest, mut on_event: F) -> Result<ReplayCompletion>
where
    F: FnMut(&OutputEvent),
{
    let (ws_stream, _) = connect_async(url)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    debug!(url, "connected");
    let (mut write, mut read) = ws_stream.split();

    let mut parser = ResultStreamParser::new();
    parser.begin();

    let frame = ClientMessage::Replay(request).to_json()?;
    write
        .send(Message::Text(frame.into()))
        .await
        .context("failed to send replay request")?;

    while let Some(msg) = read.next().await {
        match msg.context("connection error")? {
            Message::Text(text) => {
                let ServerMessage::Output(event) = ServerMessage::from_json(text.as_str())
                    .context("server sent an unrecognised frame")?;
                on_event(&event);
                if let Some(completion) = parser.feed(&event) {
                    let _ = write.close().await;
                    return Ok(completion);
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    bail!("server closed the connection before the replay finished")
}
