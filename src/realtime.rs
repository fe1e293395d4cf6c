use anyhow::{Context, Result};
use futures::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

/// Spawns a background task that connects to the back office's realtime
/// gateway and forwards incoming control events (bulk-operation cancel,
/// manual sync trigger) to the returned receiver. Provide `gateway_url` like
/// "https://backoffice.example.com" and the shared `api_secret`; `topic` is
/// the channel name, e.g. "sync:control".
pub async fn start_control_listener(
    gateway_url: &str,
    api_secret: &str,
    topic: &str,
) -> Result<mpsc::UnboundedReceiver<String>> {
    // Create a channel for forwarding incoming messages
    let (tx, rx) = mpsc::unbounded_channel::<String>();

    // Build the wss URL: convert https://... to wss://... and append path/query
    let mut base = gateway_url.to_string();
    if base.starts_with("https://") {
        base = base.replacen("https://", "wss://", 1);
    } else if base.starts_with("http://") {
        base = base.replacen("http://", "ws://", 1);
    }
    let ws_url = format!(
        "{}/realtime/v1?token={}",
        base.trim_end_matches('/'),
        urlencoding::encode(api_secret)
    );
    let url = Url::parse(&ws_url).context("invalid websocket url")?;
    let topic = topic.to_string();

    // Spawn background task so function returns immediately with receiver
    tokio::spawn(async move {
        match connect_async(url.as_str()).await {
            Ok((ws_stream, _resp)) => {
                tracing::info!("[realtime] connected to control websocket");
                let (mut write, mut read) = ws_stream.split();

                // Subscribe to the control topic
                use futures::SinkExt;
                let join = json!({
                    "topic": topic,
                    "event": "subscribe",
                    "ref": "1"
                });
                if let Err(e) = write.send(Message::Text(join.to_string())).await {
                    tracing::error!("[realtime] failed to send subscribe: {:?}", e);
                    return;
                }

                // Read loop: forward text payloads into tx
                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(Message::Text(txt)) => {
                            // Forward raw JSON text to consumer
                            if tx.send(txt).is_err() {
                                tracing::info!(
                                    "[realtime] consumer dropped, shutting down listener"
                                );
                                break;
                            }
                        }
                        Ok(Message::Ping(_)) => {
                            // Pong is sent automatically by tungstenite; nothing to do
                        }
                        Ok(Message::Pong(_)) => {}
                        Ok(Message::Binary(bin)) => {
                            if let Ok(s) = String::from_utf8(bin) {
                                let _ = tx.send(s);
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            tracing::info!("[realtime] websocket closed: {:?}", frame);
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!("[realtime] websocket error: {:?}", e);
                            break;
                        }
                    }
                }
                tracing::info!("[realtime] read loop ended");
            }
            Err(e) => {
                tracing::error!("[realtime] connect error: {:?}", e);
            }
        }
    });

    Ok(rx)
}
