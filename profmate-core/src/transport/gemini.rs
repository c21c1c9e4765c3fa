//! Gemini Live over a tokio-tungstenite WebSocket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use super::{
    protocol::{ClientMessage, ServerMessage, SetupRequest},
    ChannelConnector, LiveChannel,
};
use crate::{
    codec::MediaBlob,
    error::{Result, TutorError},
};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Connects to the Gemini Live bidirectional endpoint with an API key.
#[derive(Clone)]
pub struct GeminiConnector {
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConnector")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiConnector {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT, api_key)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self) -> String {
        let sep = if self.endpoint.contains('?') { '&' } else { '?' };
        format!("{}{sep}key={}", self.endpoint, self.api_key)
    }
}

#[async_trait]
impl ChannelConnector for GeminiConnector {
    async fn open(&self, setup: &SetupRequest) -> Result<Arc<dyn LiveChannel>> {
        let request = self
            .url()
            .into_client_request()
            .map_err(|e| TutorError::channel(format!("invalid endpoint: {e}")))?;
        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| TutorError::channel(format!("websocket connect: {e}")))?;
        info!(endpoint = %self.endpoint, model = %setup.model, "live channel connected");

        let (sink, source) = ws.split();
        let channel = GeminiChannel {
            open: AtomicBool::new(true),
            sink: Mutex::new(sink),
            source: Mutex::new(source),
        };

        channel.send(&ClientMessage::from(setup)).await?;
        channel.await_setup_complete().await?;
        info!(voice = %setup.voice_name, "live session setup acknowledged");

        Ok(Arc::new(channel))
    }
}

/// One open Gemini Live WebSocket.
struct GeminiChannel {
    open: AtomicBool,
    sink: Mutex<WsSink>,
    source: Mutex<WsSource>,
}

impl GeminiChannel {
    async fn send(&self, msg: &ClientMessage) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TutorError::ChannelClosed);
        }
        let text = serde_json::to_string(msg)?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.into())).await.map_err(|e| {
            self.open.store(false, Ordering::Release);
            TutorError::channel(format!("send: {e}"))
        })
    }

    /// Read until `setupComplete`. Anything before it is discarded.
    async fn await_setup_complete(&self) -> Result<()> {
        loop {
            match self.next_message().await {
                Some(Ok(msg)) if msg.is_setup_complete() => return Ok(()),
                Some(Ok(_)) => debug!("ignoring message received before setup completed"),
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(TutorError::channel(
                        "endpoint closed the connection during setup",
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl LiveChannel for GeminiChannel {
    async fn send_realtime_input(&self, blob: MediaBlob) -> Result<()> {
        self.send(&ClientMessage::realtime_audio(blob)).await
    }

    async fn next_message(&self) -> Option<Result<ServerMessage>> {
        let mut source = self.source.lock().await;
        loop {
            let raw = match source.next().await {
                Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(e) => {
                        return Some(Err(TutorError::Protocol(format!(
                            "binary frame is not utf-8: {e}"
                        ))))
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "endpoint closed the live channel");
                    self.open.store(false, Ordering::Release);
                    return None;
                }
                // Ping/pong are answered by tungstenite.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.open.store(false, Ordering::Release);
                    return Some(Err(TutorError::channel(format!("receive: {e}"))));
                }
                None => {
                    self.open.store(false, Ordering::Release);
                    return None;
                }
            };

            return Some(ServerMessage::parse(&raw).map_err(|e| {
                warn!("unparseable server message: {e}");
                TutorError::Protocol(e.to_string())
            }));
        }
    }

    async fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let mut sink = self.sink.lock().await;
        match sink.close().await {
            Ok(()) => {
                debug!("live channel closed");
                Ok(())
            }
            Err(e) => Err(TutorError::channel(format!("close: {e}"))),
        }
    }
}
