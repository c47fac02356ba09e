//! WebSocket Server
//!
//! One [`Notifier`] per connection. Responses and subscription pushes
//! share the socket writer; every response written releases events held
//! back by the notifier.

use crate::{
    http_server::{JsonRpcRequest, JsonRpcResponse},
    methods::{dispatch_method, RpcContext},
};
use async_trait::async_trait;
use futures::{stream::SplitSink, SinkExt, Stream, StreamExt};
use notifier::{EventSink, Notifier, NotifierConfig};
use serde_json::Value;
use std::sync::Arc;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Mutex,
};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tokio_util::sync::CancellationToken;

type SocketWriter = Arc<Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>>;

/// JSON-RPC parse error code
const PARSE_ERROR: i32 = -32700;

/// Notifier sink writing text frames to the socket
struct SocketSink {
    writer: SocketWriter,
}

#[async_trait]
impl EventSink for SocketSink {
    async fn send(&self, payload: String) -> anyhow::Result<()> {
        self.writer.lock().await.send(Message::Text(payload)).await?;
        Ok(())
    }
}

/// WebSocket Server
pub struct WebSocketServer {
    context: Arc<RpcContext>,
    notifier_config: NotifierConfig,
}

impl WebSocketServer {
    /// Create a new WebSocket server
    pub fn new(context: Arc<RpcContext>, notifier_config: NotifierConfig) -> Self {
        Self {
            context,
            notifier_config,
        }
    }

    /// Run the WebSocket server
    pub async fn run(self, addr: &str, token: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("WebSocket server listening on {}", addr);
        self.serve(listener, token).await
    }

    /// Accept connections on `listener` until `token` is cancelled.
    ///
    /// Every connection runs under a child of `token`.
    pub async fn serve(self, listener: TcpListener, token: CancellationToken) -> anyhow::Result<()> {
        loop {
            let (stream, peer_addr) = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let context = self.context.clone();
            let connection = token.child_token();
            let config = self.notifier_config.clone();

            tokio::spawn(async move {
                tracing::debug!("WebSocket connection from {}", peer_addr);
                if let Err(e) = handle_connection(stream, context, connection, config).await {
                    tracing::warn!("WebSocket connection error from {}: {}", peer_addr, e);
                }
            });
        }

        Ok(())
    }
}

/// Handle a single WebSocket connection
async fn handle_connection(
    stream: TcpStream,
    context: Arc<RpcContext>,
    connection: CancellationToken,
    config: NotifierConfig,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (ws_sender, mut ws_receiver) = ws_stream.split();
    let writer: SocketWriter = Arc::new(Mutex::new(ws_sender));

    let closer = connection.clone();
    let notifier = Notifier::new(
        &connection,
        Arc::new(SocketSink {
            writer: writer.clone(),
        }),
        move || closer.cancel(),
        config,
    );
    tokio::spawn(notifier.clone().run());

    let result = serve_requests(&context, &notifier, &writer, &mut ws_receiver, &connection).await;

    // Tears down the notifier and every subscription it owns
    connection.cancel();
    result
}

async fn serve_requests<S>(
    context: &RpcContext,
    notifier: &Arc<Notifier>,
    writer: &SocketWriter,
    ws_receiver: &mut S,
    connection: &CancellationToken,
) -> anyhow::Result<()>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::select! {
            biased;
            _ = connection.cancelled() => return Ok(()),
            msg = ws_receiver.next() => msg,
        };

        let text = match msg {
            None => return Ok(()),
            Some(msg) => match msg? {
                Message::Text(text) => text,
                Message::Close(_) => return Ok(()),
                _ => continue,
            },
        };

        let response = match serde_json::from_str::<JsonRpcRequest>(&text) {
            Ok(request) => {
                let result =
                    dispatch_method(context, &request.method, request.params, Some(notifier)).await;
                JsonRpcResponse::new(request.id, result)
            }
            Err(e) => JsonRpcResponse::error(Value::Null, PARSE_ERROR, format!("Parse error: {}", e)),
        };

        let payload = serde_json::to_string(&response)?;
        writer.lock().await.send(Message::Text(payload)).await?;
        notifier.response_sent();
    }
}
