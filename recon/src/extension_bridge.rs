use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

use crate::ReconError;

pub const DEFAULT_WS_ADDR: &str = "127.0.0.1:17373";

type BridgeResult = Result<serde_json::Value, String>;
type PendingMap = HashMap<String, oneshot::Sender<BridgeResult>>;
type Pending = Arc<Mutex<PendingMap>>;
type Clients = Arc<Mutex<Vec<Client>>>;

#[derive(Debug, Serialize, Deserialize)]
struct EvalRequest {
    id: String,
    action: String,
    code: String,
    #[serde(default)]
    await_promise: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum BridgeIncoming {
    EvalResult {
        id: String,
        ok: bool,
        result: Option<serde_json::Value>,
        error: Option<String>,
    },
    Typed(TypedIncoming),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum TypedIncoming {
    #[serde(rename = "hello")]
    Hello { from: Option<String> },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "console_event")]
    ConsoleEvent {
        level: Option<String>,
        args: Option<serde_json::Value>,
    },
    #[serde(rename = "exception_event")]
    ExceptionEvent { details: Option<serde_json::Value> },
}

struct Client {
    sender: mpsc::UnboundedSender<Message>,
}

/// WebSocket server the browser extension connects to. Scripts are sent to
/// the first connected client and evaluated in its active tab.
pub struct ExtensionBridge {
    _server_task: JoinHandle<()>,
    local_addr: SocketAddr,
    clients: Clients,
    pending: Pending,
}

impl ExtensionBridge {
    pub async fn start(addr: &str) -> Result<Arc<ExtensionBridge>, ReconError> {
        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::warn!(%addr, ?e, "Port in use, waiting 2 seconds and retrying once...");
                tokio::time::sleep(Duration::from_secs(2)).await;
                TcpListener::bind(addr).await?
            }
            Err(e) => return Err(e.into()),
        };
        let local_addr = listener.local_addr()?;
        tracing::info!("Recon extension bridge listening on {}", local_addr);

        let clients: Clients = Arc::new(Mutex::new(Vec::new()));
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let server_task = tokio::spawn(accept_loop(listener, clients.clone(), pending.clone()));

        Ok(Arc::new(ExtensionBridge {
            _server_task: server_task,
            local_addr,
            clients,
            pending,
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn is_client_connected(&self) -> bool {
        let mut clients = self.clients.lock().await;
        clients.retain(|c| !c.sender.is_closed());
        !clients.is_empty()
    }

    /// Wait for the extension to connect, polling every 100ms.
    pub async fn wait_for_client(&self, timeout: Duration) -> Result<(), ReconError> {
        let connected =
            crate::utils::wait_for(timeout, Duration::from_millis(100), move || async move {
                Ok::<_, ReconError>(self.is_client_connected().await.then_some(()))
            })
            .await?;
        connected.ok_or_else(|| {
            ReconError::Bridge(format!(
                "no browser extension connected to {} within {:?}",
                self.local_addr, timeout
            ))
        })
    }

    /// Evaluate `code` in the active tab and return its JSON result.
    ///
    /// Transport problems (no client, send failure, timeout) are
    /// [`ReconError::Bridge`]; an exception thrown by the script is
    /// [`ReconError::Script`].
    pub async fn eval(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value, ReconError> {
        let id = Uuid::new_v4().to_string();
        let req = EvalRequest {
            id: id.clone(),
            action: "eval".into(),
            code: code.to_string(),
            await_promise: true,
        };
        let payload = serde_json::to_string(&req)
            .map_err(|e| ReconError::Bridge(format!("bridge serialize: {e}")))?;

        let (tx, rx) = oneshot::channel::<BridgeResult>();
        self.pending.lock().await.insert(id.clone(), tx);

        let sent = {
            let mut clients = self.clients.lock().await;
            clients.retain(|c| !c.sender.is_closed());
            tracing::trace!(clients = clients.len(), preview = %payload.chars().take(120).collect::<String>(), "Sending eval to extension");
            clients
                .first()
                .map(|c| c.sender.send(Message::Text(payload)).is_ok())
        };
        match sent {
            Some(true) => {}
            Some(false) => {
                self.pending.lock().await.remove(&id);
                return Err(ReconError::Bridge(
                    "failed to send eval to the extension".into(),
                ));
            }
            None => {
                self.pending.lock().await.remove(&id);
                return Err(ReconError::Bridge("no browser extension connected".into()));
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(val))) => Ok(val),
            Ok(Ok(Err(err))) => Err(ReconError::Script(err)),
            Ok(Err(_canceled)) => Err(ReconError::Bridge(
                "extension disconnected before replying".into(),
            )),
            Err(_elapsed) => {
                let _ = self.pending.lock().await.remove(&id);
                tracing::warn!("ExtensionBridge: timed out waiting for EvalResult (id={})", id);
                Err(ReconError::Bridge(format!(
                    "timed out after {timeout:?} waiting for the extension"
                )))
            }
        }
    }
}

async fn accept_loop(listener: TcpListener, clients: Clients, pending: Pending) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("ws accept error: {}", e);
                continue;
            }
        };
        let ws_clients = clients.clone();
        let ws_pending = pending.clone();
        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(%peer, "ws handshake error: {}", e);
                    return;
                }
            };
            let (mut sink, mut stream) = ws_stream.split();
            let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

            // writer task
            let writer = tokio::spawn(async move {
                while let Some(msg) = rx.recv().await {
                    if let Err(e) = sink.send(msg).await {
                        tracing::warn!("ws send error: {}", e);
                        break;
                    }
                }
            });

            ws_clients.lock().await.push(Client { sender: tx });

            while let Some(Ok(msg)) = stream.next().await {
                if !msg.is_text() {
                    continue;
                }
                let txt = msg.into_text().unwrap_or_default();
                handle_incoming(&txt, &ws_pending).await;
            }

            // Dropping the writer's receiver closes the client's sender.
            writer.abort();
            tracing::info!(%peer, "Extension disconnected");
        });
    }
}

async fn handle_incoming(txt: &str, pending: &Pending) {
    match serde_json::from_str::<BridgeIncoming>(txt) {
        Ok(BridgeIncoming::EvalResult {
            id,
            ok,
            result,
            error,
        }) => {
            if !ok {
                let head: String = error
                    .as_deref()
                    .unwrap_or("unknown error")
                    .chars()
                    .take(400)
                    .collect();
                tracing::debug!(id = %id, error = %head, "Bridge received EvalResult error");
            }
            if let Some(tx) = pending.lock().await.remove(&id) {
                let _ = tx.send(if ok {
                    Ok(result.unwrap_or(serde_json::Value::Null))
                } else {
                    Err(error.unwrap_or_else(|| "unknown error".into()))
                });
            }
        }
        Ok(BridgeIncoming::Typed(TypedIncoming::ConsoleEvent { level, args })) => {
            let args_str = args.map(|v| v.to_string()).unwrap_or_else(|| "[]".into());
            match level.as_deref().unwrap_or("log") {
                "error" => tracing::error!(args = %args_str, "Console error event"),
                "warning" | "warn" => tracing::warn!(args = %args_str, "Console warn event"),
                _ => tracing::debug!(args = %args_str, "Console event"),
            }
        }
        Ok(BridgeIncoming::Typed(TypedIncoming::ExceptionEvent { details })) => {
            let details_val = details.unwrap_or(serde_json::Value::Null);
            tracing::error!(details = %details_val, "Runtime exception event");
        }
        Ok(BridgeIncoming::Typed(TypedIncoming::Hello { from })) => {
            tracing::info!(from = from.as_deref().unwrap_or("unknown"), "Extension connected");
        }
        Ok(BridgeIncoming::Typed(TypedIncoming::Pong)) => {}
        Err(e) => tracing::warn!("Invalid incoming JSON: {}", e),
    }
}
