//! Message-level DevTools client over one browser websocket.
//!
//! Commands are correlated with responses by id through a pending map; events
//! fan out to subscribers on a bounded broadcast channel. Events that must
//! never be lost (paused requests) go to per-method unbounded listeners
//! instead. Target sessions share the browser connection in flattened mode
//! and are addressed by `sessionId`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{CdpError, CdpResult};

const EVENT_CAPACITY: usize = 1024;

/// An unsolicited protocol notification.
#[derive(Debug, Clone, PartialEq)]
pub struct CdpEvent {
    pub method: String,
    pub session_id: Option<String>,
    pub params: Value,
}

impl CdpEvent {
    pub fn is(&self, method: &str, session_id: &str) -> bool {
        self.method == method && self.session_id.as_deref() == Some(session_id)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response {
        id: u64,
        result: Result<Value, RemoteError>,
    },
    Event(CdpEvent),
}

#[derive(Deserialize)]
struct RawInbound {
    id: Option<u64>,
    method: Option<String>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    #[serde(default)]
    params: Value,
    result: Option<Value>,
    error: Option<RemoteError>,
}

pub fn decode(text: &str) -> CdpResult<Inbound> {
    let raw: RawInbound = serde_json::from_str(text)?;
    match (raw.id, raw.method) {
        (Some(id), _) => Ok(Inbound::Response {
            id,
            result: match raw.error {
                Some(e) => Err(e),
                None => Ok(raw.result.unwrap_or(Value::Null)),
            },
        }),
        (None, Some(method)) => Ok(Inbound::Event(CdpEvent {
            method,
            session_id: raw.session_id,
            params: raw.params,
        })),
        (None, None) => Err(CdpError::MissingField {
            method: "inbound frame".to_string(),
            field: "id or method",
        }),
    }
}

pub fn encode(id: u64, method: &str, params: Value, session_id: Option<&str>) -> String {
    let mut frame = json!({ "id": id, "method": method, "params": params });
    if let Some(session) = session_id {
        frame["sessionId"] = Value::String(session.to_string());
    }
    frame.to_string()
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, RemoteError>>>>>;
type Listeners = Arc<Mutex<Vec<(String, mpsc::UnboundedSender<CdpEvent>)>>>;

pub struct CdpConnection {
    outgoing: mpsc::UnboundedSender<String>,
    pending: Pending,
    events: broadcast::Sender<CdpEvent>,
    listeners: Listeners,
    next_id: AtomicU64,
    command_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str, command_timeout: Duration) -> CdpResult<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(ws_url).await?;
        let (mut sink, mut source) = stream.split();

        let (outgoing, mut queue) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            while let Some(frame) = queue.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    tracing::debug!(error = %e, "devtools write failed");
                    break;
                }
            }
        });

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let listeners: Listeners = Arc::new(Mutex::new(Vec::new()));

        let reader_pending = pending.clone();
        let reader_events = events.clone();
        let reader_listeners = listeners.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!(error = %e, "devtools read failed");
                        break;
                    }
                };
                match decode(&text) {
                    Ok(Inbound::Response { id, result }) => {
                        if let Some(tx) = reader_pending.lock().await.remove(&id) {
                            let _ = tx.send(result);
                        }
                    }
                    Ok(Inbound::Event(event)) => {
                        reader_listeners.lock().await.retain(|(method, tx)| {
                            *method != event.method || tx.send(event.clone()).is_ok()
                        });
                        // No subscribers is fine.
                        let _ = reader_events.send(event);
                    }
                    Err(e) => tracing::warn!(error = %e, "undecodable devtools frame"),
                }
            }
            // Dropping the senders fails every in-flight command with Closed
            // and ends every listener.
            reader_pending.lock().await.clear();
            reader_listeners.lock().await.clear();
        });

        Ok(Self {
            outgoing,
            pending,
            events,
            listeners,
            next_id: AtomicU64::new(1),
            command_timeout,
            tasks: vec![writer, reader],
        })
    }

    /// Subscribe before issuing the command whose events you need.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Every future event named `method`, unbounded and in arrival order.
    /// Dropping the receiver unregisters it.
    pub async fn listen(&self, method: &str) -> mpsc::UnboundedReceiver<CdpEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().await.push((method.to_string(), tx));
        rx
    }

    /// Queue a command without waiting for its response.
    pub fn dispatch(&self, method: &str, params: Value, session_id: Option<&str>) -> CdpResult<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.outgoing
            .send(encode(id, method, params, session_id))
            .map_err(|_| CdpError::Closed)
    }

    pub async fn send(&self, method: &str, params: Value, session_id: Option<&str>) -> CdpResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.outgoing.send(encode(id, method, params, session_id)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(CdpError::Closed);
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(remote))) => Err(CdpError::Remote {
                method: method.to_string(),
                code: remote.code,
                message: remote.message,
            }),
            Ok(Err(_)) => Err(CdpError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(CdpError::Timeout {
                    method: method.to_string(),
                    limit_ms: self.command_timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_response() {
        let inbound = decode(r#"{"id":7,"result":{"frameId":"F1","loaderId":"L1"}}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Response {
                id: 7,
                result: Ok(json!({"frameId": "F1", "loaderId": "L1"})),
            }
        );
    }

    #[test]
    fn test_decode_error_response() {
        let inbound = decode(r#"{"id":3,"error":{"code":-32000,"message":"No target with given id"}}"#).unwrap();
        match inbound {
            Inbound::Response { id, result: Err(e) } => {
                assert_eq!(id, 3);
                assert_eq!(e.code, -32000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_session_event() {
        let inbound = decode(
            r#"{"method":"Page.lifecycleEvent","sessionId":"S1","params":{"name":"load","loaderId":"L1"}}"#,
        )
        .unwrap();
        match inbound {
            Inbound::Event(event) => {
                assert!(event.is("Page.lifecycleEvent", "S1"));
                assert!(!event.is("Page.lifecycleEvent", "S2"));
                assert_eq!(event.params["name"], "load");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_unaddressed_frame() {
        assert!(decode(r#"{"params":{}}"#).is_err());
        assert!(decode("not json").is_err());
    }

    #[test]
    fn test_encode_with_and_without_session() {
        let browser: Value = serde_json::from_str(&encode(1, "Target.createTarget", json!({"url": "about:blank"}), None)).unwrap();
        assert_eq!(browser["id"], 1);
        assert!(browser.get("sessionId").is_none());

        let page: Value = serde_json::from_str(&encode(2, "Page.enable", json!({}), Some("S1"))).unwrap();
        assert_eq!(page["sessionId"], "S1");
        assert_eq!(page["method"], "Page.enable");
    }
}
