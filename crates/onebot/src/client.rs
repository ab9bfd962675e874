//! Forward WebSocket transport: one socket task, a writer queue, and
//! echo-correlated action calls.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    futures::{SinkExt, StreamExt},
    parabox_extension::TaskSupervisor,
    serde_json::{Value, json},
    tokio::sync::{Mutex, mpsc, oneshot},
    tokio_tungstenite::tungstenite::{
        Message,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
    },
    tracing::{debug, info, warn},
};

use crate::{
    config::OneBotConfig,
    error::{Error, Result},
    event::{ActionResponse, Event, Frame},
};

/// What the socket task hands to the connection.
#[derive(Debug)]
pub enum Inbound {
    Event(Event),
    /// The socket ended without being closed by us.
    Closed(String),
}

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<ActionResponse>>>>;

pub struct OneBotClient {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    connected: Arc<AtomicBool>,
    action_timeout: Duration,
    tasks: TaskSupervisor,
}

impl OneBotClient {
    /// Open the socket and start its task under `tasks`. Events are pushed
    /// into `inbound` until the socket ends or `tasks` is shut down.
    pub async fn connect(
        config: &OneBotConfig,
        tasks: TaskSupervisor,
        inbound: mpsc::UnboundedSender<Inbound>,
        action_timeout: Duration,
    ) -> Result<Self> {
        let url = config.ws_url()?;
        let mut request = url.as_str().into_client_request()?;
        if let Some(bearer) = config.bearer() {
            let value = HeaderValue::from_str(&bearer)
                .map_err(|e| Error::config(format!("invalid token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        info!(url = %url, "connecting to onebot");
        let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
        let (mut sink, mut source) = stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let heart_interval = config.heart_interval;

        {
            let pending = Arc::clone(&pending);
            let connected = Arc::clone(&connected);
            tasks.spawn(async move {
                let mut ping = tokio::time::interval(heart_interval);
                ping.tick().await;
                let reason = loop {
                    tokio::select! {
                        frame = source.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                dispatch(&text, &pending, &inbound).await;
                            },
                            Some(Ok(Message::Close(frame))) => {
                                break frame
                                    .map(|f| f.reason.to_string())
                                    .filter(|r| !r.is_empty())
                                    .unwrap_or_else(|| "closed by peer".into());
                            },
                            Some(Ok(_)) => {},
                            Some(Err(e)) => break e.to_string(),
                            None => break "connection closed".into(),
                        },
                        Some(message) = outgoing_rx.recv() => {
                            if let Err(e) = sink.send(message).await {
                                break e.to_string();
                            }
                        },
                        _ = ping.tick() => {
                            if let Err(e) = sink.send(Message::Ping(Default::default())).await {
                                break e.to_string();
                            }
                        },
                    }
                };
                connected.store(false, Ordering::SeqCst);
                // Dropping the senders fails every waiting call.
                pending.lock().await.clear();
                warn!(reason = %reason, "onebot socket ended");
                let _ = inbound.send(Inbound::Closed(reason));
            });
        }

        Ok(Self {
            outgoing,
            pending,
            connected,
            action_timeout,
            tasks,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Run one action and return its `data`.
    pub async fn call(&self, action: &str, params: Value) -> Result<Value> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let echo = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(echo.clone(), tx);

        let frame = json!({ "action": action, "params": params, "echo": echo });
        if self.outgoing.send(Message::Text(frame.to_string().into())).is_err() {
            self.pending.lock().await.remove(&echo);
            return Err(Error::NotConnected);
        }
        debug!(action, echo = %echo, "onebot action sent");

        match tokio::time::timeout(self.action_timeout, rx).await {
            Ok(Ok(response)) => response.into_data(action),
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => {
                self.pending.lock().await.remove(&echo);
                Err(Error::Timeout {
                    action: action.to_string(),
                })
            },
        }
    }

    /// Stop the socket task and fail any waiting call. Idempotent.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.tasks.shutdown().await;
        self.pending.lock().await.clear();
    }
}

async fn dispatch(text: &str, pending: &Pending, inbound: &mpsc::UnboundedSender<Inbound>) {
    match Frame::parse(text) {
        Ok(Frame::Response(response)) => {
            let Some(echo) = response.echo() else {
                return;
            };
            match pending.lock().await.remove(&echo) {
                Some(tx) => {
                    let _ = tx.send(response);
                },
                None => debug!(echo = %echo, "response for unknown or expired action"),
            }
        },
        Ok(Frame::Event(event)) => {
            let _ = inbound.send(Inbound::Event(event));
        },
        Err(e) => debug!(error = %e, "unparsable onebot frame"),
    }
}
