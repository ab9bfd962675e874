//! [`ParaboxConnection`] over a OneBot 11 forward WebSocket.
//!
//! The transport is owned by a [`Runtime`] created at init time. Every
//! (re)connect bumps a generation counter; reconnect requests carry the
//! generation they were raised for and are dropped once it is stale, so
//! several triggers for the same outage cause a single reconnect.

use std::{
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    parabox_common::time::secs_to_ms,
    parabox_extension::{
        ConnectionContext, ConnectionStatus, Error as ExtError, LifecycleEvent, ParaboxConnection,
        Result as ExtResult, Watchdog,
    },
    parabox_message::{
        BasicInfo, Chat, ChatType, Contact, ForwardNode, ReceiveMessage, ResourceInfo,
        SendMessage,
    },
    serde::{Deserialize, de::DeserializeOwned},
    serde_json::{Value, json},
    tokio::sync::{RwLock, mpsc},
    tracing::{debug, info, warn},
};

use crate::{
    client::{Inbound, OneBotClient},
    compat::CompatibilityUtil,
    config::OneBotConfig,
    error::{Error, Result},
    event::{Event, MessageEvent, MetaEvent},
    segment::{self, MessagePayload, Segment},
};

pub const RECONNECT_GRACE: Duration = Duration::from_secs(5);
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(60);
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(10);

const AVATAR_SIZE: u32 = 100;

/// Delays used by the liveness logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Wait after a `disable` event or a dropped socket before reconnecting.
    pub reconnect_grace: Duration,
    /// Longest silence between liveness signals before a forced reconnect.
    pub liveness_window: Duration,
    pub action_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            reconnect_grace: RECONNECT_GRACE,
            liveness_window: LIVENESS_WINDOW,
            action_timeout: ACTION_TIMEOUT,
        }
    }
}

#[derive(Debug)]
enum Control {
    Reconnect { generation: u64, reason: String },
}

struct Runtime {
    ctx: ConnectionContext,
    config: OneBotConfig,
    compat: CompatibilityUtil,
    timings: Timings,
    control: mpsc::UnboundedSender<Control>,
    watchdog: Watchdog,
    generation: Arc<AtomicU64>,
    client: RwLock<Option<Arc<OneBotClient>>>,
}

impl Runtime {
    fn new(
        ctx: ConnectionContext,
        config: OneBotConfig,
        timings: Timings,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Control>) {
        let (control, control_rx) = mpsc::unbounded_channel();
        let generation = Arc::new(AtomicU64::new(0));
        let watchdog = {
            let control = control.clone();
            let generation = Arc::clone(&generation);
            Watchdog::new(timings.liveness_window, move || {
                let _ = control.send(Control::Reconnect {
                    generation: generation.load(Ordering::SeqCst),
                    reason: "no liveness signal".into(),
                });
            })
        };
        let runtime = Self {
            compat: CompatibilityUtil::new(config.compatibility_mode),
            ctx,
            config,
            timings,
            control,
            watchdog,
            generation,
            client: RwLock::new(None),
        };
        (Arc::new(runtime), control_rx)
    }

    fn connection_id(&self) -> i64 {
        self.ctx.connection_id
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Open a fresh transport and start pumping its events.
    async fn establish(self: &Arc<Self>) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let tasks = self.ctx.supervisor.child();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let client = OneBotClient::connect(
            &self.config,
            tasks.clone(),
            inbound_tx,
            self.timings.action_timeout,
        )
        .await?;

        let runtime = Arc::clone(self);
        tasks.spawn(runtime.pump(generation, inbound_rx));
        *self.client.write().await = Some(Arc::new(client));
        info!(
            connection_id = self.connection_id(),
            generation, "onebot transport established"
        );
        Ok(())
    }

    /// Drop the transport for good: pending reconnects go stale and the
    /// watchdog stops.
    async fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.watchdog.disarm();
        self.close_client().await;
    }

    async fn close_client(&self) {
        let client = self.client.write().await.take();
        if let Some(client) = client {
            client.close().await;
        }
    }

    async fn client(&self) -> Result<Arc<OneBotClient>> {
        self.client
            .read()
            .await
            .as_ref()
            .filter(|client| client.is_connected())
            .cloned()
            .ok_or(Error::NotConnected)
    }

    async fn pump(self: Arc<Self>, generation: u64, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(item) = inbound.recv().await {
            match item {
                Inbound::Event(Event::MetaEvent(meta)) => self.on_meta(generation, meta),
                Inbound::Event(Event::Message(message)) => {
                    let runtime = Arc::clone(&self);
                    self.ctx.supervisor.spawn(async move {
                        runtime.deliver(message).await;
                    });
                },
                Inbound::Event(Event::Other) => {},
                Inbound::Closed(reason) => {
                    self.ctx
                        .update_status(ConnectionStatus::error(format!("connection closed: {reason}")));
                    if self.config.auto_reconnect {
                        self.schedule_reconnect(generation, reason);
                    }
                    break;
                },
            }
        }
    }

    fn on_meta(&self, generation: u64, meta: MetaEvent) {
        match meta {
            MetaEvent::Lifecycle { sub_type } => match sub_type.as_str() {
                "connect" => {
                    self.ctx.update_status(ConnectionStatus::Active);
                    if self.config.auto_reconnect {
                        self.watchdog.arm();
                    }
                },
                "disable" => {
                    self.ctx
                        .update_status(ConnectionStatus::error("OneBot disabled"));
                    if self.config.auto_reconnect {
                        self.schedule_reconnect(generation, "OneBot disabled");
                    }
                },
                other => debug!(
                    connection_id = self.connection_id(),
                    sub_type = other,
                    "onebot lifecycle event"
                ),
            },
            MetaEvent::Heartbeat { .. } => {
                if self.config.auto_reconnect {
                    self.watchdog.arm();
                }
            },
            MetaEvent::Other => {},
        }
    }

    fn schedule_reconnect(&self, generation: u64, reason: impl Into<String>) {
        let reason = reason.into();
        let grace = self.timings.reconnect_grace;
        info!(
            connection_id = self.connection_id(),
            grace_ms = grace.as_millis() as u64,
            reason = %reason,
            "onebot reconnect scheduled"
        );
        let control = self.control.clone();
        self.ctx.supervisor.spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = control.send(Control::Reconnect { generation, reason });
        });
    }

    /// Serializes reconnects for the lifetime of the connection.
    async fn control_loop(self: Arc<Self>, mut control: mpsc::UnboundedReceiver<Control>) {
        while let Some(command) = control.recv().await {
            match command {
                Control::Reconnect { generation, reason } => {
                    if generation != self.current_generation() {
                        debug!(
                            connection_id = self.connection_id(),
                            generation, "stale reconnect request dropped"
                        );
                        continue;
                    }
                    info!(
                        connection_id = self.connection_id(),
                        reason = %reason,
                        "onebot reconnecting"
                    );
                    self.reconnect().await;
                },
            }
        }
    }

    async fn reconnect(self: &Arc<Self>) {
        self.watchdog.disarm();
        self.close_client().await;
        self.ctx.update_status(ConnectionStatus::Activating);
        if let Err(e) = self.establish().await {
            warn!(
                connection_id = self.connection_id(),
                error = %e,
                "onebot reconnect failed"
            );
            self.ctx.update_status(ConnectionStatus::error(e.to_string()));
            self.schedule_reconnect(self.current_generation(), e.to_string());
        }
    }

    async fn deliver(&self, event: MessageEvent) {
        let Some(message) = event.into_receive_message() else {
            debug!(
                connection_id = self.connection_id(),
                "onebot message without a known chat dropped"
            );
            return;
        };
        let uuid = message.uuid.clone();
        if let Err(e) = self.ctx.bridge.receive_message(message).await {
            warn!(
                connection_id = self.connection_id(),
                uuid = %uuid,
                error = %e,
                "failed to deliver onebot message"
            );
        }
    }
}

#[derive(Debug, Deserialize)]
struct FriendInfo {
    user_id: i64,
    #[serde(default)]
    nickname: String,
}

#[derive(Debug, Deserialize)]
struct GroupInfo {
    group_id: i64,
    #[serde(default)]
    group_name: String,
}

#[derive(Debug, Deserialize)]
struct StrangerInfo {
    #[serde(default)]
    nickname: String,
}

#[derive(Debug, Deserialize)]
struct ForwardContent {
    #[serde(default, alias = "messages")]
    message: MessagePayload,
}

/// A OneBot 11 connection. One instance serves one configured account.
pub struct OneBotConnection {
    timings: Timings,
    runtime: StdMutex<Option<Arc<Runtime>>>,
}

impl Default for OneBotConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl OneBotConnection {
    pub fn new() -> Self {
        Self::with_timings(Timings::default())
    }

    pub fn with_timings(timings: Timings) -> Self {
        Self {
            timings,
            runtime: StdMutex::new(None),
        }
    }

    fn runtime(&self) -> ExtResult<Arc<Runtime>> {
        self.runtime
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| ExtError::unavailable("onebot connection is not initialized"))
    }

    async fn call<T: DeserializeOwned>(&self, action: &str, params: Value) -> ExtResult<T> {
        let client = self.runtime()?.client().await?;
        let data = client.call(action, params).await?;
        Ok(serde_json::from_value(data)?)
    }
}

fn numeric_id(uid: &str) -> ExtResult<i64> {
    uid.parse()
        .map_err(|_| ExtError::invalid_input(format!("not a numeric OneBot id: {uid}")))
}

/// Message ids are numbers in OneBot 11, but some implementations use strings.
fn message_id_param(id: &str) -> Value {
    id.parse::<i64>().map(Value::from).unwrap_or_else(|_| json!(id))
}

fn avatar(url: Option<String>) -> ResourceInfo {
    url.map(ResourceInfo::url).unwrap_or_default()
}

#[async_trait]
impl ParaboxConnection for OneBotConnection {
    async fn initialize(&self, ctx: ConnectionContext) -> ExtResult<bool> {
        let config = match OneBotConfig::from_connection_config(&ctx.config) {
            Ok(config) => config,
            Err(e) => {
                warn!(connection_id = ctx.connection_id, error = %e, "onebot config incomplete");
                ctx.update_status(ConnectionStatus::error(e.to_string()));
                return Ok(false);
            },
        };
        debug!(connection_id = ctx.connection_id, config = ?config, "initializing onebot");

        let (runtime, control_rx) = Runtime::new(ctx.clone(), config, self.timings);
        *self.runtime.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&runtime));
        ctx.supervisor
            .spawn(Arc::clone(&runtime).control_loop(control_rx));

        if let Err(e) = runtime.establish().await {
            warn!(connection_id = ctx.connection_id, error = %e, "onebot connect failed");
            ctx.update_status(ConnectionStatus::error(e.to_string()));
            if !runtime.config.auto_reconnect {
                return Err(e.into());
            }
            runtime.schedule_reconnect(runtime.current_generation(), e.to_string());
        }
        Ok(true)
    }

    async fn send_message(&self, message: SendMessage) -> ExtResult<()> {
        let segments: Vec<Segment> = message
            .contents
            .iter()
            .filter_map(segment::from_element)
            .collect();
        if segments.is_empty() {
            return Err(ExtError::invalid_input("no content OneBot can send"));
        }

        let (action, params) = match message.chat.chat_type {
            ChatType::Group => (
                "send_group_msg",
                json!({ "group_id": numeric_id(&message.chat.uid)?, "message": segments }),
            ),
            ChatType::Private => (
                "send_private_msg",
                json!({ "user_id": numeric_id(&message.chat.uid)?, "message": segments }),
            ),
            ChatType::Other => {
                return Err(ExtError::invalid_input(
                    "OneBot only sends to groups and private chats",
                ));
            },
        };

        let data: Value = self.call(action, params).await?;
        debug!(
            uuid = %message.uuid,
            action,
            message_id = %data["message_id"],
            "onebot message sent"
        );
        Ok(())
    }

    async fn recall_message(&self, uuid: &str) -> ExtResult<()> {
        let _: Value = self
            .call("delete_msg", json!({ "message_id": message_id_param(uuid) }))
            .await?;
        Ok(())
    }

    async fn contacts(&self) -> ExtResult<Vec<Contact>> {
        let compat = self.runtime()?.compat;
        let friends: Vec<FriendInfo> = self.call("get_friend_list", json!({})).await?;
        Ok(friends
            .into_iter()
            .map(|friend| {
                Contact::new(friend.user_id.to_string(), BasicInfo {
                    name: Some(friend.nickname),
                    avatar: avatar(compat.user_avatar(friend.user_id, AVATAR_SIZE)),
                })
            })
            .collect())
    }

    async fn chats(&self) -> ExtResult<Vec<Chat>> {
        let compat = self.runtime()?.compat;
        let groups: Vec<GroupInfo> = self.call("get_group_list", json!({})).await?;
        Ok(groups
            .into_iter()
            .map(|group| {
                Chat::new(group.group_id.to_string(), ChatType::Group, BasicInfo {
                    name: Some(group.group_name),
                    avatar: avatar(compat.group_avatar(group.group_id, AVATAR_SIZE)),
                })
            })
            .collect())
    }

    async fn message_history(&self, uuid: &str) -> ExtResult<Vec<ReceiveMessage>> {
        let record: MessageEvent = self
            .call("get_msg", json!({ "message_id": message_id_param(uuid) }))
            .await?;
        Ok(record.into_receive_message().into_iter().collect())
    }

    async fn group_basic_info(&self, group_id: &str) -> ExtResult<Option<BasicInfo>> {
        let runtime = self.runtime()?;
        let Ok(client) = runtime.client().await else {
            return Ok(None);
        };
        let id = numeric_id(group_id)?;
        let data = client
            .call("get_group_info", json!({ "group_id": id, "no_cache": false }))
            .await?;
        let info: GroupInfo = serde_json::from_value(data)?;
        Ok(Some(BasicInfo {
            name: Some(info.group_name),
            avatar: avatar(runtime.compat.group_avatar(id, AVATAR_SIZE)),
        }))
    }

    async fn user_basic_info(&self, user_id: &str) -> ExtResult<Option<BasicInfo>> {
        let runtime = self.runtime()?;
        let Ok(client) = runtime.client().await else {
            return Ok(None);
        };
        let id = numeric_id(user_id)?;
        let data = client
            .call("get_stranger_info", json!({ "user_id": id, "no_cache": false }))
            .await?;
        let info: StrangerInfo = serde_json::from_value(data)?;
        Ok(Some(BasicInfo {
            name: Some(info.nickname),
            avatar: avatar(runtime.compat.user_avatar(id, AVATAR_SIZE)),
        }))
    }

    async fn forward_node(&self, id: &str) -> ExtResult<Option<ForwardNode>> {
        let runtime = self.runtime()?;
        let Ok(client) = runtime.client().await else {
            return Ok(None);
        };
        // The enclosing message is optional context; plenty of backends
        // cannot look a forward id up with get_msg.
        let record = client
            .call("get_msg", json!({ "message_id": message_id_param(id) }))
            .await
            .ok()
            .and_then(|data| serde_json::from_value::<MessageEvent>(data).ok());
        let data = client.call("get_forward_msg", json!({ "id": id })).await?;
        let content: ForwardContent = serde_json::from_value(data)?;

        Ok(Some(ForwardNode {
            sender: record.as_ref().and_then(MessageEvent::sender_contact),
            timestamp: record.as_ref().map(|r| secs_to_ms(r.time)),
            id: Some(id.to_string()),
            messages: segment::to_elements(&content.message),
        }))
    }

    fn on_lifecycle(&self, event: LifecycleEvent) {
        if event != LifecycleEvent::Destroy {
            return;
        }
        let Ok(runtime) = self.runtime() else {
            return;
        };
        let task = Arc::clone(&runtime);
        runtime.ctx.supervisor.spawn(async move {
            task.stop().await;
            info!(connection_id = task.connection_id(), "onebot sockets closed on destroy");
        });
    }

    async fn teardown(&self) {
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(runtime) = runtime {
            runtime.stop().await;
            info!(connection_id = runtime.connection_id(), "onebot connection closed");
        }
    }
}
