//! One logical connection and the state machine around its extension instance.
//!
//! ```text
//!            init ok
//! Pending ────────────▶ Active
//!    │ init failed        │ to_pending (teardown, fresh handle)
//!    ▼                    ▼
//! Failed ──to_pending──▶ Pending
//! ```
//!
//! Every transition consumes the old state, so there is never more than one
//! live instance per connection. Teardown is awaited before a transition
//! returns.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use {
    parabox_message::{BasicInfo, Chat, Contact, ForwardNode, ReceiveMessage, SendMessage},
    serde::Serialize,
    tracing::{info, warn},
};

use crate::{
    bridge::{ConnectionContext, ParaboxBridge, ParaboxConnection},
    descriptor::{ExtensionDescriptor, Provenance},
    error::{Error, Result},
    lifecycle::{LifecycleSource, LifecycleSubscription},
    loader::ExtensionLoader,
    status::{ConnectionStatus, StatusChannel, StatusReceiver},
    supervisor::TaskSupervisor,
};

/// Opaque per-connection settings, as written by the setup wizard.
pub type ConnectionConfig = serde_json::Map<String, serde_json::Value>;

const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Persistent identity of a connection. Survives every state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionRecord {
    pub connection_id: i64,
    pub alias: String,
    pub name: String,
    pub config: ConnectionConfig,
    pub descriptor: ExtensionDescriptor,
}

impl ConnectionRecord {
    pub fn descriptor_id(&self) -> &str {
        &self.descriptor.key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Pending,
    Active,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Failed => "failed",
        })
    }
}

/// Host-wide settings every init and call runs under.
#[derive(Clone)]
pub struct HostContext {
    pub lifecycle: LifecycleSource,
    pub init_timeout: Duration,
    pub call_timeout: Duration,
}

impl Default for HostContext {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleSource::new(),
            init_timeout: DEFAULT_INIT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

pub enum Connection {
    Pending(PendingConnection),
    Active(ActiveConnection),
    Failed(FailedConnection),
}

/// A fresh instance that has not been initialized yet.
pub struct PendingConnection {
    record: ConnectionRecord,
    instance: Arc<dyn ParaboxConnection>,
    status: StatusChannel,
}

/// An initialized instance with its background tasks and lifecycle registration.
pub struct ActiveConnection {
    record: ConnectionRecord,
    instance: Arc<dyn ParaboxConnection>,
    supervisor: TaskSupervisor,
    lifecycle: LifecycleSubscription,
    call_timeout: Duration,
    status: StatusChannel,
}

/// No live instance; only the record and why it failed.
pub struct FailedConnection {
    record: ConnectionRecord,
    reason: String,
    status: StatusChannel,
}

impl Connection {
    pub fn pending(record: ConnectionRecord, instance: Arc<dyn ParaboxConnection>) -> Self {
        Self::Pending(PendingConnection {
            record,
            instance,
            status: StatusChannel::new(),
        })
    }

    pub fn failed(record: ConnectionRecord, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let status = StatusChannel::new();
        status.publish(ConnectionStatus::error(reason.clone()));
        Self::Failed(FailedConnection {
            record,
            reason,
            status,
        })
    }

    pub fn state(&self) -> ConnectionState {
        match self {
            Self::Pending(_) => ConnectionState::Pending,
            Self::Active(_) => ConnectionState::Active,
            Self::Failed(_) => ConnectionState::Failed,
        }
    }

    pub fn record(&self) -> &ConnectionRecord {
        match self {
            Self::Pending(c) => &c.record,
            Self::Active(c) => &c.record,
            Self::Failed(c) => &c.record,
        }
    }

    pub fn connection_id(&self) -> i64 {
        self.record().connection_id
    }

    pub fn alias(&self) -> &str {
        &self.record().alias
    }

    pub fn provenance(&self) -> &Provenance {
        &self.record().descriptor.provenance
    }

    /// Same value whatever state the connection is in.
    pub fn to_descriptor(&self) -> ExtensionDescriptor {
        self.record().descriptor.clone()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Failed(c) => Some(&c.reason),
            _ => None,
        }
    }

    fn status_channel_ref(&self) -> &StatusChannel {
        match self {
            Self::Pending(c) => &c.status,
            Self::Active(c) => &c.status,
            Self::Failed(c) => &c.status,
        }
    }

    /// The channel a host bridge for this connection must publish into.
    pub fn status_channel(&self) -> StatusChannel {
        self.status_channel_ref().clone()
    }

    pub fn status(&self) -> StatusReceiver {
        self.status_channel_ref().subscribe()
    }

    pub fn current_status(&self) -> ConnectionStatus {
        self.status_channel_ref().current()
    }

    pub fn as_active(&self) -> Result<&ActiveConnection> {
        match self {
            Self::Active(active) => Ok(active),
            other => Err(Error::InvalidState {
                connection_id: other.connection_id(),
                actual: other.state(),
                expected: ConnectionState::Active,
            }),
        }
    }

    /// Replace the record's config. The running instance keeps the config it
    /// was initialized with until the next init.
    pub fn set_config(&mut self, config: ConnectionConfig) {
        let record = match self {
            Self::Pending(c) => &mut c.record,
            Self::Active(c) => &mut c.record,
            Self::Failed(c) => &mut c.record,
        };
        record.config = config;
    }

    /// Carry an existing status stream over to a freshly built connection so
    /// subscribers keep watching the same logical connection.
    pub(crate) fn adopt_status(self, status: StatusChannel) -> Self {
        match self {
            Self::Pending(c) => Self::Pending(PendingConnection { status, ..c }),
            Self::Active(c) => Self::Active(ActiveConnection { status, ..c }),
            Self::Failed(c) => {
                status.publish(ConnectionStatus::error(c.reason.clone()));
                Self::Failed(FailedConnection { status, ..c })
            },
        }
    }

    /// Discard the current handle, tearing it down if it was initialized, and
    /// ask the loader for a new one.
    pub async fn to_pending(self, loader: &dyn ExtensionLoader) -> Self {
        match self {
            Self::Pending(pending) => Self::Pending(pending),
            Self::Active(active) => active.to_pending(loader).await,
            Self::Failed(failed) => failed.to_pending(loader),
        }
    }

    pub async fn to_failed(self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let (record, status) = match self {
            Self::Pending(c) => (c.record, c.status),
            Self::Active(c) => c.teardown().await,
            Self::Failed(c) => (c.record, c.status),
        };
        warn!(
            connection_id = record.connection_id,
            alias = %record.alias,
            reason = %reason,
            "connection marked failed"
        );
        status.publish(ConnectionStatus::error(reason.clone()));
        Self::Failed(FailedConnection {
            record,
            reason,
            status,
        })
    }

    /// Tear down whatever is live and hand back the record.
    pub async fn shutdown(self) -> ConnectionRecord {
        match self {
            Self::Active(active) => active.teardown().await.0,
            Self::Pending(c) => c.record,
            Self::Failed(c) => c.record,
        }
    }
}

impl PendingConnection {
    pub fn record(&self) -> &ConnectionRecord {
        &self.record
    }

    /// Run the extension's `initialize` under the host's init timeout.
    ///
    /// A decline, an error, a panic, or a timeout all produce `Failed` after
    /// the instance's tasks have been shut down.
    pub async fn init(self, host: &HostContext, bridge: Arc<dyn ParaboxBridge>) -> Connection {
        let Self {
            record,
            instance,
            status,
        } = self;

        bridge.update_status(ConnectionStatus::Activating);
        let supervisor = TaskSupervisor::new();
        let ctx = ConnectionContext {
            connection_id: record.connection_id,
            alias: record.alias.clone(),
            config: record.config.clone(),
            bridge: Arc::clone(&bridge),
            supervisor: supervisor.clone(),
        };

        let initializing = Arc::clone(&instance);
        let mut task = tokio::spawn(async move { initializing.initialize(ctx).await });
        let outcome = match tokio::time::timeout(host.init_timeout, &mut task).await {
            Ok(Ok(Ok(true))) => Ok(()),
            Ok(Ok(Ok(false))) => Err("extension declined to initialize".to_string()),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join)) if join.is_panic() => Err("extension panicked during initialize".into()),
            Ok(Err(join)) => Err(format!("initialize did not complete: {join}")),
            Err(_) => {
                task.abort();
                Err(Error::timeout("initialize", host.init_timeout).to_string())
            },
        };

        match outcome {
            Ok(()) => {
                let forwarding = Arc::clone(&instance);
                let lifecycle = host
                    .lifecycle
                    .subscribe(move |event| forwarding.on_lifecycle(event));
                info!(
                    connection_id = record.connection_id,
                    alias = %record.alias,
                    key = %record.descriptor.key,
                    "connection initialized"
                );
                Connection::Active(ActiveConnection {
                    record,
                    instance,
                    supervisor,
                    lifecycle,
                    call_timeout: host.call_timeout,
                    status,
                })
            },
            Err(fallback) => {
                supervisor.shutdown().await;
                instance.teardown().await;
                // Prefer the reason the extension published itself.
                let reason = match bridge.current_status() {
                    ConnectionStatus::Error(reported) => reported,
                    _ => fallback,
                };
                warn!(
                    connection_id = record.connection_id,
                    alias = %record.alias,
                    key = %record.descriptor.key,
                    reason = %reason,
                    "connection failed to initialize"
                );
                bridge.update_status(ConnectionStatus::error(reason.clone()));
                Connection::Failed(FailedConnection {
                    record,
                    reason,
                    status,
                })
            },
        }
    }
}

impl ActiveConnection {
    pub fn record(&self) -> &ConnectionRecord {
        &self.record
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    pub fn is_forwarding_lifecycle(&self) -> bool {
        self.lifecycle.is_active()
    }

    /// Stop lifecycle delivery, cancel background tasks, run the extension's
    /// teardown hook, and wait for every supervised task to exit.
    async fn teardown(self) -> (ConnectionRecord, StatusChannel) {
        let Self {
            record,
            instance,
            supervisor,
            lifecycle,
            status,
            ..
        } = self;
        drop(lifecycle);
        supervisor.token().cancel();
        instance.teardown().await;
        supervisor.shutdown().await;
        info!(
            connection_id = record.connection_id,
            alias = %record.alias,
            "connection torn down"
        );
        (record, status)
    }

    pub async fn to_pending(self, loader: &dyn ExtensionLoader) -> Connection {
        let (record, status) = self.teardown().await;
        loader.instantiate_connection(record).adopt_status(status)
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| Error::timeout(operation, self.call_timeout))?
    }

    pub async fn send_message(&self, message: SendMessage) -> Result<()> {
        message.validate()?;
        self.call("send_message", self.instance.send_message(message))
            .await
    }

    pub async fn recall_message(&self, uuid: &str) -> Result<()> {
        self.call("recall_message", self.instance.recall_message(uuid))
            .await
    }

    pub async fn contacts(&self) -> Result<Vec<Contact>> {
        self.call("contacts", self.instance.contacts()).await
    }

    pub async fn chats(&self) -> Result<Vec<Chat>> {
        self.call("chats", self.instance.chats()).await
    }

    pub async fn message_history(&self, uuid: &str) -> Result<Vec<ReceiveMessage>> {
        self.call("message_history", self.instance.message_history(uuid))
            .await
    }

    pub async fn group_basic_info(&self, group_id: &str) -> Result<Option<BasicInfo>> {
        self.call("group_basic_info", self.instance.group_basic_info(group_id))
            .await
    }

    pub async fn user_basic_info(&self, user_id: &str) -> Result<Option<BasicInfo>> {
        self.call("user_basic_info", self.instance.user_basic_info(user_id))
            .await
    }

    pub async fn forward_node(&self, id: &str) -> Result<Option<ForwardNode>> {
        self.call("forward_node", self.instance.forward_node(id))
            .await
    }
}

impl FailedConnection {
    pub fn record(&self) -> &ConnectionRecord {
        &self.record
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Build a brand new handle. The failed one is never reused.
    pub fn to_pending(self, loader: &dyn ExtensionLoader) -> Connection {
        loader
            .instantiate_connection(self.record)
            .adopt_status(self.status)
    }
}
