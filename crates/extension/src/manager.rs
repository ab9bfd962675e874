//! Host-side orchestration of every configured connection.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex as StdMutex},
};

use {
    futures::future::join_all,
    parabox_message::{BasicInfo, Chat, Contact, ForwardNode, ReceiveMessage, SendMessage},
    serde::Serialize,
    tokio::sync::{Mutex, RwLock},
    tracing::{info, warn},
};

use crate::{
    bridge::{HostBridge, ParaboxBridge},
    connection::{
        ActiveConnection, Connection, ConnectionConfig, ConnectionRecord, ConnectionState,
        HostContext,
    },
    error::{Error, Result},
    lifecycle::{LifecycleEvent, LifecycleSource},
    loader::ExtensionLoader,
    status::{ConnectionStatus, StatusChannel, StatusReceiver},
    store::MessageStore,
};

/// Point-in-time view of one connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSummary {
    pub connection_id: i64,
    pub alias: String,
    pub extension_key: String,
    pub state: ConnectionState,
    pub status: ConnectionStatus,
}

struct Entry {
    alias: String,
    extension_key: String,
    status: StatusChannel,
    /// Last settled state, readable while a transition holds `connection`.
    state: StdMutex<ConnectionState>,
    /// `None` only while a transition owns the connection.
    connection: Mutex<Option<Connection>>,
}

impl Entry {
    fn settle(&self, connection: &Connection) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = connection.state();
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What a transition needs from the manager, owned so it can run on its own task.
#[derive(Clone)]
struct Transitions {
    loader: Arc<dyn ExtensionLoader>,
    store: Arc<dyn MessageStore>,
    host: HostContext,
}

impl Transitions {
    fn bridge(&self, connection_id: i64, status: &StatusChannel) -> Arc<dyn ParaboxBridge> {
        Arc::new(HostBridge::new(
            connection_id,
            Arc::clone(&self.store),
            status.clone(),
        ))
    }

    async fn init(&self, connection_id: i64, entry: &Entry, connection: Connection) -> Connection {
        match connection {
            Connection::Pending(pending) => {
                let bridge = self.bridge(connection_id, &entry.status);
                pending.init(&self.host, bridge).await
            },
            settled => settled,
        }
    }
}

/// Run a transition on its own task. A caller that stops waiting does not
/// cancel it, so an entry is never left without its connection.
async fn detached<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| Error::unavailable(format!("connection transition aborted: {e}")))?
}

/// Owns one [`Connection`] per connection id and drives its transitions.
///
/// Transitions of the same connection are serialized; different connections
/// progress independently. Each connection gets its own [`HostBridge`] and
/// status stream. The message store is the only thing they share.
pub struct ConnectionManager {
    loader: Arc<dyn ExtensionLoader>,
    store: Arc<dyn MessageStore>,
    host: HostContext,
    entries: RwLock<HashMap<i64, Arc<Entry>>>,
}

impl ConnectionManager {
    pub fn new(
        loader: Arc<dyn ExtensionLoader>,
        store: Arc<dyn MessageStore>,
        host: HostContext,
    ) -> Self {
        Self {
            loader,
            store,
            host,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn loader(&self) -> &Arc<dyn ExtensionLoader> {
        &self.loader
    }

    pub fn lifecycle(&self) -> &LifecycleSource {
        &self.host.lifecycle
    }

    /// Fan a host lifecycle event out to every active connection.
    pub fn dispatch(&self, event: LifecycleEvent) -> usize {
        self.host.lifecycle.dispatch(event)
    }

    async fn entry(&self, connection_id: i64) -> Result<Arc<Entry>> {
        self.entries
            .read()
            .await
            .get(&connection_id)
            .cloned()
            .ok_or_else(|| Error::unknown_connection(connection_id))
    }

    fn transitions(&self) -> Transitions {
        Transitions {
            loader: Arc::clone(&self.loader),
            store: Arc::clone(&self.store),
            host: self.host.clone(),
        }
    }

    /// Register a connection and build its first instance. Returns its state,
    /// `Pending` unless the extension could not be instantiated.
    pub async fn add(&self, record: ConnectionRecord) -> Result<ConnectionState> {
        let connection_id = record.connection_id;
        let mut entries = self.entries.write().await;
        if entries.contains_key(&connection_id) {
            return Err(Error::invalid_input(format!(
                "connection {connection_id} is already registered"
            )));
        }
        let connection = self.loader.instantiate_connection(record);
        let state = connection.state();
        info!(
            connection_id,
            alias = %connection.alias(),
            key = %connection.record().descriptor.key,
            state = %state,
            "connection added"
        );
        entries.insert(
            connection_id,
            Arc::new(Entry {
                alias: connection.alias().to_string(),
                extension_key: connection.record().descriptor.key.clone(),
                status: connection.status_channel(),
                state: StdMutex::new(state),
                connection: Mutex::new(Some(connection)),
            }),
        );
        Ok(state)
    }

    /// Initialize a `Pending` connection.
    pub async fn init(&self, connection_id: i64) -> Result<ConnectionState> {
        let entry = self.entry(connection_id).await?;
        let transitions = self.transitions();
        detached(async move {
            let mut slot = entry.connection.lock().await;
            let connection = take(&mut slot, connection_id)?;
            if connection.state() != ConnectionState::Pending {
                let actual = connection.state();
                *slot = Some(connection);
                return Err(Error::InvalidState {
                    connection_id,
                    actual,
                    expected: ConnectionState::Pending,
                });
            }
            let connection = transitions.init(connection_id, &entry, connection).await;
            Ok(put(&entry, &mut slot, connection))
        })
        .await
    }

    /// Initialize every `Pending` connection concurrently.
    pub async fn init_pending(&self) -> Vec<(i64, ConnectionState)> {
        let pending: Vec<i64> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.state() == ConnectionState::Pending)
            .map(|(id, _)| *id)
            .collect();

        let mut results = join_all(pending.into_iter().map(|id| async move {
            let state = match self.init(id).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(connection_id = id, error = %e, "skipping connection init");
                    match self.entry(id).await {
                        Ok(entry) => entry.state(),
                        Err(_) => ConnectionState::Failed,
                    }
                },
            };
            (id, state)
        }))
        .await;
        results.sort_by_key(|(id, _)| *id);
        results
    }

    /// Tear down the current instance (if live), build a fresh one, and init it.
    pub async fn restart(&self, connection_id: i64) -> Result<ConnectionState> {
        let entry = self.entry(connection_id).await?;
        let transitions = self.transitions();
        detached(async move {
            let mut slot = entry.connection.lock().await;
            let connection = take(&mut slot, connection_id)?;
            let connection = connection.to_pending(transitions.loader.as_ref()).await;
            let connection = transitions.init(connection_id, &entry, connection).await;
            info!(connection_id, state = %connection.state(), "connection restarted");
            Ok(put(&entry, &mut slot, connection))
        })
        .await
    }

    /// Replace the stored config and re-initialize with it.
    pub async fn reconfigure(
        &self,
        connection_id: i64,
        config: ConnectionConfig,
    ) -> Result<ConnectionState> {
        {
            let entry = self.entry(connection_id).await?;
            let mut slot = entry.connection.lock().await;
            match slot.as_mut() {
                Some(connection) => connection.set_config(config),
                None => return Err(Error::unavailable("connection is mid-transition")),
            }
        }
        self.restart(connection_id).await
    }

    /// Mark a connection failed, tearing down its instance.
    pub async fn disable(&self, connection_id: i64, reason: &str) -> Result<ConnectionState> {
        let entry = self.entry(connection_id).await?;
        let reason = reason.to_string();
        detached(async move {
            let mut slot = entry.connection.lock().await;
            let connection = take(&mut slot, connection_id)?;
            let connection = connection.to_failed(reason).await;
            Ok(put(&entry, &mut slot, connection))
        })
        .await
    }

    /// Tear down and forget a connection.
    pub async fn remove(&self, connection_id: i64) -> Result<ConnectionRecord> {
        let entry = self
            .entries
            .write()
            .await
            .remove(&connection_id)
            .ok_or_else(|| Error::unknown_connection(connection_id))?;
        detached(async move {
            let mut slot = entry.connection.lock().await;
            let connection = take(&mut slot, connection_id)?;
            let record = connection.shutdown().await;
            info!(connection_id, alias = %record.alias, "connection removed");
            Ok(record)
        })
        .await
    }

    pub async fn status(&self, connection_id: i64) -> Result<StatusReceiver> {
        Ok(self.entry(connection_id).await?.status.subscribe())
    }

    pub async fn state(&self, connection_id: i64) -> Result<ConnectionState> {
        Ok(self.entry(connection_id).await?.state())
    }

    /// Every connection, ordered by id. Never waits on a running transition.
    pub async fn snapshot(&self) -> Vec<ConnectionSummary> {
        let mut summaries: Vec<ConnectionSummary> = self
            .entries
            .read()
            .await
            .iter()
            .map(|(id, entry)| ConnectionSummary {
                connection_id: *id,
                alias: entry.alias.clone(),
                extension_key: entry.extension_key.clone(),
                state: entry.state(),
                status: entry.status.current(),
            })
            .collect();
        summaries.sort_by_key(|s| s.connection_id);
        summaries
    }

    /// Tear down every connection.
    pub async fn shutdown(&self) {
        let entries: Vec<(i64, Arc<Entry>)> = self.entries.write().await.drain().collect();
        join_all(entries.into_iter().map(|(id, entry)| async move {
            let mut slot = entry.connection.lock().await;
            if let Some(connection) = slot.take() {
                connection.shutdown().await;
            }
            info!(connection_id = id, "connection shut down");
        }))
        .await;
    }

    pub async fn send_message(&self, connection_id: i64, message: SendMessage) -> Result<()> {
        let entry = self.entry(connection_id).await?;
        let slot = entry.connection.lock().await;
        active(&slot)?.send_message(message).await
    }

    pub async fn recall_message(&self, connection_id: i64, uuid: &str) -> Result<()> {
        let entry = self.entry(connection_id).await?;
        let slot = entry.connection.lock().await;
        active(&slot)?.recall_message(uuid).await
    }

    pub async fn contacts(&self, connection_id: i64) -> Result<Vec<Contact>> {
        let entry = self.entry(connection_id).await?;
        let slot = entry.connection.lock().await;
        active(&slot)?.contacts().await
    }

    pub async fn chats(&self, connection_id: i64) -> Result<Vec<Chat>> {
        let entry = self.entry(connection_id).await?;
        let slot = entry.connection.lock().await;
        active(&slot)?.chats().await
    }

    pub async fn message_history(
        &self,
        connection_id: i64,
        uuid: &str,
    ) -> Result<Vec<ReceiveMessage>> {
        let entry = self.entry(connection_id).await?;
        let slot = entry.connection.lock().await;
        active(&slot)?.message_history(uuid).await
    }

    pub async fn group_basic_info(
        &self,
        connection_id: i64,
        group_id: &str,
    ) -> Result<Option<BasicInfo>> {
        let entry = self.entry(connection_id).await?;
        let slot = entry.connection.lock().await;
        active(&slot)?.group_basic_info(group_id).await
    }

    pub async fn user_basic_info(
        &self,
        connection_id: i64,
        user_id: &str,
    ) -> Result<Option<BasicInfo>> {
        let entry = self.entry(connection_id).await?;
        let slot = entry.connection.lock().await;
        active(&slot)?.user_basic_info(user_id).await
    }

    pub async fn forward_node(&self, connection_id: i64, id: &str) -> Result<Option<ForwardNode>> {
        let entry = self.entry(connection_id).await?;
        let slot = entry.connection.lock().await;
        active(&slot)?.forward_node(id).await
    }
}

fn active(slot: &Option<Connection>) -> Result<&ActiveConnection> {
    slot.as_ref()
        .ok_or_else(|| Error::unavailable("connection is mid-transition"))?
        .as_active()
}

fn take(slot: &mut Option<Connection>, connection_id: i64) -> Result<Connection> {
    slot.take().ok_or_else(|| {
        Error::unavailable(format!(
            "connection {connection_id} was lost during a previous transition"
        ))
    })
}

fn put(entry: &Entry, slot: &mut Option<Connection>, connection: Connection) -> ConnectionState {
    entry.settle(&connection);
    let state = connection.state();
    *slot = Some(connection);
    state
}
