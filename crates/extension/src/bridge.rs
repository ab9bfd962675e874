//! The two-way contract between the host and an extension instance.

use std::sync::Arc;

use {
    async_trait::async_trait,
    parabox_message::{BasicInfo, Chat, Contact, ForwardNode, ReceiveMessage, SendMessage},
    tracing::{debug, info, warn},
};

use crate::{
    connection::ConnectionConfig,
    error::{Error, Result},
    lifecycle::LifecycleEvent,
    status::{ConnectionStatus, StatusChannel},
    store::{MessageStore, ReceiveOutcome},
    supervisor::TaskSupervisor,
};

/// Host side of the bridge, handed to the extension at init time.
#[async_trait]
pub trait ParaboxBridge: Send + Sync {
    /// The only inbound path. Safe to call concurrently and to repeat with
    /// the same uuid.
    async fn receive_message(&self, message: ReceiveMessage) -> Result<ReceiveOutcome>;

    /// Publish a new status. Last write wins.
    fn update_status(&self, status: ConnectionStatus);

    fn current_status(&self) -> ConnectionStatus;
}

/// Everything an extension instance gets from the host when it is initialized.
#[derive(Clone)]
pub struct ConnectionContext {
    pub connection_id: i64,
    pub alias: String,
    pub config: ConnectionConfig,
    pub bridge: Arc<dyn ParaboxBridge>,
    /// Spawn background I/O here so teardown can cancel it.
    pub supervisor: TaskSupervisor,
}

impl ConnectionContext {
    pub fn update_status(&self, status: ConnectionStatus) {
        self.bridge.update_status(status);
    }
}

/// Extension side of the bridge. Each backend adapter implements this.
///
/// Errors returned from these calls are values; an extension must never
/// let a panic escape. Optional calls default to "nothing to report".
#[async_trait]
pub trait ParaboxConnection: Send + Sync {
    /// Start the connection. `Ok(false)` means the extension declined, e.g.
    /// because its config is incomplete; it should publish an `Error` status
    /// with the reason before returning.
    async fn initialize(&self, ctx: ConnectionContext) -> Result<bool>;

    async fn send_message(&self, message: SendMessage) -> Result<()>;

    async fn recall_message(&self, _uuid: &str) -> Result<()> {
        Err(Error::unsupported("recall_message"))
    }

    async fn contacts(&self) -> Result<Vec<Contact>> {
        Ok(Vec::new())
    }

    async fn chats(&self) -> Result<Vec<Chat>> {
        Ok(Vec::new())
    }

    async fn message_history(&self, _uuid: &str) -> Result<Vec<ReceiveMessage>> {
        Ok(Vec::new())
    }

    async fn group_basic_info(&self, _group_id: &str) -> Result<Option<BasicInfo>> {
        Ok(None)
    }

    async fn user_basic_info(&self, _user_id: &str) -> Result<Option<BasicInfo>> {
        Ok(None)
    }

    async fn forward_node(&self, _id: &str) -> Result<Option<ForwardNode>> {
        Ok(None)
    }

    /// Host lifecycle notification. Must not block; spawn if work is needed.
    fn on_lifecycle(&self, _event: LifecycleEvent) {}

    /// Release transports. Called exactly once per initialized instance,
    /// after its supervisor has been cancelled.
    async fn teardown(&self) {}
}

/// Per-connection bridge bound to the host's message store and status stream.
pub struct HostBridge {
    connection_id: i64,
    store: Arc<dyn MessageStore>,
    status: StatusChannel,
}

impl HostBridge {
    pub fn new(connection_id: i64, store: Arc<dyn MessageStore>, status: StatusChannel) -> Self {
        Self {
            connection_id,
            store,
            status,
        }
    }
}

#[async_trait]
impl ParaboxBridge for HostBridge {
    async fn receive_message(&self, message: ReceiveMessage) -> Result<ReceiveOutcome> {
        message.validate()?;

        let outcome = self
            .store
            .ingest(self.connection_id, &message)
            .await
            .map_err(|e| {
                warn!(
                    connection_id = self.connection_id,
                    uuid = %message.uuid,
                    error = %e,
                    "failed to persist inbound message"
                );
                Error::Store(e)
            })?;

        match outcome {
            ReceiveOutcome::Stored { message_id } => debug!(
                connection_id = self.connection_id,
                uuid = %message.uuid,
                message_id,
                kinds = %message.content_types(),
                "inbound message stored"
            ),
            ReceiveOutcome::Duplicate => debug!(
                connection_id = self.connection_id,
                uuid = %message.uuid,
                "duplicate inbound message ignored"
            ),
        }
        Ok(outcome)
    }

    fn update_status(&self, status: ConnectionStatus) {
        let rendered = status.to_string();
        if self.status.publish(status) {
            info!(
                connection_id = self.connection_id,
                status = %rendered,
                "connection status changed"
            );
        }
    }

    fn current_status(&self) -> ConnectionStatus {
        self.status.current()
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::{testing::MemoryStore, *},
        parabox_message::{BasicInfo, ChatType, MessageElement},
    };

    fn inbound(uuid: &str, contents: Vec<MessageElement>) -> ReceiveMessage {
        ReceiveMessage {
            contents,
            sender: Contact::new("10001", BasicInfo::named("alice")),
            chat: Chat::new("20002", ChatType::Group, BasicInfo::named("team")),
            timestamp: 1_700_000_000_000,
            uuid: uuid.into(),
        }
    }

    fn bridge(store: Arc<MemoryStore>) -> (HostBridge, StatusChannel) {
        let status = StatusChannel::new();
        (HostBridge::new(1, store, status.clone()), status)
    }

    #[tokio::test]
    async fn same_uuid_twice_is_stored_once() {
        let store = Arc::new(MemoryStore::default());
        let (bridge, _) = bridge(Arc::clone(&store));

        let first = bridge
            .receive_message(inbound("msg_1", vec![MessageElement::text("hi")]))
            .await
            .unwrap();
        let second = bridge
            .receive_message(inbound("msg_1", vec![MessageElement::text("hi")]))
            .await
            .unwrap();

        assert!(matches!(first, ReceiveOutcome::Stored { .. }));
        assert_eq!(second, ReceiveOutcome::Duplicate);
        assert_eq!(store.message_count(), 1);
        assert_eq!(store.unread(1, "20002"), 1);
    }

    #[tokio::test]
    async fn concurrent_deliveries_store_once() {
        let store = Arc::new(MemoryStore::default());
        let (bridge, _) = bridge(Arc::clone(&store));
        let bridge = Arc::new(bridge);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bridge = Arc::clone(&bridge);
                tokio::spawn(async move {
                    bridge
                        .receive_message(inbound("msg_1", vec![MessageElement::text("hi")]))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.message_count(), 1);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_storage() {
        let store = Arc::new(MemoryStore::default());
        let (bridge, _) = bridge(Arc::clone(&store));
        let err = bridge
            .receive_message(inbound("msg_2", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Content(parabox_message::Error::EmptyMessage)
        ));
        assert_eq!(store.message_count(), 0);
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_error_value() {
        let store = Arc::new(MemoryStore::default());
        store.fail_next();
        let (bridge, _) = bridge(Arc::clone(&store));
        let err = bridge
            .receive_message(inbound("msg_3", vec![MessageElement::AtAll]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(store.message_count(), 0);
    }

    #[test]
    fn status_updates_reach_subscribers() {
        let store = Arc::new(MemoryStore::default());
        let (bridge, status) = bridge(store);
        let rx = status.subscribe();
        bridge.update_status(ConnectionStatus::error("OneBot disabled"));
        assert_eq!(*rx.borrow(), ConnectionStatus::error("OneBot disabled"));
        assert_eq!(
            bridge.current_status(),
            ConnectionStatus::error("OneBot disabled")
        );
    }
}
