//! SQLite-backed message and connection store using sqlx.

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    parabox_common::time::now_ms,
    parabox_extension::{
        ConnectionConfig, ConnectionStore, MessageStore, ReceiveOutcome, StoredConnection,
    },
    parabox_message::{ContentKind, ReceiveMessage},
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
    tracing::debug,
};

use crate::{
    primitives::{
        increment_unread, insert_or_ignore_message, resolve_or_create_chat,
        resolve_or_create_contact, touch_latest,
    },
    records::{StoredChat, StoredContact, StoredMessage},
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to SQLite")?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool. Migrations must already be run.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Messages of one chat, oldest first by message timestamp.
    pub async fn messages(&self, chat_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            "SELECT * FROM (
                 SELECT * FROM messages WHERE chat_id = ?
                 ORDER BY timestamp DESC, message_id DESC
                 LIMIT ?
             ) ORDER BY timestamp ASC, message_id ASC",
        )
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(StoredMessage::from_row).collect()
    }

    /// Newest messages of a connection that contain at least one element of
    /// `kind`. Filters on the stored mask; contents are not decoded to match.
    pub async fn messages_with_kind(
        &self,
        connection_id: i64,
        kind: ContentKind,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            "SELECT * FROM messages
             WHERE connection_id = ? AND (content_types & ?) != 0
             ORDER BY timestamp DESC, message_id DESC
             LIMIT ?",
        )
        .bind(connection_id)
        .bind(i64::from(kind.bit()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(StoredMessage::from_row).collect()
    }

    /// Newest messages of a connection, any kind.
    pub async fn recent_messages(
        &self,
        connection_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE connection_id = ?
             ORDER BY timestamp DESC, message_id DESC
             LIMIT ?",
        )
        .bind(connection_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(StoredMessage::from_row).collect()
    }

    /// Chats of a connection, most recent activity first.
    pub async fn chats(&self, connection_id: i64) -> Result<Vec<StoredChat>> {
        let rows = sqlx::query(
            "SELECT * FROM chats WHERE connection_id = ?
             ORDER BY latest_timestamp IS NULL, latest_timestamp DESC, chat_id ASC",
        )
        .bind(connection_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(StoredChat::from_row).collect()
    }

    pub async fn chat(&self, connection_id: i64, uid: &str) -> Result<Option<StoredChat>> {
        let row = sqlx::query("SELECT * FROM chats WHERE connection_id = ? AND uid = ?")
            .bind(connection_id)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(StoredChat::from_row).transpose()
    }

    pub async fn contact(&self, connection_id: i64, uid: &str) -> Result<Option<StoredContact>> {
        let row = sqlx::query("SELECT * FROM contacts WHERE connection_id = ? AND uid = ?")
            .bind(connection_id)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(StoredContact::from_row).transpose()
    }

    pub async fn mark_read(&self, chat_id: i64) -> Result<()> {
        sqlx::query("UPDATE chats SET unread_count = 0 WHERE chat_id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn ingest(&self, connection_id: i64, message: &ReceiveMessage) -> Result<ReceiveOutcome> {
        let mut tx = self.pool.begin().await?;

        let chat_id = resolve_or_create_chat(&mut tx, connection_id, &message.chat).await?;
        let sender_id = resolve_or_create_contact(&mut tx, connection_id, &message.sender).await?;

        let inserted = insert_or_ignore_message(
            &mut tx,
            connection_id,
            chat_id,
            sender_id,
            message,
            now_ms(),
        )
        .await?;

        let Some(message_id) = inserted else {
            tx.rollback().await?;
            return Ok(ReceiveOutcome::Duplicate);
        };

        increment_unread(&mut tx, chat_id).await?;
        touch_latest(&mut tx, chat_id, message_id, message.timestamp).await?;
        tx.commit().await?;

        debug!(connection_id, chat_id, message_id, uuid = %message.uuid, "message ingested");
        Ok(ReceiveOutcome::Stored { message_id })
    }
}

fn connection_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredConnection> {
    let config: String = row.try_get("config")?;
    Ok(StoredConnection {
        connection_id: row.try_get("connection_id")?,
        alias: row.try_get("alias")?,
        name: row.try_get("name")?,
        extension_key: row.try_get("extension_key")?,
        config: serde_json::from_str::<ConnectionConfig>(&config)
            .with_context(|| format!("invalid stored config for {config:?}"))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ConnectionStore for SqliteStore {
    async fn list(&self) -> Result<Vec<StoredConnection>> {
        let rows = sqlx::query("SELECT * FROM connections ORDER BY connection_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(connection_from_row).collect()
    }

    async fn get(&self, alias: &str) -> Result<Option<StoredConnection>> {
        let row = sqlx::query("SELECT * FROM connections WHERE alias = ?")
            .bind(alias)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(connection_from_row).transpose()
    }

    async fn upsert(&self, connection: StoredConnection) -> Result<i64> {
        let now = now_ms();
        let config = serde_json::to_string(&connection.config)?;
        let row = sqlx::query(
            "INSERT INTO connections (alias, name, extension_key, config, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(alias) DO UPDATE SET
                 name = excluded.name,
                 extension_key = excluded.extension_key,
                 config = excluded.config,
                 updated_at = excluded.updated_at
             RETURNING connection_id",
        )
        .bind(&connection.alias)
        .bind(&connection.name)
        .bind(&connection.extension_key)
        .bind(&config)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("connection_id")?)
    }

    async fn delete(&self, connection_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM connections WHERE connection_id = ?")
            .bind(connection_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        parabox_message::{BasicInfo, Chat, ChatType, Contact, MessageElement, ResourceInfo},
        rstest::rstest,
        serde_json::json,
        std::sync::Arc,
    };

    async fn make_store() -> SqliteStore {
        // One connection: every pooled connection to `sqlite::memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::run_migrations(&pool).await.unwrap();
        SqliteStore::with_pool(pool)
    }

    fn message(uuid: &str, chat: &str, timestamp: i64, contents: Vec<MessageElement>) -> ReceiveMessage {
        ReceiveMessage {
            contents,
            sender: Contact::new("10001", BasicInfo::named("alice")),
            chat: Chat::new(chat, ChatType::Group, BasicInfo::named("team")),
            timestamp,
            uuid: uuid.into(),
        }
    }

    fn image() -> MessageElement {
        MessageElement::Image {
            width: 0,
            height: 0,
            file_name: None,
            resource: ResourceInfo::url("https://cdn/p.png"),
        }
    }

    #[tokio::test]
    async fn duplicate_uuid_is_stored_once() {
        let store = make_store().await;
        let msg = message("m1", "g1", 1_000, vec![MessageElement::text("hi")]);

        let first = store.ingest(1, &msg).await.unwrap();
        let second = store.ingest(1, &msg).await.unwrap();
        assert!(matches!(first, ReceiveOutcome::Stored { .. }));
        assert_eq!(second, ReceiveOutcome::Duplicate);

        let chat = store.chat(1, "g1").await.unwrap().unwrap();
        assert_eq!(chat.unread_count, 1);
        assert_eq!(store.messages(chat.chat_id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_uuid_on_other_connection_is_distinct() {
        let store = make_store().await;
        let msg = message("m1", "g1", 1_000, vec![MessageElement::text("hi")]);
        store.ingest(1, &msg).await.unwrap();
        assert!(matches!(
            store.ingest(2, &msg).await.unwrap(),
            ReceiveOutcome::Stored { .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ingest_on_pooled_file_db_stores_each_uuid_once() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("inbox.db").display());
        let store = Arc::new(SqliteStore::new(&url).await.unwrap());

        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let store = Arc::clone(&store);
                let msg = message(
                    &format!("m{}", i % 10),
                    "g1",
                    1_000 + (i % 10) as i64,
                    vec![MessageElement::text("hi")],
                );
                tokio::spawn(async move { store.ingest(1, &msg).await })
            })
            .collect();
        let outcomes: Vec<ReceiveOutcome> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let stored = outcomes
            .iter()
            .filter(|o| matches!(o, ReceiveOutcome::Stored { .. }))
            .count();
        assert_eq!(stored, 10);
        let chat = store.chat(1, "g1").await.unwrap().unwrap();
        assert_eq!(chat.unread_count, 10);
        assert_eq!(chat.latest_timestamp, Some(1_009));
        assert_eq!(store.messages(chat.chat_id, 100).await.unwrap().len(), 10);
        store.pool().close().await;
    }

    #[tokio::test]
    async fn latest_pointer_follows_message_timestamp() {
        let store = make_store().await;
        let newer = store
            .ingest(1, &message("m2", "g1", 2_000, vec![MessageElement::text("new")]))
            .await
            .unwrap();
        store
            .ingest(1, &message("m1", "g1", 1_000, vec![MessageElement::text("old")]))
            .await
            .unwrap();

        let chat = store.chat(1, "g1").await.unwrap().unwrap();
        let ReceiveOutcome::Stored { message_id } = newer else {
            panic!("expected stored");
        };
        assert_eq!(chat.latest_message_id, Some(message_id));
        assert_eq!(chat.latest_timestamp, Some(2_000));
        assert_eq!(chat.unread_count, 2);

        let ordered: Vec<_> = store
            .messages(chat.chat_id, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.uuid)
            .collect();
        assert_eq!(ordered, vec!["m1", "m2"]);
    }

    #[rstest]
    #[case(ContentKind::Image, vec!["m2", "m1"])]
    #[case(ContentKind::PlainText, vec!["m3", "m1"])]
    #[case(ContentKind::AtAll, vec![])]
    #[tokio::test]
    async fn filters_by_kind_mask(#[case] kind: ContentKind, #[case] expected: Vec<&str>) {
        let store = make_store().await;
        store
            .ingest(1, &message("m1", "g1", 1, vec![MessageElement::text("look"), image()]))
            .await
            .unwrap();
        store
            .ingest(1, &message("m2", "g1", 2, vec![image()]))
            .await
            .unwrap();
        store
            .ingest(1, &message("m3", "g1", 3, vec![MessageElement::text("ok")]))
            .await
            .unwrap();

        let found: Vec<_> = store
            .messages_with_kind(1, kind, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.uuid)
            .collect();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn stored_contents_round_trip_with_summary() {
        let store = make_store().await;
        store
            .ingest(1, &message("m1", "g1", 1, vec![MessageElement::text("look"), image()]))
            .await
            .unwrap();
        let stored = store.recent_messages(1, 1).await.unwrap().remove(0);
        assert_eq!(stored.contents.len(), 2);
        assert_eq!(stored.content_string, "look [Image]");
        assert!(stored.content_types.contains(ContentKind::Image));
    }

    #[tokio::test]
    async fn sender_name_is_refreshed() {
        let store = make_store().await;
        store
            .ingest(1, &message("m1", "g1", 1, vec![MessageElement::text("a")]))
            .await
            .unwrap();
        let mut renamed = message("m2", "g1", 2, vec![MessageElement::text("b")]);
        renamed.sender = Contact::new("10001", BasicInfo::named("alice2"));
        store.ingest(1, &renamed).await.unwrap();

        let contact = store.contact(1, "10001").await.unwrap().unwrap();
        assert_eq!(contact.basic_info.name.as_deref(), Some("alice2"));
    }

    #[tokio::test]
    async fn mark_read_resets_unread() {
        let store = make_store().await;
        store
            .ingest(1, &message("m1", "g1", 1, vec![MessageElement::AtAll]))
            .await
            .unwrap();
        let chat = store.chat(1, "g1").await.unwrap().unwrap();
        store.mark_read(chat.chat_id).await.unwrap();
        assert_eq!(store.chats(1).await.unwrap()[0].unread_count, 0);
    }

    fn stored_connection(alias: &str, host: &str) -> StoredConnection {
        StoredConnection {
            connection_id: 0,
            alias: alias.into(),
            name: "OneBot 11".into(),
            extension_key: "onebot11".into(),
            config: json!({ "host": host, "port": 6700 })
                .as_object()
                .cloned()
                .unwrap(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn connection_upsert_by_alias() {
        let store = make_store().await;
        let id = store
            .upsert(stored_connection("qq", "127.0.0.1"))
            .await
            .unwrap();
        let same = store
            .upsert(stored_connection("qq", "10.0.0.2"))
            .await
            .unwrap();
        assert_eq!(id, same);

        let loaded = store.get("qq").await.unwrap().unwrap();
        assert_eq!(loaded.config["host"], json!("10.0.0.2"));
        assert_eq!(store.list().await.unwrap().len(), 1);

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.get("qq").await.unwrap().is_none());
    }
}
