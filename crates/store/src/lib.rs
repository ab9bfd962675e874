//! SQLite persistence for connections, chats, contacts, and messages.

pub mod primitives;
pub mod records;
pub mod sqlite;

pub use {
    records::{StoredChat, StoredContact, StoredMessage},
    sqlite::SqliteStore,
};

/// Run database migrations for the store.
///
/// Creates the `connections`, `contacts`, `chats`, and `messages` tables.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
