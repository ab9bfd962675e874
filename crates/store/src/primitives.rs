//! Single-statement building blocks of an ingest.
//!
//! Each takes the connection of an open transaction so the caller decides
//! the unit of work. None of them commit.

use {
    anyhow::Result,
    parabox_message::{BasicInfo, Chat, Contact, ReceiveMessage, ResourceInfo, codec},
    sqlx::{Row, SqliteConnection},
};

/// Keep what is known: a new name wins when present, avatars are merged.
fn merge_basic_info(existing: BasicInfo, incoming: &BasicInfo) -> BasicInfo {
    let avatar = if incoming.avatar.is_empty() {
        existing.avatar
    } else {
        existing
            .avatar
            .merge(incoming.avatar.clone())
            .unwrap_or_else(|| incoming.avatar.clone())
    };
    BasicInfo {
        name: incoming.name.clone().or(existing.name),
        avatar,
    }
}

fn encode_avatar(avatar: &ResourceInfo) -> Result<String> {
    Ok(serde_json::to_string(avatar)?)
}

async fn existing_info(
    conn: &mut SqliteConnection,
    table_query: &'static str,
    id: i64,
) -> Result<BasicInfo> {
    let row = sqlx::query(table_query).bind(id).fetch_one(&mut *conn).await?;
    let avatar: String = row.try_get("avatar")?;
    Ok(BasicInfo {
        name: row.try_get("name")?,
        avatar: serde_json::from_str(&avatar).unwrap_or_default(),
    })
}

/// Id of the contact with this uid on this connection, creating it if needed.
/// Name and avatar are refreshed from `contact`.
pub async fn resolve_or_create_contact(
    conn: &mut SqliteConnection,
    connection_id: i64,
    contact: &Contact,
) -> Result<i64> {
    sqlx::query("INSERT OR IGNORE INTO contacts (connection_id, uid, name, avatar) VALUES (?, ?, ?, ?)")
        .bind(connection_id)
        .bind(&contact.uid)
        .bind(&contact.basic_info.name)
        .bind(encode_avatar(&contact.basic_info.avatar)?)
        .execute(&mut *conn)
        .await?;

    let contact_id: i64 =
        sqlx::query("SELECT contact_id FROM contacts WHERE connection_id = ? AND uid = ?")
            .bind(connection_id)
            .bind(&contact.uid)
            .fetch_one(&mut *conn)
            .await?
            .try_get("contact_id")?;

    let existing = existing_info(
        conn,
        "SELECT name, avatar FROM contacts WHERE contact_id = ?",
        contact_id,
    )
    .await?;
    let merged = merge_basic_info(existing.clone(), &contact.basic_info);
    if merged != existing {
        sqlx::query("UPDATE contacts SET name = ?, avatar = ? WHERE contact_id = ?")
            .bind(&merged.name)
            .bind(encode_avatar(&merged.avatar)?)
            .bind(contact_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(contact_id)
}

/// Id of the chat with this uid on this connection, creating it if needed.
pub async fn resolve_or_create_chat(
    conn: &mut SqliteConnection,
    connection_id: i64,
    chat: &Chat,
) -> Result<i64> {
    sqlx::query(
        "INSERT OR IGNORE INTO chats (connection_id, uid, chat_type, name, avatar)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(connection_id)
    .bind(&chat.uid)
    .bind(chat.chat_type.code())
    .bind(&chat.basic_info.name)
    .bind(encode_avatar(&chat.basic_info.avatar)?)
    .execute(&mut *conn)
    .await?;

    let chat_id: i64 = sqlx::query("SELECT chat_id FROM chats WHERE connection_id = ? AND uid = ?")
        .bind(connection_id)
        .bind(&chat.uid)
        .fetch_one(&mut *conn)
        .await?
        .try_get("chat_id")?;

    let existing = existing_info(
        conn,
        "SELECT name, avatar FROM chats WHERE chat_id = ?",
        chat_id,
    )
    .await?;
    let merged = merge_basic_info(existing.clone(), &chat.basic_info);
    if merged != existing {
        sqlx::query("UPDATE chats SET name = ?, avatar = ? WHERE chat_id = ?")
            .bind(&merged.name)
            .bind(encode_avatar(&merged.avatar)?)
            .bind(chat_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(chat_id)
}

/// Insert the message unless `(connection_id, uuid)` already exists.
/// Returns the new row id, or `None` for a duplicate.
pub async fn insert_or_ignore_message(
    conn: &mut SqliteConnection,
    connection_id: i64,
    chat_id: i64,
    sender_id: i64,
    message: &ReceiveMessage,
    received_at: i64,
) -> Result<Option<i64>> {
    let contents = codec::encode_contents(&message.contents)?;
    let result = sqlx::query(
        "INSERT OR IGNORE INTO messages
             (connection_id, uuid, chat_id, sender_id, contents, content_types, content_string, timestamp, received_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(connection_id)
    .bind(&message.uuid)
    .bind(chat_id)
    .bind(sender_id)
    .bind(&contents)
    .bind(i64::from(message.content_types().bits()))
    .bind(message.content_string())
    .bind(message.timestamp)
    .bind(received_at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(result.last_insert_rowid()))
}

pub async fn increment_unread(conn: &mut SqliteConnection, chat_id: i64) -> Result<()> {
    sqlx::query("UPDATE chats SET unread_count = unread_count + 1 WHERE chat_id = ?")
        .bind(chat_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Point the chat at this message if it is the newest by message timestamp.
/// Arrival order does not matter.
pub async fn touch_latest(
    conn: &mut SqliteConnection,
    chat_id: i64,
    message_id: i64,
    timestamp: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE chats
         SET latest_message_id = ?, latest_timestamp = ?
         WHERE chat_id = ? AND (latest_timestamp IS NULL OR latest_timestamp <= ?)",
    )
    .bind(message_id)
    .bind(timestamp)
    .bind(chat_id)
    .bind(timestamp)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_name_wins_and_avatars_merge() {
        let existing = BasicInfo {
            name: Some("old".into()),
            avatar: ResourceInfo::local("/cache/a.png"),
        };
        let incoming = BasicInfo {
            name: None,
            avatar: ResourceInfo::url("https://cdn/a.png"),
        };
        let merged = merge_basic_info(existing, &incoming);
        assert_eq!(merged.name.as_deref(), Some("old"));
        assert!(matches!(merged.avatar, ResourceInfo::Synced { .. }));
    }

    #[test]
    fn empty_incoming_avatar_keeps_existing() {
        let existing = BasicInfo {
            name: None,
            avatar: ResourceInfo::url("https://cdn/a.png"),
        };
        let merged = merge_basic_info(existing.clone(), &BasicInfo::named("alice"));
        assert_eq!(merged.avatar, existing.avatar);
        assert_eq!(merged.name.as_deref(), Some("alice"));
    }
}
