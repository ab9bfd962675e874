use {
    anyhow::Result,
    parabox_message::{BasicInfo, ChatType, ContentTypes, MessageElement, ResourceInfo, codec},
    serde::Serialize,
    sqlx::{Row, sqlite::SqliteRow},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub message_id: i64,
    pub connection_id: i64,
    pub uuid: String,
    pub chat_id: i64,
    pub sender_id: i64,
    pub contents: Vec<MessageElement>,
    pub content_types: ContentTypes,
    pub content_string: String,
    pub timestamp: i64,
}

impl StoredMessage {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let contents: String = row.try_get("contents")?;
        Ok(Self {
            message_id: row.try_get("message_id")?,
            connection_id: row.try_get("connection_id")?,
            uuid: row.try_get("uuid")?,
            chat_id: row.try_get("chat_id")?,
            sender_id: row.try_get("sender_id")?,
            contents: codec::decode_contents(&contents)?,
            content_types: ContentTypes::from_bits(row.try_get::<i64, _>("content_types")? as u32),
            content_string: row.try_get("content_string")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredChat {
    pub chat_id: i64,
    pub connection_id: i64,
    pub uid: String,
    pub chat_type: ChatType,
    pub basic_info: BasicInfo,
    pub unread_count: i64,
    pub latest_message_id: Option<i64>,
    pub latest_timestamp: Option<i64>,
}

impl StoredChat {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            chat_id: row.try_get("chat_id")?,
            connection_id: row.try_get("connection_id")?,
            uid: row.try_get("uid")?,
            chat_type: ChatType::from_code(row.try_get("chat_type")?),
            basic_info: basic_info(row)?,
            unread_count: row.try_get("unread_count")?,
            latest_message_id: row.try_get("latest_message_id")?,
            latest_timestamp: row.try_get("latest_timestamp")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredContact {
    pub contact_id: i64,
    pub connection_id: i64,
    pub uid: String,
    pub basic_info: BasicInfo,
}

impl StoredContact {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            contact_id: row.try_get("contact_id")?,
            connection_id: row.try_get("connection_id")?,
            uid: row.try_get("uid")?,
            basic_info: basic_info(row)?,
        })
    }
}

fn basic_info(row: &SqliteRow) -> Result<BasicInfo> {
    let avatar: String = row.try_get("avatar")?;
    Ok(BasicInfo {
        name: row.try_get("name")?,
        avatar: serde_json::from_str(&avatar).unwrap_or(ResourceInfo::Empty),
    })
}
