use serde::{Deserialize, Serialize};

use crate::resource::ResourceInfo;

/// Display name and avatar of a user or chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: ResourceInfo,
}

impl BasicInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            avatar: ResourceInfo::Empty,
        }
    }
}

/// A user as seen by one backend. `uid` is only unique within that backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub basic_info: BasicInfo,
    pub uid: String,
}

impl Contact {
    pub fn new(uid: impl Into<String>, basic_info: BasicInfo) -> Self {
        Self {
            basic_info,
            uid: uid.into(),
        }
    }

    /// Name if known, otherwise the uid.
    pub fn display_name(&self) -> &str {
        self.basic_info.name.as_deref().unwrap_or(&self.uid)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Group = 0,
    #[default]
    Private = 1,
    Other = 2,
}

impl ChatType {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Group,
            1 => Self::Private,
            _ => Self::Other,
        }
    }
}

/// A conversation: a group, a private chat, or something else the backend exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(default)]
    pub basic_info: BasicInfo,
    #[serde(rename = "type", default)]
    pub chat_type: ChatType,
    pub uid: String,
}

impl Chat {
    pub fn new(uid: impl Into<String>, chat_type: ChatType, basic_info: BasicInfo) -> Self {
        Self {
            basic_info,
            chat_type,
            uid: uid.into(),
        }
    }
}
