use serde::{Deserialize, Serialize};

use crate::{
    contact::{Chat, Contact},
    content_type::ContentTypes,
    element::{MessageElement, content_string},
    error::{Error, Result},
};

/// An inbound message as delivered by an extension.
///
/// `uuid` is assigned by the backend and is the idempotency key: delivering
/// the same message twice must not store it twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveMessage {
    pub contents: Vec<MessageElement>,
    pub sender: Contact,
    pub chat: Chat,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub uuid: String,
}

impl ReceiveMessage {
    pub fn validate(&self) -> Result<()> {
        if self.contents.is_empty() {
            return Err(Error::EmptyMessage);
        }
        if self.uuid.trim().is_empty() {
            return Err(Error::MissingUuid);
        }
        Ok(())
    }

    pub fn content_types(&self) -> ContentTypes {
        ContentTypes::from_elements(&self.contents)
    }

    pub fn content_string(&self) -> String {
        content_string(&self.contents)
    }
}

/// An outbound message handed by the host to an extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessage {
    pub contents: Vec<MessageElement>,
    pub chat: Chat,
    pub timestamp: i64,
    pub uuid: String,
}

impl SendMessage {
    pub fn validate(&self) -> Result<()> {
        if self.contents.is_empty() {
            return Err(Error::EmptyMessage);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::contact::{BasicInfo, ChatType},
    };

    fn message(contents: Vec<MessageElement>, uuid: &str) -> ReceiveMessage {
        ReceiveMessage {
            contents,
            sender: Contact::new("1", BasicInfo::named("alice")),
            chat: Chat::new("1", ChatType::Private, BasicInfo::named("alice")),
            timestamp: 1_700_000_000_000,
            uuid: uuid.into(),
        }
    }

    #[test]
    fn rejects_empty_contents() {
        let err = message(vec![], "msg_1").validate();
        assert!(matches!(err, Err(Error::EmptyMessage)));
    }

    #[test]
    fn rejects_blank_uuid() {
        let err = message(vec![MessageElement::text("hi")], "  ").validate();
        assert!(matches!(err, Err(Error::MissingUuid)));
    }

    #[test]
    fn index_and_preview_follow_contents() {
        let msg = message(
            vec![MessageElement::text("look"), MessageElement::AtAll],
            "msg_1",
        );
        assert!(msg.validate().is_ok());
        assert_eq!(msg.content_types().bits(), 0b1001);
        assert_eq!(msg.content_string(), "look @All");
    }
}
