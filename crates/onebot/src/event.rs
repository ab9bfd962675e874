//! Frames a OneBot 11 implementation pushes over the forward WebSocket.

use {
    parabox_common::time::secs_to_ms,
    parabox_message::{BasicInfo, Chat, ChatType, Contact, ReceiveMessage},
    serde::{Deserialize, Deserializer},
    serde_json::Value,
};

use crate::{
    error::{Error, Result},
    segment::{self, MessagePayload},
};

/// A decoded frame: either the answer to an action or a pushed event.
#[derive(Debug, Clone)]
pub enum Frame {
    Response(ActionResponse),
    Event(Event),
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        if value.get("post_type").is_none() && value.get("echo").is_some() {
            return Ok(Self::Response(serde_json::from_value(value)?));
        }
        Ok(Self::Event(serde_json::from_value(value)?))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionResponse {
    pub status: String,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub echo: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub wording: Option<String>,
}

impl ActionResponse {
    pub fn echo(&self) -> Option<String> {
        match self.echo.as_ref()? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// `ok` and `async` carry data; anything else is a failed action.
    pub fn into_data(self, action: &str) -> Result<Value> {
        match self.status.as_str() {
            "ok" | "async" => Ok(self.data),
            _ => Err(Error::Action {
                action: action.to_string(),
                retcode: self.retcode,
                message: self
                    .wording
                    .or(self.message)
                    .unwrap_or(self.status),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "post_type", rename_all = "snake_case")]
pub enum Event {
    MetaEvent(MetaEvent),
    Message(MessageEvent),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "meta_event_type", rename_all = "snake_case")]
pub enum MetaEvent {
    Lifecycle {
        #[serde(default)]
        sub_type: String,
    },
    Heartbeat {
        /// Milliseconds until the next heartbeat.
        #[serde(default)]
        interval: Option<i64>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Private,
    Group,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub card: Option<String>,
}

/// A message event, or the body of a `get_msg` answer, which has the same shape.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(deserialize_with = "string_or_number")]
    pub message_id: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub message: MessagePayload,
    #[serde(default)]
    pub sender: Sender,
    /// Unix seconds.
    #[serde(default)]
    pub time: i64,
}

impl MessageEvent {
    pub fn sender_id(&self) -> Option<i64> {
        self.sender.user_id.or(self.user_id)
    }

    pub fn sender_contact(&self) -> Option<Contact> {
        let uid = self.sender_id()?;
        Some(Contact::new(uid.to_string(), BasicInfo {
            name: self.sender.nickname.clone(),
            ..BasicInfo::default()
        }))
    }

    /// Normalize into an inbound message. `None` for message types the host
    /// has no chat for, or when the sender is unknown.
    pub fn into_receive_message(self) -> Option<ReceiveMessage> {
        let sender = self.sender_contact()?;
        let chat = match self.message_type {
            MessageType::Private => Chat::new(
                sender.uid.clone(),
                ChatType::Private,
                BasicInfo {
                    name: self.sender.nickname.clone(),
                    ..BasicInfo::default()
                },
            ),
            MessageType::Group => {
                Chat::new(self.group_id?.to_string(), ChatType::Group, BasicInfo::default())
            },
            MessageType::Other => return None,
        };
        Some(ReceiveMessage {
            contents: segment::to_elements(&self.message),
            sender,
            chat,
            timestamp: secs_to_ms(self.time),
            uuid: self.message_id,
        })
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, parabox_message::MessageElement, serde_json::json};

    fn event(value: Value) -> Event {
        match Frame::parse(&value.to_string()).unwrap() {
            Frame::Event(event) => event,
            Frame::Response(_) => panic!("expected event"),
        }
    }

    #[test]
    fn lifecycle_and_heartbeat() {
        let connect = event(json!({
            "post_type": "meta_event", "meta_event_type": "lifecycle",
            "sub_type": "connect", "time": 1, "self_id": 10
        }));
        assert!(matches!(
            connect,
            Event::MetaEvent(MetaEvent::Lifecycle { ref sub_type }) if sub_type == "connect"
        ));

        let heartbeat = event(json!({
            "post_type": "meta_event", "meta_event_type": "heartbeat",
            "interval": 5000, "status": { "online": true }, "time": 2, "self_id": 10
        }));
        assert!(matches!(
            heartbeat,
            Event::MetaEvent(MetaEvent::Heartbeat { interval: Some(5000) })
        ));
    }

    #[test]
    fn notices_are_ignored() {
        let notice = event(json!({
            "post_type": "notice", "notice_type": "group_increase", "time": 1
        }));
        assert!(matches!(notice, Event::Other));
    }

    #[test]
    fn response_is_told_apart_by_echo() {
        let frame = Frame::parse(
            &json!({ "status": "failed", "retcode": 100, "data": null, "echo": "e1", "wording": "no such group" })
                .to_string(),
        )
        .unwrap();
        let Frame::Response(response) = frame else {
            panic!("expected response");
        };
        assert_eq!(response.echo().as_deref(), Some("e1"));
        let err = response.into_data("get_group_info").unwrap_err();
        assert_eq!(
            err.to_string(),
            "action get_group_info failed with retcode 100: no such group"
        );
    }

    #[test]
    fn private_message_uses_sender_as_chat() {
        let Event::Message(msg) = event(json!({
            "post_type": "message", "message_type": "private", "sub_type": "friend",
            "message_id": 1234, "user_id": 42, "time": 1700000000,
            "message": [{ "type": "text", "data": { "text": "hello" } }],
            "sender": { "user_id": 42, "nickname": "alice" }
        })) else {
            panic!("expected message");
        };
        let received = msg.into_receive_message().unwrap();
        assert_eq!(received.uuid, "1234");
        assert_eq!(received.timestamp, 1_700_000_000_000);
        assert_eq!(received.chat.chat_type, ChatType::Private);
        assert_eq!(received.chat.uid, "42");
        assert_eq!(received.chat.basic_info.name.as_deref(), Some("alice"));
        assert_eq!(received.contents, vec![MessageElement::text("hello")]);
    }

    #[test]
    fn group_message_uses_group_as_chat() {
        let Event::Message(msg) = event(json!({
            "post_type": "message", "message_type": "group", "sub_type": "normal",
            "message_id": "-2147483000", "group_id": 900, "user_id": 42, "time": 1700000001,
            "message": "plain cq text",
            "sender": { "user_id": 42, "nickname": "alice", "card": "Al" }
        })) else {
            panic!("expected message");
        };
        let received = msg.into_receive_message().unwrap();
        assert_eq!(received.uuid, "-2147483000");
        assert_eq!(received.chat.chat_type, ChatType::Group);
        assert_eq!(received.chat.uid, "900");
        assert_eq!(received.chat.basic_info.name, None);
        assert_eq!(received.sender.uid, "42");
        assert_eq!(received.contents, vec![MessageElement::text("plain cq text")]);
    }

    #[test]
    fn group_message_without_group_id_is_dropped() {
        let Event::Message(msg) = event(json!({
            "post_type": "message", "message_type": "group",
            "message_id": 1, "user_id": 42, "time": 1, "message": []
        })) else {
            panic!("expected message");
        };
        assert!(msg.into_receive_message().is_none());
    }
}
