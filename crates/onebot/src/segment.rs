//! Translation between OneBot message segments and [`MessageElement`]s.

use {
    parabox_message::{
        BasicInfo, Contact, ForwardNode, MessageElement, RemoteInfo, ResourceInfo,
    },
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value, json},
};

use crate::compat::face_emoji;

/// One element of an array-format OneBot message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Segment {
    pub fn new(kind: &str, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            kind: kind.to_string(),
            data,
        }
    }

    /// A data field as text. Implementations disagree on strings versus numbers.
    pub fn field(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A message body: either a segment array or a CQ-code string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessagePayload {
    Segments(Vec<Segment>),
    Text(String),
}

impl Default for MessagePayload {
    fn default() -> Self {
        Self::Segments(Vec::new())
    }
}

pub fn to_elements(payload: &MessagePayload) -> Vec<MessageElement> {
    match payload {
        MessagePayload::Segments(segments) => segments.iter().map(to_element).collect(),
        // CQ codes are not parsed; the raw string is kept as text.
        MessagePayload::Text(text) if text.is_empty() => Vec::new(),
        MessagePayload::Text(text) => vec![MessageElement::text(text.clone())],
    }
}

pub fn to_element(segment: &Segment) -> MessageElement {
    match segment.kind.as_str() {
        "text" => MessageElement::text(segment.field("text").unwrap_or_default()),
        "image" => MessageElement::Image {
            width: 0,
            height: 0,
            file_name: segment.field("file").as_deref().and_then(file_name),
            resource: resource(segment),
        },
        "at" => match segment.field("qq") {
            Some(qq) if qq == "all" => MessageElement::AtAll,
            Some(qq) => MessageElement::At {
                target: Contact::new(qq, BasicInfo {
                    name: segment.field("name"),
                    ..BasicInfo::default()
                }),
            },
            None => MessageElement::Unsupported,
        },
        "location" => {
            let lat = segment.field("lat").and_then(|v| v.parse::<f64>().ok());
            let lon = segment.field("lon").and_then(|v| v.parse::<f64>().ok());
            match (lat, lon) {
                (Some(latitude), Some(longitude)) => MessageElement::Location {
                    latitude,
                    longitude,
                    name: segment.field("title"),
                    description: segment.field("content"),
                },
                _ => MessageElement::Unsupported,
            }
        },
        "record" => MessageElement::Audio {
            length: 0,
            file_name: segment.field("file").as_deref().and_then(file_name),
            file_size: 0,
            resource: resource(segment),
        },
        "video" => MessageElement::Video {
            file_name: segment.field("file").as_deref().and_then(file_name),
            resource: resource(segment),
        },
        "face" => segment
            .field("id")
            .and_then(|id| id.parse::<i64>().ok())
            .and_then(face_emoji)
            .map(MessageElement::text)
            .unwrap_or(MessageElement::Unsupported),
        "node" => {
            let sender = segment.field("user_id").map(|uid| {
                Contact::new(uid, BasicInfo {
                    name: segment.field("nickname"),
                    ..BasicInfo::default()
                })
            });
            let messages = segment
                .data
                .get("content")
                .cloned()
                .and_then(|content| serde_json::from_value::<MessagePayload>(content).ok())
                .map(|payload| to_elements(&payload))
                .unwrap_or_default();
            MessageElement::QuoteReply {
                sender,
                timestamp: None,
                id: segment.field("id"),
                messages,
            }
        },
        "forward" => MessageElement::Forward {
            nodes: vec![ForwardNode {
                sender: None,
                timestamp: None,
                id: segment.field("id"),
                messages: Vec::new(),
            }],
        },
        "reply" => MessageElement::QuoteReply {
            sender: None,
            timestamp: None,
            id: segment.field("id"),
            messages: Vec::new(),
        },
        _ => MessageElement::Unsupported,
    }
}

/// Outbound segment for an element, or `None` if OneBot cannot carry it.
pub fn from_element(element: &MessageElement) -> Option<Segment> {
    let segment = match element {
        MessageElement::PlainText { text } => Segment::new("text", json!({ "text": text })),
        MessageElement::At { target } => Segment::new("at", json!({ "qq": target.uid })),
        MessageElement::AtAll => Segment::new("at", json!({ "qq": "all" })),
        MessageElement::Location {
            latitude,
            longitude,
            name,
            description,
        } => {
            let mut data = json!({ "lat": latitude.to_string(), "lon": longitude.to_string() });
            if let Some(name) = name {
                data["title"] = json!(name);
            }
            if let Some(description) = description {
                data["content"] = json!(description);
            }
            Segment::new("location", data)
        },
        MessageElement::Image { resource, .. } => {
            Segment::new("image", json!({ "file": outbound_file(resource)? }))
        },
        MessageElement::Audio { resource, .. } => {
            Segment::new("record", json!({ "file": outbound_file(resource)? }))
        },
        MessageElement::Video { resource, .. } => {
            Segment::new("video", json!({ "file": outbound_file(resource)? }))
        },
        MessageElement::QuoteReply { id: Some(id), .. } => {
            Segment::new("reply", json!({ "id": id }))
        },
        _ => return None,
    };
    Some(segment)
}

/// Prefer the remote URL; a local path is sent as a `file://` URI.
fn outbound_file(resource: &ResourceInfo) -> Option<String> {
    match resource {
        ResourceInfo::Remote(remote) | ResourceInfo::Synced { remote, .. }
            if remote.url().is_some() =>
        {
            remote.url().map(str::to_string)
        },
        ResourceInfo::Local(local) | ResourceInfo::Synced { local, .. } => {
            if local.uri.contains("://") {
                Some(local.uri.clone())
            } else {
                Some(format!("file://{}", local.uri))
            }
        },
        _ => None,
    }
}

fn resource(segment: &Segment) -> ResourceInfo {
    match (segment.field("url"), segment.field("file")) {
        (Some(url), _) if !url.is_empty() => ResourceInfo::Remote(RemoteInfo::Url { url }),
        (_, Some(file)) if !file.is_empty() => ResourceInfo::local(file),
        _ => ResourceInfo::Empty,
    }
}

fn file_name(path: &str) -> Option<String> {
    path.rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, rstest::rstest};

    fn segment(value: Value) -> Segment {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn text_and_at() {
        let elements = to_elements(&MessagePayload::Segments(vec![
            segment(json!({ "type": "text", "data": { "text": "hi " } })),
            segment(json!({ "type": "at", "data": { "qq": 10001 } })),
            segment(json!({ "type": "at", "data": { "qq": "all" } })),
        ]));
        assert_eq!(elements[0], MessageElement::text("hi "));
        assert!(matches!(&elements[1], MessageElement::At { target } if target.uid == "10001"));
        assert_eq!(elements[2], MessageElement::AtAll);
    }

    #[test]
    fn image_prefers_url_over_file() {
        let element = to_element(&segment(json!({
            "type": "image",
            "data": { "file": "/data/cache/abc.jpg", "url": "https://img.example/abc.jpg" }
        })));
        let MessageElement::Image {
            file_name, resource, ..
        } = element
        else {
            panic!("expected image");
        };
        assert_eq!(file_name.as_deref(), Some("abc.jpg"));
        assert_eq!(resource, ResourceInfo::url("https://img.example/abc.jpg"));
    }

    #[test]
    fn record_without_url_is_local() {
        let element = to_element(&segment(json!({
            "type": "record", "data": { "file": "voice.amr" }
        })));
        assert!(matches!(
            element,
            MessageElement::Audio { resource: ResourceInfo::Local(_), .. }
        ));
    }

    #[rstest]
    #[case(json!({ "lat": "39.9", "lon": "116.3", "title": "office" }), true)]
    #[case(json!({ "lat": 39.9, "lon": 116.3 }), true)]
    #[case(json!({ "lat": "north", "lon": "116.3" }), false)]
    #[case(json!({ "lat": "39.9" }), false)]
    fn location_needs_both_coordinates(#[case] data: Value, #[case] parsed: bool) {
        let element = to_element(&Segment::new("location", data));
        assert_eq!(matches!(element, MessageElement::Location { .. }), parsed);
        assert_eq!(element == MessageElement::Unsupported, !parsed);
    }

    #[rstest]
    #[case("14", MessageElement::text("😊"))]
    #[case("17", MessageElement::Unsupported)]
    #[case("smile", MessageElement::Unsupported)]
    fn faces(#[case] id: &str, #[case] expected: MessageElement) {
        assert_eq!(to_element(&Segment::new("face", json!({ "id": id }))), expected);
    }

    #[test]
    fn reply_forward_and_node() {
        let reply = to_element(&Segment::new("reply", json!({ "id": "77" })));
        assert!(matches!(reply, MessageElement::QuoteReply { id: Some(ref id), .. } if id == "77"));

        let forward = to_element(&Segment::new("forward", json!({ "id": "fw1" })));
        let MessageElement::Forward { nodes } = forward else {
            panic!("expected forward");
        };
        assert_eq!(nodes[0].id.as_deref(), Some("fw1"));

        let node = to_element(&Segment::new(
            "node",
            json!({
                "user_id": "42",
                "nickname": "alice",
                "content": [{ "type": "text", "data": { "text": "inner" } }]
            }),
        ));
        let MessageElement::QuoteReply {
            sender, messages, ..
        } = node
        else {
            panic!("expected quote");
        };
        assert_eq!(sender.unwrap().display_name(), "alice");
        assert_eq!(messages, vec![MessageElement::text("inner")]);
    }

    #[test]
    fn unknown_segment_is_unsupported() {
        let element = to_element(&Segment::new("poke", json!({ "qq": "1" })));
        assert_eq!(element, MessageElement::Unsupported);
    }

    #[test]
    fn cq_string_is_one_text_element() {
        let payload: MessagePayload = serde_json::from_value(json!("[CQ:face,id=14]hello")).unwrap();
        assert_eq!(to_elements(&payload), vec![MessageElement::text(
            "[CQ:face,id=14]hello"
        )]);
    }

    #[test]
    fn outbound_mapping_skips_what_onebot_cannot_carry() {
        let elements = vec![
            MessageElement::text("hi"),
            MessageElement::AtAll,
            MessageElement::Image {
                width: 0,
                height: 0,
                file_name: None,
                resource: ResourceInfo::local("/tmp/a.png"),
            },
            MessageElement::Video {
                file_name: None,
                resource: ResourceInfo::Empty,
            },
            MessageElement::QuoteReply {
                sender: None,
                timestamp: None,
                id: Some("9".into()),
                messages: Vec::new(),
            },
            MessageElement::Unsupported,
        ];
        let segments: Vec<Segment> = elements.iter().filter_map(from_element).collect();
        let kinds: Vec<&str> = segments.iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, ["text", "at", "image", "reply"]);
        assert_eq!(segments[2].field("file").as_deref(), Some("file:///tmp/a.png"));
    }
}
