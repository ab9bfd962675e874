use serde::{Deserialize, Serialize};

use crate::{contact::Contact, content_type::ContentKind, resource::ResourceInfo};

/// One typed unit of message content.
///
/// The set is closed: anything an extension cannot map lands in
/// [`MessageElement::Unsupported`], which is also what an unknown tag decodes to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageElement {
    PlainText {
        text: String,
    },
    Image {
        #[serde(default)]
        width: u32,
        #[serde(default)]
        height: u32,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        resource: ResourceInfo,
    },
    At {
        target: Contact,
    },
    AtAll,
    Audio {
        /// Duration in milliseconds.
        #[serde(default)]
        length: u64,
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        file_size: u64,
        #[serde(default)]
        resource: ResourceInfo,
    },
    File {
        name: String,
        #[serde(default)]
        extension: String,
        #[serde(default)]
        size: u64,
        #[serde(default)]
        last_modified_time: i64,
        #[serde(default)]
        resource: ResourceInfo,
    },
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    QuoteReply {
        #[serde(default)]
        sender: Option<Contact>,
        #[serde(default)]
        timestamp: Option<i64>,
        /// Backend id of the quoted message, if the backend exposes one.
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        messages: Vec<MessageElement>,
    },
    Video {
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        resource: ResourceInfo,
    },
    Forward {
        nodes: Vec<ForwardNode>,
    },
    #[serde(other)]
    Unsupported,
}

/// One entry of a merged-forward bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardNode {
    #[serde(default)]
    pub sender: Option<Contact>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub messages: Vec<MessageElement>,
}

impl MessageElement {
    pub fn text(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            Self::PlainText { .. } => ContentKind::PlainText,
            Self::Image { .. } => ContentKind::Image,
            Self::At { .. } => ContentKind::At,
            Self::AtAll => ContentKind::AtAll,
            Self::Audio { .. } => ContentKind::Audio,
            Self::File { .. } => ContentKind::File,
            Self::Location { .. } => ContentKind::Location,
            Self::QuoteReply { .. } => ContentKind::QuoteReply,
            Self::Video { .. } => ContentKind::Video,
            Self::Forward { .. } => ContentKind::Forward,
            Self::Unsupported => ContentKind::Unsupported,
        }
    }

    /// Short plain-text rendering used for previews and notifications.
    pub fn content_to_string(&self) -> String {
        match self {
            Self::PlainText { text } => text.clone(),
            Self::Image { .. } => "[Image]".into(),
            Self::At { target } => format!("@{}", target.display_name()),
            Self::AtAll => "@All".into(),
            Self::Audio { .. } => "[Audio]".into(),
            Self::File { name, .. } => format!("[File]{name}"),
            Self::Location { .. } => "[Location]".into(),
            Self::QuoteReply { .. } => "[Quote Reply]".into(),
            Self::Video { .. } => "[Video]".into(),
            Self::Forward { .. } => "[Forward]".into(),
            Self::Unsupported => "[Unsupported]".into(),
        }
    }
}

/// Preview text of a whole element list.
pub fn content_string(elements: &[MessageElement]) -> String {
    elements
        .iter()
        .map(MessageElement::content_to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use {super::*, crate::contact::BasicInfo};

    #[test]
    fn at_renders_name_or_uid() {
        let named = MessageElement::At {
            target: Contact::new("42", BasicInfo::named("bob")),
        };
        let anon = MessageElement::At {
            target: Contact::new("42", BasicInfo::default()),
        };
        assert_eq!(named.content_to_string(), "@bob");
        assert_eq!(anon.content_to_string(), "@42");
    }

    #[test]
    fn preview_joins_with_spaces() {
        let elements = vec![
            MessageElement::AtAll,
            MessageElement::text("meeting at 3"),
            MessageElement::File {
                name: "agenda.pdf".into(),
                extension: "pdf".into(),
                size: 1024,
                last_modified_time: 0,
                resource: ResourceInfo::Empty,
            },
        ];
        assert_eq!(content_string(&elements), "@All meeting at 3 [File]agenda.pdf");
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(MessageElement::AtAll.kind(), ContentKind::AtAll);
        assert_eq!(
            MessageElement::Forward { nodes: vec![] }.kind(),
            ContentKind::Forward
        );
    }
}
