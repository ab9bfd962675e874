//! On-disk encoding of element lists.
//!
//! Contents are stored as a JSON array of internally tagged elements:
//!
//! ```text
//! [{"type":"plain_text","text":"hi"},{"type":"at","target":{"uid":"42"}}]
//! ```
//!
//! Decoding is element-wise: an element whose tag this build does not know
//! decodes to `Unsupported` instead of failing the whole message.

use crate::{
    element::MessageElement,
    error::{Error, Result},
};

pub fn encode_contents(elements: &[MessageElement]) -> Result<String> {
    Ok(serde_json::to_string(elements)?)
}

pub fn decode_contents(raw: &str) -> Result<Vec<MessageElement>> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(raw).map_err(Error::CorruptContents)?;
    Ok(values.into_iter().map(decode_element).collect())
}

fn decode_element(value: serde_json::Value) -> MessageElement {
    serde_json::from_value(value).unwrap_or(MessageElement::Unsupported)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        crate::{
            contact::{BasicInfo, Contact},
            element::ForwardNode,
            resource::ResourceInfo,
        },
    };

    #[test]
    fn nested_forward_survives_storage() {
        let elements = vec![
            MessageElement::text("fwd:"),
            MessageElement::Forward {
                nodes: vec![ForwardNode {
                    sender: Some(Contact::new("7", BasicInfo::named("carol"))),
                    timestamp: Some(1_700_000_000_000),
                    id: Some("f1".into()),
                    messages: vec![MessageElement::Image {
                        width: 10,
                        height: 20,
                        file_name: Some("a.png".into()),
                        resource: ResourceInfo::url("https://img/a.png"),
                    }],
                }],
            },
        ];
        let raw = encode_contents(&elements).unwrap();
        assert_eq!(decode_contents(&raw).unwrap(), elements);
    }

    #[test]
    fn tag_layout_is_stable() {
        let raw = encode_contents(&[MessageElement::AtAll, MessageElement::text("x")]).unwrap();
        assert_eq!(
            raw,
            r#"[{"type":"at_all"},{"type":"plain_text","text":"x"}]"#
        );
    }

    #[test]
    fn unknown_tag_degrades_to_unsupported() {
        let raw = r#"[{"type":"sticker","id":"s1"},{"type":"plain_text","text":"ok"}]"#;
        let decoded = decode_contents(raw).unwrap();
        assert_eq!(
            decoded,
            vec![MessageElement::Unsupported, MessageElement::text("ok")]
        );
    }

    #[test]
    fn malformed_known_element_degrades_to_unsupported() {
        let raw = r#"[{"type":"location","latitude":"north"}]"#;
        assert_eq!(
            decode_contents(raw).unwrap(),
            vec![MessageElement::Unsupported]
        );
    }

    #[test]
    fn non_array_is_an_error() {
        let err = decode_contents(r#"{"type":"plain_text"}"#).unwrap_err();
        assert!(err.to_string().contains("not a JSON array"));
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let raw = r#"[{"type":"image"}]"#;
        let decoded = decode_contents(raw).unwrap();
        assert_eq!(
            decoded,
            vec![MessageElement::Image {
                width: 0,
                height: 0,
                file_name: None,
                resource: ResourceInfo::Empty,
            }]
        );
    }
}
