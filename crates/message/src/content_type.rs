//! Content-type index.
//!
//! Every [`MessageElement`](crate::MessageElement) kind has a fixed ordinal.
//! A message's index is the bitmask with bit *k* set iff at least one element
//! of ordinal *k* is present. The ordinals are persisted, so they never
//! change; new kinds only ever append.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{element::MessageElement, error::Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ContentKind {
    PlainText = 0,
    Image = 1,
    At = 2,
    AtAll = 3,
    Audio = 4,
    File = 5,
    Location = 6,
    QuoteReply = 7,
    Video = 8,
    Forward = 9,
    Unsupported = 10,
}

impl ContentKind {
    pub const ALL: [ContentKind; 11] = [
        Self::PlainText,
        Self::Image,
        Self::At,
        Self::AtAll,
        Self::Audio,
        Self::File,
        Self::Location,
        Self::QuoteReply,
        Self::Video,
        Self::Forward,
        Self::Unsupported,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn bit(self) -> u32 {
        1 << self.ordinal()
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(usize::from(ordinal)).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlainText => "plain_text",
            Self::Image => "image",
            Self::At => "at",
            Self::AtAll => "at_all",
            Self::Audio => "audio",
            Self::File => "file",
            Self::Location => "location",
            Self::QuoteReply => "quote_reply",
            Self::Video => "video",
            Self::Forward => "forward",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

/// Bitmask of the element kinds present in one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentTypes(u32);

impl ContentTypes {
    pub fn from_elements(elements: &[MessageElement]) -> Self {
        Self(
            elements
                .iter()
                .fold(0, |mask, element| mask | element.kind().bit()),
        )
    }

    /// Rebuild from a stored value. Bits past the last known kind are dropped.
    pub fn from_bits(bits: u32) -> Self {
        let known = ContentKind::ALL.iter().fold(0, |mask, kind| mask | kind.bit());
        Self(bits & known)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, kind: ContentKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Kinds present, in ordinal order.
    pub fn kinds(self) -> Vec<ContentKind> {
        ContentKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind))
            .collect()
    }
}

impl fmt::Display for ContentTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.kinds().into_iter().map(ContentKind::as_str).collect();
        write!(f, "{}", names.join("|"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, crate::contact::Contact, rstest::rstest};

    fn text() -> MessageElement {
        MessageElement::text("hi")
    }

    fn image() -> MessageElement {
        MessageElement::Image {
            width: 0,
            height: 0,
            file_name: None,
            resource: Default::default(),
        }
    }

    fn at() -> MessageElement {
        MessageElement::At {
            target: Contact::new("1", Default::default()),
        }
    }

    #[test]
    fn single_plain_text_sets_exactly_bit_zero() {
        assert_eq!(ContentTypes::from_elements(&[text()]).bits(), 1);
    }

    #[rstest]
    #[case(vec![text(), image(), at()])]
    #[case(vec![at(), text(), image()])]
    #[case(vec![image(), at(), text(), text()])]
    fn mask_is_order_independent(#[case] elements: Vec<MessageElement>) {
        let mask = ContentTypes::from_elements(&elements);
        let expected =
            ContentKind::PlainText.bit() | ContentKind::Image.bit() | ContentKind::At.bit();
        assert_eq!(mask.bits(), expected);
        assert_eq!(mask.bits(), 0b111);
    }

    #[test]
    fn unsupported_has_its_own_bit() {
        let mask = ContentTypes::from_elements(&[MessageElement::Unsupported]);
        assert_eq!(mask.bits(), 1 << 10);
        assert_eq!(mask.kinds(), vec![ContentKind::Unsupported]);
    }

    #[test]
    fn empty_list_has_empty_mask() {
        assert!(ContentTypes::from_elements(&[]).is_empty());
    }

    #[rstest]
    #[case(ContentKind::PlainText, 0)]
    #[case(ContentKind::Image, 1)]
    #[case(ContentKind::At, 2)]
    #[case(ContentKind::AtAll, 3)]
    #[case(ContentKind::Audio, 4)]
    #[case(ContentKind::File, 5)]
    #[case(ContentKind::Location, 6)]
    #[case(ContentKind::QuoteReply, 7)]
    #[case(ContentKind::Video, 8)]
    #[case(ContentKind::Forward, 9)]
    #[case(ContentKind::Unsupported, 10)]
    fn ordinals_are_fixed(#[case] kind: ContentKind, #[case] ordinal: u8) {
        assert_eq!(kind.ordinal(), ordinal);
        assert_eq!(ContentKind::from_ordinal(ordinal), Some(kind));
    }

    #[test]
    fn from_bits_drops_unknown_bits() {
        let mask = ContentTypes::from_bits(0b11 | (1 << 20));
        assert_eq!(mask.bits(), 0b11);
    }

    #[test]
    fn parses_kind_names() {
        assert_eq!(
            "quote_reply".parse::<ContentKind>().unwrap(),
            ContentKind::QuoteReply
        );
        assert!("sticker".parse::<ContentKind>().is_err());
    }

    #[test]
    fn display_lists_kinds() {
        let mask = ContentTypes::from_elements(&[image(), text()]);
        assert_eq!(mask.to_string(), "plain_text|image");
    }
}
