//! Normalized message content shared by every extension.
//!
//! Extensions translate their backend payloads into [`MessageElement`] lists;
//! the host stores them through [`codec`] and indexes them with
//! [`ContentTypes`] so stored messages can be filtered by kind without being
//! decoded.

pub mod codec;
pub mod contact;
pub mod content_type;
pub mod element;
pub mod error;
pub mod message;
pub mod resource;

pub use {
    contact::{BasicInfo, Chat, ChatType, Contact},
    content_type::{ContentKind, ContentTypes},
    element::{ForwardNode, MessageElement, content_string},
    error::{Error, Result},
    message::{ReceiveMessage, SendMessage},
    resource::{LocalInfo, RemoteInfo, ResourceInfo},
};
