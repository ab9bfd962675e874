//! OneBot 11 extension: a forward WebSocket client for any OneBot 11
//! implementation, registered as a built-in.

pub mod client;
pub mod compat;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod segment;

use std::sync::Arc;

use parabox_extension::{
    BuiltInRegistry, ConfigItem, ConnectionFactory, ExtensionDescriptor, InputType, LoadError,
    ParaboxConnection,
};

pub use {
    config::OneBotConfig,
    connection::{OneBotConnection, Timings},
    error::{Error, Result},
};

pub const EXTENSION_KEY: &str = "onebot11";

pub fn descriptor() -> ExtensionDescriptor {
    ExtensionDescriptor::built_in(
        EXTENSION_KEY,
        "OneBot 11",
        "Universal chat bot application interface standard (version 11)",
    )
    .with_config_items(config_items())
}

fn text_input(
    key: &str,
    title: &str,
    description: &str,
    input_type: InputType,
    required: bool,
) -> ConfigItem {
    ConfigItem::TextInput {
        key: key.into(),
        title: title.into(),
        description: description.into(),
        label: title.into(),
        input_type,
        default: None,
        required,
    }
}

pub fn config_items() -> Vec<ConfigItem> {
    vec![
        ConfigItem::Category {
            key: "category_general".into(),
            title: "General".into(),
            description: "General settings".into(),
        },
        text_input(
            "host",
            "Host",
            "Address of the OneBot forward WebSocket server",
            InputType::Text,
            true,
        ),
        text_input(
            "port",
            "Port",
            "Port of the OneBot forward WebSocket server",
            InputType::Number,
            true,
        ),
        text_input("token", "Access token", "Leave empty if none", InputType::Password, false),
        ConfigItem::Category {
            key: "category_advanced".into(),
            title: "Advanced".into(),
            description: "Advanced settings".into(),
        },
        ConfigItem::TextInput {
            key: "heart_interval".into(),
            title: "Heartbeat interval".into(),
            description: "Seconds between client pings".into(),
            label: "Seconds".into(),
            input_type: InputType::Number,
            default: Some("10".into()),
            required: false,
        },
        ConfigItem::Switch {
            key: "auto_reconnect".into(),
            title: "Auto reconnect".into(),
            description: "Reconnect when OneBot is disabled or stops sending heartbeats".into(),
            default: false,
        },
        ConfigItem::Switch {
            key: "compatibility_mode".into(),
            title: "Compatibility mode".into(),
            description: "Enable conventions outside the protocol, such as avatar URLs".into(),
            default: false,
        },
    ]
}

#[derive(Debug, Default)]
pub struct OneBotFactory {
    timings: Timings,
}

impl OneBotFactory {
    pub fn with_timings(timings: Timings) -> Self {
        Self { timings }
    }
}

impl ConnectionFactory for OneBotFactory {
    fn create(&self) -> std::result::Result<Arc<dyn ParaboxConnection>, LoadError> {
        Ok(Arc::new(OneBotConnection::with_timings(self.timings)))
    }
}

/// Add the OneBot 11 extension to a built-in registry.
pub fn register(registry: &mut BuiltInRegistry) {
    registry.register(descriptor(), Arc::new(OneBotFactory::default()));
}
