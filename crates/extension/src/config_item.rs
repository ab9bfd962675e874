//! Settings an extension asks the setup wizard for.

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    Text,
    Number,
    Password,
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigItem {
    /// Heading that groups the items after it. Holds no value.
    Category {
        key: String,
        title: String,
        #[serde(default)]
        description: String,
    },
    TextInput {
        key: String,
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        label: String,
        #[serde(default)]
        input_type: InputType,
        #[serde(default)]
        default: Option<String>,
        #[serde(default)]
        required: bool,
    },
    Select {
        key: String,
        title: String,
        #[serde(default)]
        description: String,
        options: Vec<String>,
        #[serde(default)]
        default: Option<usize>,
    },
    Switch {
        key: String,
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        default: bool,
    },
}

impl ConfigItem {
    pub fn key(&self) -> &str {
        match self {
            Self::Category { key, .. }
            | Self::TextInput { key, .. }
            | Self::Select { key, .. }
            | Self::Switch { key, .. } => key,
        }
    }

    fn default_value(&self) -> Option<serde_json::Value> {
        match self {
            Self::Category { .. } => None,
            Self::TextInput { default, .. } => default.clone().map(serde_json::Value::String),
            Self::Select {
                options, default, ..
            } => default
                .and_then(|idx| options.get(idx))
                .cloned()
                .map(serde_json::Value::String),
            Self::Switch { default, .. } => Some(serde_json::Value::Bool(*default)),
        }
    }
}

/// Fill keys the user left unset with each item's default. Existing values win.
pub fn apply_defaults(items: &[ConfigItem], config: &mut ConnectionConfig) {
    for item in items {
        if config.contains_key(item.key()) {
            continue;
        }
        if let Some(value) = item.default_value() {
            config.insert(item.key().to_string(), value);
        }
    }
}

/// Keys of required text inputs that have neither a value nor a default.
pub fn missing_required(items: &[ConfigItem], config: &ConnectionConfig) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            ConfigItem::TextInput {
                key,
                required: true,
                default: None,
                ..
            } => {
                let present = config.get(key).is_some_and(|v| match v {
                    serde_json::Value::Null => false,
                    serde_json::Value::String(s) => !s.trim().is_empty(),
                    _ => true,
                });
                (!present).then(|| key.clone())
            },
            _ => None,
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, serde_json::json};

    fn items() -> Vec<ConfigItem> {
        vec![
            ConfigItem::TextInput {
                key: "host".into(),
                title: "Host".into(),
                description: String::new(),
                label: "host".into(),
                input_type: InputType::Text,
                default: None,
                required: true,
            },
            ConfigItem::TextInput {
                key: "heart_interval".into(),
                title: "Heartbeat".into(),
                description: String::new(),
                label: "seconds".into(),
                input_type: InputType::Number,
                default: Some("10".into()),
                required: false,
            },
            ConfigItem::Select {
                key: "mode".into(),
                title: "Mode".into(),
                description: String::new(),
                options: vec!["forward".into(), "reverse".into()],
                default: Some(0),
            },
            ConfigItem::Switch {
                key: "auto_reconnect".into(),
                title: "Auto reconnect".into(),
                description: String::new(),
                default: false,
            },
        ]
    }

    #[test]
    fn defaults_fill_only_missing_keys() {
        let mut config = json!({ "auto_reconnect": true })
            .as_object()
            .cloned()
            .unwrap();
        apply_defaults(&items(), &mut config);
        assert_eq!(config["auto_reconnect"], json!(true));
        assert_eq!(config["heart_interval"], json!("10"));
        assert_eq!(config["mode"], json!("forward"));
        assert!(!config.contains_key("host"));
    }

    #[test]
    fn blank_required_value_is_missing() {
        let config = json!({ "host": "  " }).as_object().cloned().unwrap();
        assert_eq!(missing_required(&items(), &config), vec!["host"]);
        let config = json!({ "host": "127.0.0.1" }).as_object().cloned().unwrap();
        assert!(missing_required(&items(), &config).is_empty());
    }

    #[test]
    fn parses_from_manifest_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            config: Vec<ConfigItem>,
        }
        let raw = r#"
[[config]]
type = "text_input"
key = "token"
title = "Token"
input_type = "password"

[[config]]
type = "switch"
key = "debug"
title = "Debug"
default = true
"#;
        let parsed: Wrapper = toml::from_str(raw).unwrap();
        assert_eq!(parsed.config.len(), 2);
        assert_eq!(parsed.config[0].key(), "token");
        assert!(matches!(
            parsed.config[0],
            ConfigItem::TextInput {
                input_type: InputType::Password,
                required: false,
                ..
            }
        ));
    }
}
