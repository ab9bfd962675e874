//! `parabox run`: bring every configured connection up and keep it running
//! until Ctrl-C.

use std::{collections::HashMap, sync::Arc};

use {
    parabox_config::ParaboxConfig,
    parabox_extension::{
        ConnectionManager, ConnectionRecord, ConnectionStore, DefaultLoader, ExtensionDescriptor,
        ExtensionLoader, HostContext, LifecycleEvent, LifecycleSource, StoredConnection,
        config_item::{apply_defaults, missing_required},
    },
    parabox_store::SqliteStore,
    tracing::{info, warn},
};

use crate::extension_commands::build_loader;

/// Open the database at the configured path, creating it if needed.
pub async fn open_store(config: &ParaboxConfig) -> anyhow::Result<SqliteStore> {
    let path = config.database_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let url = format!("sqlite:{}?mode=rwc", path.display());
    SqliteStore::new(&url).await
}

/// Write the connections listed in the config file to the database so they
/// get stable ids.
async fn persist_connections(config: &ParaboxConfig, store: &SqliteStore) -> anyhow::Result<()> {
    for entry in &config.connections {
        let connection_id = store
            .upsert(StoredConnection {
                connection_id: 0,
                alias: entry.alias.clone(),
                name: entry.alias.clone(),
                extension_key: entry.extension.clone(),
                config: entry.config.clone(),
                created_at: 0,
                updated_at: 0,
            })
            .await?;
        info!(connection_id, alias = %entry.alias, key = %entry.extension, "connection persisted");
    }
    Ok(())
}

/// Pair persisted connections with the descriptors that loaded. Connections
/// whose extension is missing are skipped with a warning.
fn connection_records(
    stored: Vec<StoredConnection>,
    descriptors: &HashMap<String, ExtensionDescriptor>,
) -> Vec<ConnectionRecord> {
    stored
        .into_iter()
        .filter_map(|connection| {
            let Some(descriptor) = descriptors.get(&connection.extension_key) else {
                warn!(
                    alias = %connection.alias,
                    key = %connection.extension_key,
                    "no loadable extension for connection, skipping"
                );
                return None;
            };
            let mut config = connection.config;
            apply_defaults(&descriptor.config_items, &mut config);
            let missing = missing_required(&descriptor.config_items, &config);
            if !missing.is_empty() {
                warn!(alias = %connection.alias, missing = ?missing, "connection config incomplete");
            }
            Some(ConnectionRecord {
                connection_id: connection.connection_id,
                alias: connection.alias,
                name: connection.name,
                config,
                descriptor: descriptor.clone(),
            })
        })
        .collect()
}

pub async fn run(config: ParaboxConfig) -> anyhow::Result<()> {
    let store = Arc::new(open_store(&config).await?);
    persist_connections(&config, &store).await?;

    let loader: Arc<dyn ExtensionLoader> = Arc::new(build_loader(&config));
    let mut descriptors = HashMap::new();
    for result in loader.scan_all().await {
        match result {
            Ok(descriptor) => {
                descriptors.insert(descriptor.key.clone(), descriptor);
            },
            Err(e) => warn!(error = %e, "extension failed to load"),
        }
    }
    info!(count = descriptors.len(), "extensions loaded");

    let host = HostContext {
        lifecycle: LifecycleSource::new(),
        init_timeout: config.runtime.init_timeout(),
        call_timeout: config.runtime.call_timeout(),
    };
    let manager = ConnectionManager::new(Arc::clone(&loader), store.clone(), host);

    for record in connection_records(store.list().await?, &descriptors) {
        let alias = record.alias.clone();
        if let Err(e) = manager.add(record).await {
            warn!(alias = %alias, error = %e, "failed to add connection");
        }
    }
    for (connection_id, state) in manager.init_pending().await {
        info!(connection_id, state = %state, "connection initialized");
    }

    for event in [
        LifecycleEvent::Create,
        LifecycleEvent::Start,
        LifecycleEvent::Resume,
    ] {
        manager.dispatch(event);
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    for event in [
        LifecycleEvent::Pause,
        LifecycleEvent::Stop,
        LifecycleEvent::Destroy,
    ] {
        manager.dispatch(event);
    }
    manager.shutdown().await;
    store.pool().close().await;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, serde_json::json};

    fn stored(connection_id: i64, alias: &str, key: &str) -> StoredConnection {
        StoredConnection {
            connection_id,
            alias: alias.into(),
            name: alias.into(),
            extension_key: key.into(),
            config: json!({ "host": "127.0.0.1" }).as_object().cloned().unwrap(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn records_skip_unknown_extensions_and_fill_defaults() {
        let descriptor = parabox_onebot::descriptor();
        let descriptors = HashMap::from([(descriptor.key.clone(), descriptor)]);

        let records = connection_records(
            vec![
                stored(1, "qq", parabox_onebot::EXTENSION_KEY),
                stored(2, "tg", "org.example.tg+org.example.tg.TgConnection"),
            ],
            &descriptors,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].connection_id, 1);
        assert_eq!(records[0].config["compatibility_mode"], false);
        assert_eq!(records[0].config["host"], "127.0.0.1");
    }
}
