use {
    clap::Subcommand, parabox_config::ParaboxConfig, parabox_extension::ConnectionStore,
};

use crate::run_command::open_store;

#[derive(Subcommand)]
pub enum ConnectionAction {
    /// List persisted connections.
    List,
    /// Delete a persisted connection by id.
    Remove { connection_id: i64 },
}

pub async fn handle_connections(
    action: ConnectionAction,
    config: &ParaboxConfig,
) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    match action {
        ConnectionAction::List => {
            let connections = store.list().await?;
            if connections.is_empty() {
                println!("No connections configured.");
            }
            for c in connections {
                println!(
                    "  {:>4}  {:<20} {}",
                    c.connection_id, c.alias, c.extension_key
                );
            }
        },
        ConnectionAction::Remove { connection_id } => {
            if store.delete(connection_id).await? {
                println!("Removed connection {connection_id}.");
            } else {
                anyhow::bail!("no connection with id {connection_id}");
            }
        },
    }
    store.pool().close().await;
    Ok(())
}
