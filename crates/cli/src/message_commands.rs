use {
    clap::Subcommand, parabox_config::ParaboxConfig, parabox_message::ContentKind,
};

use crate::run_command::open_store;

#[derive(Subcommand)]
pub enum MessageAction {
    /// Most recent messages of one connection, newest first.
    List {
        #[arg(long)]
        connection: i64,
        /// Only messages containing this kind of element (plain_text, image, audio, ...).
        #[arg(long)]
        kind: Option<ContentKind>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Chats of one connection with their unread counts.
    Chats {
        #[arg(long)]
        connection: i64,
    },
}

pub async fn handle_messages(action: MessageAction, config: &ParaboxConfig) -> anyhow::Result<()> {
    let store = open_store(config).await?;
    match action {
        MessageAction::List {
            connection,
            kind,
            limit,
        } => {
            let messages = match kind {
                Some(kind) => store.messages_with_kind(connection, kind, limit).await?,
                None => store.recent_messages(connection, limit).await?,
            };
            for m in messages {
                println!(
                    "  [{}] chat {} from {}: {}",
                    m.timestamp, m.chat_id, m.sender_id, m.content_string
                );
            }
        },
        MessageAction::Chats { connection } => {
            for chat in store.chats(connection).await? {
                println!(
                    "  {:<24} {:<20} unread {}",
                    chat.uid,
                    chat.basic_info.name.as_deref().unwrap_or("-"),
                    chat.unread_count
                );
            }
        },
    }
    store.pool().close().await;
    Ok(())
}
