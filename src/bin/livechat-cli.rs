use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use livechat::channel::{Channel, ChannelOptions, ConnectionStatus, SignalSink, SignalStream};
use livechat::config::{ClientConfig, DEFAULT_API_BASE_URL, DEFAULT_WS_URL};
use livechat::gateway::{Gateway, GatewayError};
use livechat::models::{ChatId, NewMessage, NewUser, UserId};
use livechat::session::ChatSession;
use livechat::signal::UPDATE_CHAT;
use livechat::store::{ChatStore, StoreError};
use livechat::views;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("channel to {0} did not open")]
    ChannelClosed(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "livechat-cli", about = "Live-chat REST and notification channel CLI")]
struct Cli {
    #[arg(long, env = "LIVECHAT_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    #[arg(long, env = "LIVECHAT_WS_URL", default_value = DEFAULT_WS_URL)]
    ws_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print inbound signals as they arrive.
    Listen {
        /// Exit after this many signals.
        #[arg(long)]
        count: Option<usize>,
    },
    /// Emit one signal on the channel.
    Notify {
        #[arg(long, default_value = UPDATE_CHAT)]
        action: String,
    },
    /// Get (or create) the admin identity.
    Admin,
    /// Get (or create) a visitor by email.
    User {
        #[arg(long)]
        email: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// List every chat.
    Chats,
    /// Chat list as sorted rooms.
    Rooms {
        #[arg(long, default_value = "")]
        avatar: String,
    },
    /// Messages of one chat, formatted in local time.
    Messages {
        chat_id: ChatId,
        #[arg(long)]
        user: UserId,
    },
    /// Post a message and notify peers.
    Send {
        chat_id: ChatId,
        #[arg(long)]
        email: String,
        #[arg(long)]
        text: String,
    },
    /// Delete a chat and print the remaining list.
    DeleteChat {
        chat_id: ChatId,
    },
}

/// Sink for commands that never notify.
struct Offline;

impl SignalSink for Offline {
    fn notify(&self, _action: &str) -> bool {
        false
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = ClientConfig {
        api_base_url: cli.api_base_url,
        ws_url: cli.ws_url,
        ..ClientConfig::from_env()
    };

    match cli.command {
        Command::Listen { count } => run_listen(&config, count).await,
        Command::Notify { action } => run_notify(&config, &action).await,
        Command::Send { chat_id, email, text } => run_send(&config, chat_id, email, text).await,
        command => run_rest(&config, command).await,
    }
}

async fn open_channel(config: &ClientConfig) -> Result<(Channel, SignalStream), CliError> {
    let (channel, signals) = Channel::connect_with(config.ws_url.clone(), ChannelOptions { reconnect: config.reconnect });
    if channel.settled().await != ConnectionStatus::Open {
        return Err(CliError::ChannelClosed(config.ws_url.clone()));
    }
    Ok((channel, signals))
}

async fn run_listen(config: &ClientConfig, count: Option<usize>) -> Result<(), CliError> {
    let (channel, mut signals) = open_channel(config).await?;
    eprintln!("listening on {}", channel.endpoint());

    let mut seen = 0usize;
    while let Some(signal) = signals.recv().await {
        print_json(&signal)?;
        seen += 1;
        if count.is_some_and(|limit| seen >= limit) {
            break;
        }
    }
    channel.close();
    Ok(())
}

async fn run_notify(config: &ClientConfig, action: &str) -> Result<(), CliError> {
    let (channel, _signals) = open_channel(config).await?;
    if !channel.notify(action) {
        return Err(CliError::ChannelClosed(config.ws_url.clone()));
    }
    channel.close();
    channel.wait_for(ConnectionStatus::Closed).await;
    println!("sent {action}");
    Ok(())
}

async fn run_send(config: &ClientConfig, chat_id: ChatId, email: String, text: String) -> Result<(), CliError> {
    let session = ChatSession::start(config)?;
    if session.channel().settled().await != ConnectionStatus::Open {
        eprintln!("channel to {} is closed; peers will not be notified", config.ws_url);
    }
    let result = session.store().send_message(&NewMessage::now(chat_id, email, text)).await;
    session.shutdown().await;
    print_json(&result?)
}

async fn run_rest(config: &ClientConfig, command: Command) -> Result<(), CliError> {
    let store = ChatStore::new(Arc::new(Gateway::new(config)?), Arc::new(Offline));

    match command {
        Command::Admin => print_json(&store.fetch_admin().await?),
        Command::User { email, first_name, last_name } => {
            let user = store.fetch_or_create_user(&NewUser { email, first_name, last_name }).await?;
            print_json(&user)
        }
        Command::Chats => print_json(&store.fetch_chats().await?),
        Command::Rooms { avatar } => {
            let admin = store.fetch_admin().await?;
            let chats = store.fetch_chats().await?;
            print_json(&views::rooms_from_chats(&chats, &admin, &avatar))
        }
        Command::Messages { chat_id, user } => {
            let messages = store.fetch_messages(chat_id, user).await?;
            print_json(&views::message_views(&messages, views::local_offset()))
        }
        Command::DeleteChat { chat_id } => print_json(&store.delete_chat(chat_id).await?),
        Command::Listen { .. } | Command::Notify { .. } | Command::Send { .. } => Ok(()),
    }
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "livechat_cli_test.rs"]
mod tests;
