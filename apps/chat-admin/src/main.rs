use anyhow::{bail, Context, Result};
use chat_models::AccountPublic;
use chat_store::{AccountFields, ChatStore, StoreConfig};
use clap::{Parser, Subcommand};
use tracing::Instrument;

mod observability;

use observability::LogFormat;

/// Operator tool for the chat database.
#[derive(Parser, Debug)]
#[command(name = "chat-admin", version, about, long_about = None)]
struct Cli {
    /// Database URL; falls back to CHAT_DATABASE_URL, then sqlite://chat.db
    #[arg(long = "database-url")]
    database_url: Option<String>,

    #[arg(long = "log-format", value_enum, env = "CHAT_LOG_FORMAT", default_value_t)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account with staff and superuser rights
    CreateSuperuser {
        username: String,
        /// Leave unset (and CHAT_ADMIN_PASSWORD unset) for a password-less account
        #[arg(long, env = "CHAT_ADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create a regular account; password-less unless one is given
    CreateUser {
        username: String,
        #[arg(long, env = "CHAT_ADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        #[arg(long)]
        staff: bool,
    },
    /// Replace an account's password, or make it unusable when none is given
    SetPassword {
        username: String,
        #[arg(long, env = "CHAT_ADMIN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Print the public view of an account as JSON
    ShowUser { username: String },
    /// Print a chat's most recent messages as JSON, newest first
    RecentMessages {
        chat_id: i64,
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::CreateSuperuser { .. } => "create-superuser",
            Command::CreateUser { .. } => "create-user",
            Command::SetPassword { .. } => "set-password",
            Command::ShowUser { .. } => "show-user",
            Command::RecentMessages { .. } => "recent-messages",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    observability::init_tracing(cli.log_format);

    let mut config = StoreConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    let store = ChatStore::connect(&config)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;

    let span = observability::command_span(cli.command.name());
    let outcome = run(&store, cli.command).instrument(span.clone()).await;
    store.close().await;

    let _entered = span.enter();
    match &outcome {
        Ok(()) => tracing::info!(component = "admin", "command completed"),
        Err(err) => tracing::error!(component = "admin", error = %err, "command failed"),
    }
    outcome
}

async fn run(store: &ChatStore, command: Command) -> Result<()> {
    let accounts = store.accounts();

    match command {
        Command::CreateSuperuser { username, password } => {
            let account = accounts
                .create_superuser(Some(&username), password.as_deref(), AccountFields::default())
                .await?;
            println!("Superuser {account} created (id {}).", account.id);
        }
        Command::CreateUser {
            username,
            password,
            staff,
        } => {
            let fields = if staff {
                AccountFields::default().staff(true)
            } else {
                AccountFields::default()
            };
            let account = accounts
                .create_user(Some(&username), password.as_deref(), fields)
                .await?;
            println!("User {account} created (id {}).", account.id);
        }
        Command::SetPassword { username, password } => {
            let Some(account) = accounts.get_by_username(&username).await? else {
                bail!("no account named {username:?}");
            };
            accounts.set_password(account.id, password.as_deref()).await?;
            println!("Password updated for {account}.");
        }
        Command::ShowUser { username } => {
            let Some(account) = accounts.get_by_username(&username).await? else {
                bail!("no account named {username:?}");
            };
            let public = AccountPublic::from(account);
            println!("{}", serde_json::to_string_pretty(&public)?);
        }
        Command::RecentMessages { chat_id, limit } => {
            let chats = store.chats();
            chats.get(chat_id).await?;
            let messages = chats.recent_messages(chat_id, limit).await?;
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_create_superuser() {
        let cli = Cli::try_parse_from([
            "chat-admin",
            "--database-url",
            "sqlite:///tmp/chat.db",
            "create-superuser",
            "root",
            "--password",
            "pw",
        ])
        .expect("parse args");

        assert_eq!(cli.database_url.as_deref(), Some("sqlite:///tmp/chat.db"));
        match cli.command {
            Command::CreateSuperuser { username, password } => {
                assert_eq!(username, "root");
                assert_eq!(password.as_deref(), Some("pw"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn create_user_accepts_password_and_staff_flag() {
        let cli = Cli::try_parse_from([
            "chat-admin",
            "create-user",
            "ivan",
            "--password",
            "hunter22",
            "--staff",
        ])
        .expect("parse args");

        assert_eq!(cli.command.name(), "create-user");
        match cli.command {
            Command::CreateUser {
                username,
                password,
                staff,
            } => {
                assert_eq!(username, "ivan");
                assert_eq!(password.as_deref(), Some("hunter22"));
                assert!(staff);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn log_format_flag_selects_json() {
        let cli = Cli::try_parse_from(["chat-admin", "--log-format", "json", "show-user", "root"])
            .expect("parse args");
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.command.name(), "show-user");

        let cli = Cli::try_parse_from(["chat-admin", "show-user", "root"]).expect("parse args");
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn recent_messages_limit_defaults_to_ten() {
        let cli = Cli::try_parse_from(["chat-admin", "recent-messages", "3"]).expect("parse args");
        match cli.command {
            Command::RecentMessages { chat_id, limit } => {
                assert_eq!(chat_id, 3);
                assert_eq!(limit, 10);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
