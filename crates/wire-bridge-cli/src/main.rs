use anyhow::Result;
use clap::{Parser, Subcommand};
use wire_bridge_core::{Bridge, BridgePaths};

mod commands;
mod ui;

#[derive(Parser)]
#[command(name = "wirebridge")]
#[command(about = "Send messages, files and share links from your file store into Wire.")]
#[command(version)]
struct Cli {
    /// Host user to act as (defaults to $USER)
    #[arg(long, global = true, value_name = "USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to Wire with email and password
    Login {
        /// Wire API URL. Defaults to your configured server.
        #[arg(long)]
        url: Option<String>,
        /// Account email
        #[arg(long)]
        email: Option<String>,
    },

    /// Revoke the Wire session and forget it locally
    Logout {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Show connection state and personal settings
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change settings
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Show your Wire identity
    Whoami {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List your conversations
    Conversations {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List your teams
    Teams {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send a text message
    Send {
        /// Message text
        message: String,
        /// Conversation id. If omitted, shows a picker.
        #[arg(long)]
        to: Option<String>,
    },

    /// Upload files into a conversation
    SendFiles {
        /// File ids (see `wirebridge files`)
        #[arg(value_name = "FILE_ID", required = true)]
        file_ids: Vec<i64>,
        #[arg(long)]
        to: Option<String>,
        /// Message posted before the files
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Post public share links to files or folders
    Share {
        #[arg(value_name = "FILE_ID", required = true)]
        file_ids: Vec<i64>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value = "")]
        comment: String,
        /// Allow recipients to edit
        #[arg(long)]
        edit: bool,
        /// Expiration date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        expires: Option<chrono::NaiveDate>,
        /// Protect the links with a password (prompted)
        #[arg(long)]
        password: bool,
    },

    /// Show messages that mention you
    Mentions {
        /// Only posts created after this timestamp (ms)
        #[arg(long)]
        since: Option<i64>,
        /// Handle to search for. Defaults to your own.
        #[arg(long)]
        handle: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Fetch a user or team avatar
    Avatar {
        #[command(subcommand)]
        command: AvatarCommand,
    },

    /// List your files and their ids
    Files {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Set KEY=VALUE pairs (url, token, navigation_enabled)
    Set {
        #[arg(value_name = "KEY=VALUE", required = true)]
        pairs: Vec<String>,
        /// Set installation-wide values instead
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum AvatarCommand {
    User {
        domain: String,
        id: String,
        /// Where to write the image
        #[arg(long, short)]
        output: std::path::PathBuf,
    },
    Team {
        domain: String,
        id: String,
        #[arg(long, short)]
        output: std::path::PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let user = cli
        .user
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "default".to_string());
    let bridge = Bridge::open(BridgePaths::from_env()).await?;

    match cli.command {
        Commands::Login { url, email } => commands::login::login(&bridge, &user, url, email).await,
        Commands::Logout { yes } => commands::login::logout(&bridge, &user, yes).await,
        Commands::Status { json } => commands::status::run(&bridge, &user, json).await,
        Commands::Config { command } => match command {
            ConfigCommand::Set { pairs, admin } => {
                commands::config::set(&bridge, &user, &pairs, admin).await
            }
        },
        Commands::Whoami { json } => commands::status::whoami(&bridge, &user, json).await,
        Commands::Conversations { json } => {
            commands::conversations::list(&bridge, &user, json).await
        }
        Commands::Teams { json } => commands::conversations::teams(&bridge, &user, json).await,
        Commands::Send { message, to } => {
            commands::send::message(&bridge, &user, &message, to).await
        }
        Commands::SendFiles {
            file_ids,
            to,
            comment,
        } => commands::send::files(&bridge, &user, file_ids, to, comment).await,
        Commands::Share {
            file_ids,
            to,
            comment,
            edit,
            expires,
            password,
        } => {
            let options = commands::send::ShareOptions {
                comment,
                edit,
                expires,
                password,
            };
            commands::send::links(&bridge, &user, file_ids, to, options).await
        }
        Commands::Mentions {
            since,
            handle,
            json,
        } => commands::conversations::mentions(&bridge, &user, since, handle, json).await,
        Commands::Avatar { command } => match command {
            AvatarCommand::User { domain, id, output } => {
                commands::avatar::user(&bridge, &user, &domain, &id, &output).await
            }
            AvatarCommand::Team { domain, id, output } => {
                commands::avatar::team(&bridge, &user, &domain, &id, &output).await
            }
        },
        Commands::Files { json } => commands::files::run(&bridge, &user, json).await,
    }
}
