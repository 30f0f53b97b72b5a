use clap::{Parser, Subcommand};
use uuid::Uuid;

/// matchnotify: real-time and push notifications for the matchmaking platform
#[derive(Parser)]
#[command(name = "matchnotify", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the notification server
    Serve {
        /// Port to bind (defaults to MATCHNOTIFY_PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Keep notifications in memory instead of Postgres (development only)
        #[arg(long)]
        ephemeral: bool,
    },

    /// Apply database migrations and exit
    Migrate,

    /// Delete expired notifications once and exit
    PurgeExpired,

    /// Manage access tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Raise notifications by hand
    Notify {
        #[command(subcommand)]
        command: NotifyCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue a signed access token for a user (development and testing)
    Issue {
        #[arg(long)]
        user: Uuid,
        #[arg(long, default_value = "3600")]
        ttl_secs: i64,
    },
}

#[derive(Subcommand)]
pub enum NotifyCommands {
    /// Send a system announcement to one user
    System {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        message: String,
        #[arg(long)]
        link: Option<String>,
    },
}
