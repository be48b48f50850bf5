// Command routing and dispatch

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ragdesk_api::Review;
use ragdesk_config::ConfigManager;

use crate::commands::*;
use crate::context::AppContext;
use crate::error::CliResult;

/// ragdesk - terminal client for a RAG chat backend
#[derive(Parser, Debug)]
#[command(name = "ragdesk")]
#[command(bin_name = "ragdesk")]
#[command(about = "Terminal client for a RAG chat backend")]
#[command(
    long_about = "ragdesk: chat with your documents from the terminal.\n\nQuick start:\n  • ragdesk login <email>     Sign in\n  • ragdesk chat             Start an interactive chat\n  • ragdesk docs upload FILE Add a document to the knowledge base\n  • ragdesk health           Check the backend"
)]
#[command(version)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimize output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use this config file instead of the default
    #[arg(long = "config", global = true, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Override api.base_url
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Chat with the backend (interactive unless a message is given)
    Chat {
        /// Send one message, print the reply and exit
        #[arg(value_name = "MESSAGE")]
        message: Option<String>,

        /// Continue an existing session (id, id prefix or list position)
        #[arg(short, long)]
        session: Option<String>,

        /// Answer from one RAG collection
        #[arg(short, long)]
        collection: Option<String>,

        /// Chat mode sent to the backend
        #[arg(short, long)]
        mode: Option<String>,

        /// Ask for step-by-step reasoning
        #[arg(long)]
        react: bool,
    },

    /// Manage chat sessions
    Sessions {
        #[command(subcommand)]
        action: Option<SessionsSubcommand>,
    },

    /// Manage RAG documents
    Docs {
        #[command(subcommand)]
        action: Option<DocsSubcommand>,
    },

    /// Manage RAG collections
    Collections {
        #[command(subcommand)]
        action: Option<CollectionsSubcommand>,
    },

    /// Administration (admin role required)
    Admin {
        #[command(subcommand)]
        action: AdminSubcommand,
    },

    /// Today's usage counters
    Usage {
        /// Number of top users to show
        #[arg(long, default_value_t = 5)]
        top: usize,
    },

    /// Backend health over the health socket
    Health {
        /// Keep watching until Ctrl-C
        #[arg(short, long)]
        watch: bool,

        /// Seconds to wait for a status report
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Sign in
    Login {
        email: String,

        /// Password (falls back to RAGDESK_PASSWORD, then a prompt)
        #[arg(long)]
        password: Option<String>,
    },

    /// Create an account and sign in
    Register {
        email: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Sign out and forget the saved session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// View and change preferences
    Prefs {
        #[command(subcommand)]
        action: Option<PrefsSubcommand>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: Option<ConfigSubcommand>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionsSubcommand {
    /// List sessions
    List,
    /// Print a session transcript
    Show { id: String },
    /// Rename a session
    Rename { id: String, title: String },
    /// Delete a session
    Delete { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum DocsSubcommand {
    /// List documents
    List {
        #[arg(short, long)]
        collection: Option<String>,
    },
    /// Upload a file for ingestion
    Upload {
        path: PathBuf,
        #[arg(short, long)]
        collection: Option<String>,
    },
    /// Approve a document waiting for review
    Approve { id: String },
    /// Reject a document waiting for review
    Reject { id: String },
    /// Delete a document
    Delete { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CollectionsSubcommand {
    List,
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AdminSubcommand {
    /// List users
    Users,
    Block { user_id: String },
    Unblock { user_id: String },
    /// Grant the admin role (superadmin only)
    Promote { user_id: String },
    /// System statistics
    Stats,
    /// Activity log
    Activity {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Act as another user (superadmin only)
    Impersonate { user_id: String },
    /// Return to your own account
    StopImpersonating,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PrefsSubcommand {
    Show,
    /// light, dark or system
    Theme { theme: String },
    /// Email attached to guest chats; omit to clear
    GuestEmail { email: Option<String> },
    /// Keep admin access between sessions (superadmin only)
    PersistentAccess {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    Show,
    Path,
    Init {
        #[arg(long)]
        force: bool,
    },
}

/// Command router
pub struct CommandRouter;

impl CommandRouter {
    /// Parse CLI arguments and route to appropriate handler
    pub async fn route() -> CliResult<()> {
        let cli = Cli::parse();
        Self::execute(&cli).await
    }

    fn config_manager(cli: &Cli) -> ConfigManager {
        match &cli.config_file {
            Some(path) => ConfigManager::with_path(path.clone()),
            None => ConfigManager::new(),
        }
    }

    /// Execute a command
    pub async fn execute(cli: &Cli) -> CliResult<()> {
        let command = cli.command.clone().unwrap_or(Commands::Chat {
            message: None,
            session: None,
            collection: None,
            mode: None,
            react: false,
        });

        if let Commands::Config { action } = &command {
            crate::logging::init_logging(cli.verbose, cli.quiet, "warn");
            let action = match action {
                Some(ConfigSubcommand::Show) | None => ConfigAction::Show,
                Some(ConfigSubcommand::Path) => ConfigAction::Path,
                Some(ConfigSubcommand::Init { force }) => ConfigAction::Init { force: *force },
            };
            return ConfigCommand::new(Self::config_manager(cli), action).execute().await;
        }

        let ctx = AppContext::load(cli.config_file.clone(), cli.base_url.clone())?;
        crate::logging::init_logging(cli.verbose, cli.quiet, &ctx.config.log_level);

        match command {
            Commands::Chat {
                message,
                session,
                collection,
                mode,
                react,
            } => {
                let cmd = ChatCommand::new(ctx, message)
                    .with_session(session)
                    .with_collection(collection)
                    .with_mode(mode)
                    .with_react(react);
                cmd.execute().await
            }
            Commands::Sessions { action } => {
                let action = match action {
                    Some(SessionsSubcommand::List) | None => SessionsAction::List,
                    Some(SessionsSubcommand::Show { id }) => SessionsAction::Show { id },
                    Some(SessionsSubcommand::Rename { id, title }) => {
                        SessionsAction::Rename { id, title }
                    }
                    Some(SessionsSubcommand::Delete { id }) => SessionsAction::Delete { id },
                };
                SessionsCommand::new(ctx, action).execute().await
            }
            Commands::Docs { action } => {
                let action = match action {
                    Some(DocsSubcommand::List { collection }) => DocumentsAction::List { collection },
                    None => DocumentsAction::List { collection: None },
                    Some(DocsSubcommand::Upload { path, collection }) => {
                        DocumentsAction::Upload { path, collection }
                    }
                    Some(DocsSubcommand::Approve { id }) => DocumentsAction::Review {
                        id,
                        review: Review::Approve,
                    },
                    Some(DocsSubcommand::Reject { id }) => DocumentsAction::Review {
                        id,
                        review: Review::Reject,
                    },
                    Some(DocsSubcommand::Delete { id }) => DocumentsAction::Delete { id },
                };
                DocumentsCommand::new(ctx, action).execute().await
            }
            Commands::Collections { action } => {
                let action = match action {
                    Some(CollectionsSubcommand::List) | None => CollectionsAction::List,
                    Some(CollectionsSubcommand::Create { name, description }) => {
                        CollectionsAction::Create { name, description }
                    }
                    Some(CollectionsSubcommand::Delete { id }) => CollectionsAction::Delete { id },
                };
                CollectionsCommand::new(ctx, action).execute().await
            }
            Commands::Admin { action } => {
                let action = match action {
                    AdminSubcommand::Users => AdminAction::Users,
                    AdminSubcommand::Block { user_id } => AdminAction::Block { user_id },
                    AdminSubcommand::Unblock { user_id } => AdminAction::Unblock { user_id },
                    AdminSubcommand::Promote { user_id } => AdminAction::Promote { user_id },
                    AdminSubcommand::Stats => AdminAction::Stats,
                    AdminSubcommand::Activity { page, limit } => AdminAction::Activity { page, limit },
                    AdminSubcommand::Impersonate { user_id } => AdminAction::Impersonate { user_id },
                    AdminSubcommand::StopImpersonating => AdminAction::StopImpersonating,
                };
                AdminCommand::new(ctx, action).execute().await
            }
            Commands::Usage { top } => UsageCommand::new(ctx, top).execute().await,
            Commands::Health { watch, timeout } => {
                HealthCommand::new(ctx, watch, Duration::from_secs(timeout.max(1)))
                    .execute()
                    .await
            }
            Commands::Login { email, password } => {
                AuthCommand::new(ctx, AuthAction::Login { email, password })
                    .execute()
                    .await
            }
            Commands::Register {
                email,
                name,
                password,
            } => {
                AuthCommand::new(
                    ctx,
                    AuthAction::Register {
                        email,
                        name,
                        password,
                    },
                )
                .execute()
                .await
            }
            Commands::Logout => AuthCommand::new(ctx, AuthAction::Logout).execute().await,
            Commands::Whoami => AuthCommand::new(ctx, AuthAction::Whoami).execute().await,
            Commands::Prefs { action } => {
                let action = match action {
                    Some(PrefsSubcommand::Show) | None => PrefsAction::Show,
                    Some(PrefsSubcommand::Theme { theme }) => PrefsAction::Theme { theme },
                    Some(PrefsSubcommand::GuestEmail { email }) => PrefsAction::GuestEmail { email },
                    Some(PrefsSubcommand::PersistentAccess { enabled }) => {
                        PrefsAction::PersistentAccess { enabled }
                    }
                };
                PrefsCommand::new(ctx, action).execute().await
            }
            Commands::Config { .. } => Ok(()),
        }
    }
}
