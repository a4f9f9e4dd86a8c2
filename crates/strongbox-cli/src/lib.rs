//! Strongbox command-line interface.

pub mod app;
pub mod commands;
pub mod input;
pub mod logging;
pub mod render;
pub mod tls;

use clap::{Parser, Subcommand};
use strongbox_core::{CallContext, Config};
use tracing::{info, warn};

pub use app::App;

/// Strongbox - client for a remote secret vault
#[derive(Parser)]
#[command(name = "strongbox")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(long, env = "STRONGBOX_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create an account and store its token
    Register(commands::auth::AccountArgs),

    /// Log in and store the issued token
    Login(commands::auth::AccountArgs),

    /// Store a login/password pair
    CreateCredentials(commands::secrets::CreateCredentialsArgs),

    /// Store a payment card number
    CreatePaymentcard(commands::secrets::CreatePaymentCardArgs),

    /// Store text typed on stdin, ending with a line containing only `end`
    CreateText(commands::secrets::CreateTextArgs),

    /// Store the contents of a local file
    CreateFile(commands::secrets::CreateFileArgs),

    /// List stored secret names
    List,

    /// Print a stored login/password pair
    GetCredentials(commands::secrets::GetArgs),

    /// Print a stored payment card
    GetPaymentcard(commands::secrets::GetArgs),

    /// Print stored text
    GetText(commands::secrets::GetArgs),

    /// Download a stored file
    GetFile(commands::secrets::GetFileArgs),

    /// Delete a secret and all its versions
    Delete(commands::secrets::DeleteArgs),
}

/// Run the CLI against the backend named in `config`.
pub async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let root = CallContext::new();
    let interrupt = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight calls");
            interrupt.cancel();
        }
    });

    let app = App::connect(&config, root).await?;
    info!(server = %config.server_url, "Running command");
    dispatch(&app, cli.command).await
}

/// Execute one command on an already connected app.
pub async fn dispatch(app: &App, command: Commands) -> anyhow::Result<()> {
    use commands::{auth, secrets};

    match command {
        Commands::Register(args) => auth::register(app, args).await,
        Commands::Login(args) => auth::login(app, args).await,
        Commands::CreateCredentials(args) => secrets::create_credentials(app, args).await,
        Commands::CreatePaymentcard(args) => secrets::create_payment_card(app, args).await,
        Commands::CreateText(args) => secrets::create_text(app, args).await,
        Commands::CreateFile(args) => secrets::create_file(app, args).await,
        Commands::List => secrets::list(app).await,
        Commands::GetCredentials(args) => secrets::get_credentials(app, args).await,
        Commands::GetPaymentcard(args) => secrets::get_payment_card(app, args).await,
        Commands::GetText(args) => secrets::get_text(app, args).await,
        Commands::GetFile(args) => secrets::get_file(app, args).await,
        Commands::Delete(args) => secrets::delete(app, args).await,
    }
}
