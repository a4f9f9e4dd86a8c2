//! Secret management commands.
//!
//! Credentials and payment cards are stored as small JSON documents. Text and
//! files are streamed in both directions and never held in memory whole.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use strongbox_core::{
    Credentials, KeeperError, NewSecret, PaymentCard, SecretInfo, SecretType, Version,
};
use tokio::io::{AsyncWriteExt, BufReader};

use crate::app::App;
use crate::input::{self, END_MARKER};
use crate::render;

#[derive(Args)]
pub struct CreateCredentialsArgs {
    /// Secret name
    #[arg(short, long)]
    pub name: String,

    /// Login to store
    #[arg(short, long)]
    pub login: String,

    /// Password to store (if omitted, prompts for hidden input)
    #[arg(short, long)]
    pub password: Option<String>,

    /// Free-form note kept with the secret
    #[arg(short, long, default_value = "")]
    pub metadata: String,
}

#[derive(Args)]
pub struct CreatePaymentCardArgs {
    /// Secret name
    #[arg(short, long)]
    pub name: String,

    /// Card number (if omitted, prompts for hidden input)
    #[arg(short = 'c', long)]
    pub number: Option<String>,

    /// Free-form note kept with the secret
    #[arg(short, long, default_value = "")]
    pub metadata: String,
}

#[derive(Args)]
pub struct CreateTextArgs {
    /// Secret name
    #[arg(short, long)]
    pub name: String,

    /// Free-form note kept with the secret
    #[arg(short, long, default_value = "")]
    pub metadata: String,
}

#[derive(Args)]
pub struct CreateFileArgs {
    /// Secret name
    #[arg(short, long)]
    pub name: String,

    /// File to upload
    #[arg(short, long)]
    pub file: PathBuf,

    /// Free-form note kept with the secret
    #[arg(short, long, default_value = "")]
    pub metadata: String,
}

#[derive(Args)]
pub struct GetArgs {
    /// Secret name
    #[arg(short, long)]
    pub name: String,

    /// Version to read (0 reads the latest)
    #[arg(short = 'v', long = "version", default_value_t = 0)]
    pub secret_version: u32,
}

impl GetArgs {
    pub fn version(&self) -> Version {
        Version::from_number(self.secret_version)
    }
}

#[derive(Args)]
pub struct GetFileArgs {
    #[command(flatten)]
    pub secret: GetArgs,

    /// Where to write the file (defaults to the last component of the secret name)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Secret name
    #[arg(short, long)]
    pub name: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Run `strongbox create-credentials`.
pub async fn create_credentials(app: &App, args: CreateCredentialsArgs) -> anyhow::Result<()> {
    let password = input::password_or_prompt(args.password, "Password to store: ")?;
    let content = serde_json::to_vec(&Credentials {
        login: args.login,
        password: password.to_string(),
    })?;

    let secret = NewSecret::new(args.name, SecretType::Credentials).with_metadata(args.metadata);
    let name = secret.name.clone();
    app.secrets
        .create(&app.call_context(), secret, Box::new(Cursor::new(content)))
        .await?;

    println!("Credentials '{}' stored", name);
    Ok(())
}

/// Run `strongbox create-paymentcard`.
pub async fn create_payment_card(app: &App, args: CreatePaymentCardArgs) -> anyhow::Result<()> {
    let number = input::password_or_prompt(args.number, "Card number: ")?;
    let content = serde_json::to_vec(&PaymentCard {
        number: number.trim().to_string(),
    })?;

    let secret = NewSecret::new(args.name, SecretType::PaymentCard).with_metadata(args.metadata);
    let name = secret.name.clone();
    app.secrets
        .create(&app.call_context(), secret, Box::new(Cursor::new(content)))
        .await?;

    println!("Payment card '{}' stored", name);
    Ok(())
}

/// Run `strongbox create-text`.
pub async fn create_text(app: &App, args: CreateTextArgs) -> anyhow::Result<()> {
    let secret = NewSecret::new(args.name, SecretType::Text).with_metadata(args.metadata);
    secret.validate()?;
    let name = secret.name.clone();

    eprintln!("Enter text. Finish with a line containing only '{END_MARKER}'.");
    let (content, producer) =
        input::spawn_text_pipe(BufReader::new(tokio::io::stdin()), END_MARKER);

    // Typing time is unbounded, so only Ctrl-C limits this call.
    if let Err(err) = app
        .secrets
        .create(&app.interactive_context(), secret, content)
        .await
    {
        producer.abort();
        return Err(err.into());
    }

    let lines = producer
        .await
        .map_err(|e| anyhow::anyhow!("Input task failed: {}", e))??;
    println!("Text '{}' stored ({} lines)", name, lines);
    Ok(())
}

/// Run `strongbox create-file`.
pub async fn create_file(app: &App, args: CreateFileArgs) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("Failed to open {}", args.file.display()))?;

    let secret = NewSecret::new(args.name, SecretType::File).with_metadata(args.metadata);
    let name = secret.name.clone();
    app.secrets
        .create(&app.call_context(), secret, Box::new(file))
        .await?;

    println!("File '{}' stored from {}", name, args.file.display());
    Ok(())
}

/// Run `strongbox list`.
pub async fn list(app: &App) -> anyhow::Result<()> {
    let names = app.secrets.list(&app.call_context()).await?;
    println!("{}", render::secret_list(&names));
    Ok(())
}

/// Run `strongbox get-credentials`.
pub async fn get_credentials(app: &App, args: GetArgs) -> anyhow::Result<()> {
    let secret = app
        .secrets
        .get(&app.call_context(), &args.name, args.version())
        .await?;
    expect_type(&secret.info, SecretType::Credentials)?;

    let credentials: Credentials = decode(&secret.info, &secret.data)?;
    println!("{}", render::secret_header(&secret.info));
    println!("{}", render::credentials(&credentials));
    Ok(())
}

/// Run `strongbox get-paymentcard`.
pub async fn get_payment_card(app: &App, args: GetArgs) -> anyhow::Result<()> {
    let secret = app
        .secrets
        .get(&app.call_context(), &args.name, args.version())
        .await?;
    expect_type(&secret.info, SecretType::PaymentCard)?;

    let card: PaymentCard = decode(&secret.info, &secret.data)?;
    println!("{}", render::secret_header(&secret.info));
    println!("{}", render::payment_card(&card));
    Ok(())
}

/// Run `strongbox get-text`.
pub async fn get_text(app: &App, args: GetArgs) -> anyhow::Result<()> {
    let ctx = app.call_context();
    let mut secret = app
        .secrets
        .get_stream(&ctx, &args.name, args.version())
        .await?;
    expect_type(&secret.info, SecretType::Text)?;

    println!("{}", render::secret_header(&secret.info));
    println!("\nContent:");

    let mut stdout = tokio::io::stdout();
    ctx.guard(async {
        tokio::io::copy(&mut secret.content, &mut stdout).await?;
        stdout.flush().await?;
        Ok::<_, KeeperError>(())
    })
    .await?;
    Ok(())
}

/// Run `strongbox get-file`.
pub async fn get_file(app: &App, args: GetFileArgs) -> anyhow::Result<()> {
    let output = match args.output {
        Some(path) => path,
        None => default_output(&args.secret.name)?,
    };

    let ctx = app.call_context();
    let mut secret = app
        .secrets
        .get_stream(&ctx, &args.secret.name, args.secret.version())
        .await?;
    expect_type(&secret.info, SecretType::File)?;

    // Content lands in a staging file so an existing output survives a failure.
    let staging = tempfile::NamedTempFile::new_in(output_dir(&output))
        .with_context(|| format!("Failed to create a staging file for {}", output.display()))?;
    let mut file = tokio::fs::File::from_std(
        staging
            .reopen()
            .with_context(|| format!("Failed to open staging file {}", staging.path().display()))?,
    );

    let written = ctx
        .guard(async {
            let written = tokio::io::copy(&mut secret.content, &mut file).await?;
            file.flush().await?;
            Ok::<_, KeeperError>(written)
        })
        .await?;
    drop(file);

    staging
        .persist(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "File '{}' (version {}) saved to {} ({} bytes)",
        secret.info.name,
        secret.info.version,
        output.display(),
        written
    );
    Ok(())
}

/// Directory the output file goes in, for staging the download next to it.
fn output_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Run `strongbox delete`.
pub async fn delete(app: &App, args: DeleteArgs) -> anyhow::Result<()> {
    if !args.yes {
        let question = format!("Delete secret '{}' and all its versions?", args.name);
        if !input::confirm(&question)? {
            println!("Cancelled");
            return Ok(());
        }
    }

    app.secrets.delete(&app.call_context(), &args.name).await?;
    println!("Secret '{}' deleted", args.name);
    Ok(())
}

fn expect_type(info: &SecretInfo, expected: SecretType) -> Result<(), KeeperError> {
    if info.secret_type == expected {
        return Ok(());
    }
    Err(KeeperError::InvalidArgument(format!(
        "secret '{}' holds {}, not {}",
        info.name, info.secret_type, expected
    )))
}

fn decode<T: serde::de::DeserializeOwned>(info: &SecretInfo, data: &[u8]) -> Result<T, KeeperError> {
    serde_json::from_slice(data).map_err(|e| {
        KeeperError::Protocol(format!(
            "secret '{}' version {} is not valid {}: {}",
            info.name, info.version, info.secret_type, e
        ))
    })
}

/// File name to save a downloaded secret under when `--output` is not given.
fn default_output(name: &str) -> Result<PathBuf, KeeperError> {
    Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| {
            KeeperError::InvalidArgument(format!(
                "cannot derive a file name from '{name}', pass --output"
            ))
        })
}
