//! Account commands.
//!
//! `strongbox register` and `strongbox login` both end with the issued token
//! stored in the token file, which every later command reads.

use clap::Args;

use crate::app::App;
use crate::input;

/// Login and password of an account.
#[derive(Args)]
pub struct AccountArgs {
    /// Account login
    #[arg(short, long)]
    pub login: String,

    /// Account password (if omitted, prompts for hidden input)
    #[arg(short, long)]
    pub password: Option<String>,
}

/// Run `strongbox register`.
pub async fn register(app: &App, args: AccountArgs) -> anyhow::Result<()> {
    let password = input::password_or_prompt(args.password, "Choose a password: ")?;
    app.auth
        .register(&app.call_context(), &args.login, &password)
        .await?;
    println!("Registered '{}' and logged in", args.login);
    Ok(())
}

/// Run `strongbox login`.
pub async fn login(app: &App, args: AccountArgs) -> anyhow::Result<()> {
    let password = input::password_or_prompt(args.password, "Password: ")?;
    app.auth
        .login(&app.call_context(), &args.login, &password)
        .await?;
    println!("Logged in as '{}'", args.login);
    Ok(())
}
