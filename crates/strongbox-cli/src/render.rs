//! Terminal rendering utilities.
//!
//! Formatting is kept in plain functions returning strings; commands decide
//! where to print them.

use console::style;
use strongbox_core::{Credentials, KeeperError, PaymentCard, SecretInfo};

/// Render the `list` output.
pub fn secret_list(names: &[String]) -> String {
    if names.is_empty() {
        return "No secrets found".to_string();
    }

    let mut out = String::from("Stored secrets:");
    for name in names {
        out.push_str("\n  - ");
        out.push_str(name);
    }
    out
}

/// Render the info block printed before any secret content.
pub fn secret_header(info: &SecretInfo) -> String {
    let mut out = format!(
        "Name: {}\nVersion: {}\nCreated: {}",
        info.name,
        info.version,
        info.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    if !info.metadata.is_empty() {
        out.push_str("\nMetadata: ");
        out.push_str(&info.metadata);
    }
    out
}

pub fn credentials(credentials: &Credentials) -> String {
    format!(
        "Login: {}\nPassword: {}",
        credentials.login, credentials.password
    )
}

pub fn payment_card(card: &PaymentCard) -> String {
    format!("Card number: {}", card.number)
}

/// One-line description of a failed command.
pub fn failure(err: &anyhow::Error) -> String {
    let Some(keeper) = err.chain().find_map(|e| e.downcast_ref::<KeeperError>()) else {
        return format!("{err:#}");
    };

    match keeper {
        KeeperError::Unauthenticated(m) => {
            format!("Not authenticated: {m}. Run `strongbox login` and try again.")
        }
        KeeperError::AlreadyExists(m) => format!("Already exists: {m}"),
        KeeperError::InvalidArgument(m) => format!("Invalid input: {m}"),
        KeeperError::NotFound(m) => format!("Not found: {m}"),
        KeeperError::Protocol(m) => format!("Unexpected response from the server: {m}"),
        KeeperError::Transport(m) => format!("Could not reach the server: {m}"),
    }
}

/// Print a failure to stderr.
pub fn render_failure(err: &anyhow::Error) {
    eprintln!("{}: {}", style("Error").for_stderr().red().bold(), failure(err));
}
