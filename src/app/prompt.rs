//! Interactive username/password prompt for hosts that demand basic auth.

use async_trait::async_trait;
use cdownloader_core::{CredentialPrompt, Credentials, DownloadError};
use inquire::{InquireError, Password, PasswordDisplayMode, Text};

/// Asks on the controlling terminal. Runs on a blocking thread; the caller
/// is responsible for pausing the progress display meanwhile.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TerminalPrompt;

#[async_trait]
impl CredentialPrompt for TerminalPrompt {
    async fn prompt(&self, host: &str) -> Result<Credentials, DownloadError> {
        let owned_host = host.to_string();
        tokio::task::spawn_blocking(move || ask(&owned_host))
            .await
            .map_err(|error| DownloadError::prompt(host, error.to_string()))?
    }
}

fn ask(host: &str) -> Result<Credentials, DownloadError> {
    let username = Text::new(&format!("Username for {host}:"))
        .prompt()
        .map_err(|error| prompt_error(host, &error))?;
    let password = Password::new(&format!("Password for {username}@{host}:"))
        .without_confirmation()
        .with_display_mode(PasswordDisplayMode::Masked)
        .prompt()
        .map_err(|error| prompt_error(host, &error))?;
    Ok(Credentials::new(username, password))
}

fn prompt_error(host: &str, error: &InquireError) -> DownloadError {
    let reason = match error {
        InquireError::OperationCanceled | InquireError::OperationInterrupted => {
            "aborted by the operator".to_string()
        }
        InquireError::NotTTY => "no terminal available to ask for credentials".to_string(),
        other => other.to_string(),
    };
    DownloadError::prompt(host, reason)
}
