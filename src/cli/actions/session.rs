use crate::{
    client::{FileCredentialStore, HttpAdminApi, SessionDriver, SessionState},
    clock::SystemClock,
};
use anyhow::{anyhow, Result};
use secrecy::{ExposeSecret, SecretString};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub api_base: String,
    pub password: SecretString,
    pub recaptcha_token: Option<String>,
    pub credentials_file: PathBuf,
    pub poll_interval_seconds: u64,
}

/// Log in (or resume a stored session) and keep it refreshed until ctrl-c
/// or until the session ends on its own.
/// # Errors
/// Returns an error if the login is rejected or credentials cannot be read.
pub async fn execute(args: Args) -> Result<()> {
    let poll_interval = Duration::from_secs(args.poll_interval_seconds);
    let driver = SessionDriver::start(
        Arc::new(HttpAdminApi::new(&args.api_base)?),
        Arc::new(FileCredentialStore::new(args.credentials_file)),
        Arc::new(SystemClock),
        poll_interval,
    )
    .await?;

    if driver.state().await == SessionState::LoggedOut {
        if let Err(err) = driver
            .login(
                args.password.expose_secret(),
                args.recaptcha_token.as_deref(),
            )
            .await
        {
            let message = driver.message().await.unwrap_or_else(|| err.to_string());
            driver.shutdown().await;
            return Err(anyhow!(message));
        }
        info!("Logged in to {}", args.api_base);
    } else {
        info!("Resumed stored session for {}", args.api_base);
    }

    let mut watch = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!("Failed to listen for shutdown signal: {err}");
                }
                driver.logout().await;
                info!("Logged out");
                break;
            }
            _ = watch.tick() => {
                if driver.state().await == SessionState::LoggedOut {
                    warn!("Session ended");
                    break;
                }
            }
        }
    }

    driver.shutdown().await;
    Ok(())
}
