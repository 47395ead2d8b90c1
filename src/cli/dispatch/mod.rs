//! Map validated CLI arguments to an [`Action`].

use crate::cli::{
    actions::{server, session, Action},
    commands,
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::path::PathBuf;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((commands::server::NAME, sub)) => server_args(sub).map(Action::Server),
        Some((commands::session::NAME, sub)) => session_args(sub).map(Action::Session),
        Some((name, _)) => Err(anyhow!("unknown command: {name}")),
        None => Err(anyhow!("missing command")),
    }
}

fn secret(matches: &clap::ArgMatches, id: &str) -> Option<SecretString> {
    matches
        .get_one::<String>(id)
        .filter(|value| !value.is_empty())
        .map(|value| SecretString::from(value.clone()))
}

fn string(matches: &clap::ArgMatches, id: &str) -> Option<String> {
    matches
        .get_one::<String>(id)
        .filter(|value| !value.is_empty())
        .cloned()
}

fn server_args(matches: &clap::ArgMatches) -> Result<server::Args> {
    let admin_password =
        secret(matches, "admin-password").context("missing required argument: --admin-password")?;

    Ok(server::Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: string(matches, "dsn"),
        frontend_base_url: string(matches, "frontend-base-url"),
        admin_password,
        admin_api_secret: secret(matches, "admin-api-secret"),
        session_ttl_seconds: matches
            .get_one::<i64>("session-ttl-seconds")
            .copied()
            .unwrap_or(900),
        trust_proxy_headers: matches.get_flag("trust-proxy-headers"),
        recaptcha_secret: secret(matches, "recaptcha-secret"),
        recaptcha_verify_url: string(matches, "recaptcha-verify-url")
            .context("missing required argument: --recaptcha-verify-url")?,
        recaptcha_min_score: matches
            .get_one::<f64>("recaptcha-min-score")
            .copied()
            .unwrap_or(0.5),
        rate_limit_max_attempts: matches
            .get_one::<u32>("rate-limit-max-attempts")
            .copied()
            .unwrap_or(5),
        rate_limit_window_seconds: matches
            .get_one::<i64>("rate-limit-window-seconds")
            .copied()
            .unwrap_or(900),
        notify_url: string(matches, "notify-url"),
        notify_api_key: secret(matches, "notify-api-key"),
        notify_from: string(matches, "notify-from").unwrap_or_else(|| "admin@localhost".into()),
        notify_to: string(matches, "notify-to").unwrap_or_else(|| "admin@localhost".into()),
    })
}

fn session_args(matches: &clap::ArgMatches) -> Result<session::Args> {
    Ok(session::Args {
        api_base: string(matches, "api-base").context("missing required argument: --api-base")?,
        password: secret(matches, "password").context("missing required argument: --password")?,
        recaptcha_token: string(matches, "recaptcha-token"),
        credentials_file: matches
            .get_one::<PathBuf>("credentials-file")
            .cloned()
            .context("missing required argument: --credentials-file")?,
        poll_interval_seconds: matches
            .get_one::<u64>("poll-interval-seconds")
            .copied()
            .unwrap_or(10),
    })
}
