use crate::{
    api::{
        self,
        handlers::{
            auth::{
                AuthConfig, AuthService, BotVerifier, DisabledBotVerifier, InMemoryRateLimiter,
                RecaptchaVerifier,
            },
            settings::SettingsGate,
        },
        notify::{HttpNotifier, LogNotifier, LoginAlerts, Notifier},
    },
    store::{PgStore, Stores},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub frontend_base_url: Option<String>,
    pub admin_password: SecretString,
    pub admin_api_secret: Option<SecretString>,
    pub session_ttl_seconds: i64,
    pub trust_proxy_headers: bool,
    pub recaptcha_secret: Option<SecretString>,
    pub recaptcha_verify_url: String,
    pub recaptcha_min_score: f64,
    pub rate_limit_max_attempts: u32,
    pub rate_limit_window_seconds: i64,
    pub notify_url: Option<String>,
    pub notify_api_key: Option<SecretString>,
    pub notify_from: String,
    pub notify_to: String,
}

async fn stores(dsn: Option<&str>) -> Result<Stores> {
    let Some(dsn) = dsn else {
        warn!("No DSN configured, sessions and logs are kept in memory");
        return Ok(Stores::memory());
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    info!("Connected to database");

    let store = PgStore::new(pool);
    store.apply_schema().await?;
    info!("Database schema is up to date");

    Ok(Stores::from_backend(Arc::new(store)))
}

fn bot_verifier(args: &Args) -> Result<Arc<dyn BotVerifier>> {
    match &args.recaptcha_secret {
        Some(secret) => {
            let verifier = RecaptchaVerifier::new(secret.clone())
                .context("Failed to build reCAPTCHA client")?
                .with_verify_url(args.recaptcha_verify_url.clone())
                .with_min_score(args.recaptcha_min_score);
            Ok(Arc::new(verifier))
        }
        None => {
            warn!("No reCAPTCHA secret configured, bot check disabled");
            Ok(Arc::new(DisabledBotVerifier))
        }
    }
}

fn login_alerts(args: &Args) -> Result<LoginAlerts> {
    let notifier: Arc<dyn Notifier> = match (&args.notify_url, &args.notify_api_key) {
        (Some(url), Some(key)) => Arc::new(HttpNotifier::new(url.clone(), key.clone())?),
        _ => Arc::new(LogNotifier),
    };
    Ok(LoginAlerts::new(
        notifier,
        args.notify_from.clone(),
        args.notify_to.clone(),
    ))
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let stores = stores(args.dsn.as_deref()).await?;

    let limiter = InMemoryRateLimiter::new(
        args.rate_limit_max_attempts,
        chrono::Duration::seconds(args.rate_limit_window_seconds),
    );

    let config = AuthConfig::new(args.admin_password.clone())
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_trust_proxy_headers(args.trust_proxy_headers);
    if args.trust_proxy_headers {
        info!("Client addresses are taken from proxy headers");
    }

    let auth = AuthService::new(config, stores.sessions.clone(), stores.logs.clone())
        .with_rate_limiter(Arc::new(limiter))
        .with_bot_verifier(bot_verifier(&args)?)
        .with_alerts(login_alerts(&args)?);

    if args.admin_api_secret.is_none() {
        warn!("No admin API secret configured, settings endpoints will reject every request");
    }
    let gate = SettingsGate::new(args.admin_api_secret.clone());

    api::new(
        args.port,
        args.frontend_base_url.as_deref(),
        Arc::new(auth),
        stores,
        gate,
    )
    .await
}
