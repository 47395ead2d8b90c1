use clap::{Arg, ArgAction, Command};

pub const NAME: &str = "server";

#[must_use]
pub fn command() -> Command {
    let command = Command::new(NAME)
        .about("Run the admin API server")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("FOLIO_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("Database connection string")
                .long_help(
                    "Postgres connection string. Without it sessions, logs and settings are kept in memory and lost on restart.",
                )
                .env("FOLIO_DSN"),
        )
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend origin allowed by CORS")
                .env("FOLIO_FRONTEND_BASE_URL"),
        );

    let command = with_auth_args(command);
    let command = with_captcha_args(command);
    let command = with_rate_limit_args(command);
    with_notify_args(command)
}

fn with_auth_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("admin-password")
                .long("admin-password")
                .help("Shared admin password")
                .env("FOLIO_ADMIN_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("admin-api-secret")
                .long("admin-api-secret")
                .help("Secret expected in the x-admin-token header for settings")
                .env("FOLIO_ADMIN_API_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Admin session lifetime in seconds")
                .env("FOLIO_SESSION_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(60..)),
        )
}

fn with_captcha_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("recaptcha-secret")
                .long("recaptcha-secret")
                .help("reCAPTCHA v3 secret; the bot check is off without it")
                .env("FOLIO_RECAPTCHA_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("recaptcha-verify-url")
                .long("recaptcha-verify-url")
                .help("reCAPTCHA siteverify endpoint")
                .env("FOLIO_RECAPTCHA_VERIFY_URL")
                .default_value(crate::api::handlers::auth::captcha::DEFAULT_VERIFY_URL),
        )
        .arg(
            Arg::new("recaptcha-min-score")
                .long("recaptcha-min-score")
                .help("Minimum reCAPTCHA score accepted")
                .env("FOLIO_RECAPTCHA_MIN_SCORE")
                .default_value("0.5")
                .value_parser(clap::value_parser!(f64)),
        )
}

fn with_rate_limit_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("rate-limit-max-attempts")
                .long("rate-limit-max-attempts")
                .help("Login attempts allowed per client IP and window")
                .env("FOLIO_RATE_LIMIT_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("rate-limit-window-seconds")
                .long("rate-limit-window-seconds")
                .help("Length of the login rate limit window in seconds")
                .env("FOLIO_RATE_LIMIT_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new("trust-proxy-headers")
                .long("trust-proxy-headers")
                .help("Identify clients by x-forwarded-for/x-real-ip (trusted proxy only)")
                .env("FOLIO_TRUST_PROXY_HEADERS")
                .action(ArgAction::SetTrue),
        )
}

fn with_notify_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("notify-url")
                .long("notify-url")
                .help("HTTP endpoint that delivers login alert emails")
                .env("FOLIO_NOTIFY_URL")
                .requires("notify-api-key"),
        )
        .arg(
            Arg::new("notify-api-key")
                .long("notify-api-key")
                .help("Bearer key for the notification endpoint")
                .env("FOLIO_NOTIFY_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new("notify-from")
                .long("notify-from")
                .help("Sender address for login alerts")
                .env("FOLIO_NOTIFY_FROM")
                .default_value("admin@localhost"),
        )
        .arg(
            Arg::new("notify-to")
                .long("notify-to")
                .help("Recipient address for login alerts")
                .env("FOLIO_NOTIFY_TO")
                .default_value("admin@localhost"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        temp_env::with_vars(
            [
                ("FOLIO_ADMIN_PASSWORD", Some("hunter2")),
                ("FOLIO_DSN", None::<&str>),
                ("FOLIO_PORT", None),
                ("FOLIO_SESSION_TTL_SECONDS", None),
                ("FOLIO_RATE_LIMIT_MAX_ATTEMPTS", None),
                ("FOLIO_RATE_LIMIT_WINDOW_SECONDS", None),
                ("FOLIO_TRUST_PROXY_HEADERS", None),
            ],
            || {
                let matches = command().get_matches_from(vec!["server"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(8080));
                assert!(!matches.get_flag("trust-proxy-headers"));
                assert_eq!(matches.get_one::<String>("dsn"), None);
                assert_eq!(
                    matches.get_one::<i64>("session-ttl-seconds").copied(),
                    Some(900)
                );
                assert_eq!(
                    matches.get_one::<u32>("rate-limit-max-attempts").copied(),
                    Some(5)
                );
                assert_eq!(
                    matches.get_one::<i64>("rate-limit-window-seconds").copied(),
                    Some(900)
                );
                assert_eq!(
                    matches.get_one::<f64>("recaptcha-min-score").copied(),
                    Some(0.5)
                );
            },
        );
    }

    #[test]
    fn test_trust_proxy_headers_flag() {
        temp_env::with_vars(
            [
                ("FOLIO_ADMIN_PASSWORD", Some("hunter2")),
                ("FOLIO_TRUST_PROXY_HEADERS", None::<&str>),
            ],
            || {
                let matches =
                    command().get_matches_from(vec!["server", "--trust-proxy-headers"]);
                assert!(matches.get_flag("trust-proxy-headers"));
            },
        );
    }

    #[test]
    fn test_admin_password_required() {
        temp_env::with_vars([("FOLIO_ADMIN_PASSWORD", None::<&str>)], || {
            let result = command().try_get_matches_from(vec!["server"]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_notify_url_requires_key() {
        temp_env::with_vars(
            [
                ("FOLIO_ADMIN_PASSWORD", Some("hunter2")),
                ("FOLIO_NOTIFY_API_KEY", None::<&str>),
            ],
            || {
                let result = command().try_get_matches_from(vec![
                    "server",
                    "--notify-url",
                    "https://mail.folio.dev/send",
                ]);
                assert!(result.is_err());
            },
        );
    }

    #[test]
    fn test_zero_attempts_rejected() {
        temp_env::with_vars([("FOLIO_ADMIN_PASSWORD", Some("hunter2"))], || {
            let result = command().try_get_matches_from(vec![
                "server",
                "--rate-limit-max-attempts",
                "0",
            ]);
            assert!(result.is_err());
        });
    }
}
