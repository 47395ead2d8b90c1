use clap::{Arg, Command};

pub const NAME: &str = "session";

#[must_use]
pub fn command() -> Command {
    Command::new(NAME)
        .about("Log in to an admin API and keep the session alive until interrupted")
        .arg(
            Arg::new("api-base")
                .long("api-base")
                .help("Base URL of the admin API")
                .env("FOLIO_API_BASE")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new("password")
                .long("password")
                .help("Admin password")
                .env("FOLIO_ADMIN_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("recaptcha-token")
                .long("recaptcha-token")
                .help("reCAPTCHA token to send with the login")
                .env("FOLIO_RECAPTCHA_TOKEN"),
        )
        .arg(
            Arg::new("credentials-file")
                .long("credentials-file")
                .help("Where the session token is kept between runs")
                .env("FOLIO_CREDENTIALS_FILE")
                .default_value(".folio-session.json")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            Arg::new("poll-interval-seconds")
                .long("poll-interval-seconds")
                .help("How often the session expiry is checked")
                .env("FOLIO_POLL_INTERVAL_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
