pub mod server;
pub mod session;

use anyhow::Result;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    Session(session::Args),
}

impl Action {
    /// Execute the action
    /// # Errors
    /// Returns an error if the action fails
    pub async fn execute(self) -> Result<()> {
        let result = match self {
            Action::Server(args) => server::execute(args).await,
            Action::Session(args) => session::execute(args).await,
        };
        crate::cli::telemetry::shutdown_tracer();
        result
    }
}
