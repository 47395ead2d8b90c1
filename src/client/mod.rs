//! Client side of the admin session.
//!
//! [`SessionDriver`] logs in through an [`AdminApi`], stores the token with a
//! [`CredentialStore`] and refreshes it shortly before it expires. A failed
//! refresh or an expired token ends the session locally.

pub mod api;
pub mod controller;
pub mod credentials;
pub mod driver;
mod errors;

pub use api::{AdminApi, HttpAdminApi, TokenGrant};
pub use controller::{RestoreOutcome, SessionController, SessionState, TickAction};
pub use credentials::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredCredentials,
};
pub use driver::{SessionDriver, DEFAULT_POLL_INTERVAL};
pub use errors::{login_error_message, ClientError};
