//! API handlers for the admin service.

pub mod auth;
pub mod health;
pub mod logs;
pub mod root;
pub mod settings;
