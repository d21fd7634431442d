//! User account service: CRUD and search over a single User aggregate with
//! optimistic concurrency control, soft deletion and password management.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod state;
pub mod users;

pub use error::{UserError, UserResult};
