//! muse-server: the remote note endpoint.
//!
//! Serves the authoritative note table over HTTP and applies the remote tag
//! counter to every note mutation.

pub mod server;
pub mod state;

pub use server::{ApiError, create_router, run};
pub use state::AppState;
