//! Pantry common library
//!
//! Shared error handling and logging for the pantry workspace.
//!
//! - **Error Handling**: [`PantryError`] and its [`Result`] alias
//! - **Logging**: [`logging::init_logging`] configured from `LOG_*` variables

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

pub use error::{PantryError, Result};
