//! Process-level state shared across the codebase.

mod state;

pub use state::{register_shutdown, setup_shutdown_handler};
