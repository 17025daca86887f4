//! Configuration sections of `bolted.toml`.

mod paths;
mod reload;

pub use paths::PathsConfig;
pub use reload::ReloadConfig;
