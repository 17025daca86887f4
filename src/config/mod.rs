//! Manager configuration from `bolted.toml`.
//!
//! ```toml
//! [paths]            # modules root, apps root, instances file
//! [reload]           # debounce window, callback timeouts, op budget
//! ```
//!
//! Every path is relative to the directory holding the config file, or to the
//! working directory when no file is found.

mod error;
pub mod section;
mod util;

pub use error::ConfigError;
pub use section::{PathsConfig, ReloadConfig};

use util::find_config_file;

use crate::cli::{Cli, Commands};
use crate::log;
use crate::source::Layout;
use crate::utils::path::normalize_path;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoltedConfig {
    /// Config file actually read, if any
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Base for relative paths
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub reload: ReloadConfig,
}

impl BoltedConfig {
    /// Find, parse and validate the config named by `-C`, then apply CLI overrides.
    ///
    /// Only the default name may be absent.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir()
            .map_err(|err| ConfigError::Io(PathBuf::from("."), err))?;

        let mut config = match find_config_file(&cli.config) {
            Some(path) => {
                let path = normalize_path(&path);
                let mut config = Self::from_path(&path)?;
                config.root = path.parent().map(Path::to_path_buf).unwrap_or(cwd);
                config.config_path = Some(path);
                config
            }
            None if cli.config != Path::new("bolted.toml") => {
                return Err(ConfigError::NotFound(cli.config.clone()));
            }
            None => {
                crate::debug!("config"; "no {} found, using defaults", cli.config.display());
                Self {
                    root: cwd,
                    ..Self::default()
                }
            }
        };

        config.apply_command_options(cli);
        config.paths.resolve(&config.root);
        config.validate()?;
        Ok(config)
    }

    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let (config, unknown) = Self::parse_with_ignored(&text)?;
        for key in &unknown {
            log!("warning"; "{}: unknown key `{}` ignored", path.display(), key);
        }
        Ok(config)
    }

    /// Deserialize, returning the dotted paths of keys nothing consumed.
    fn parse_with_ignored(text: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut unknown = Vec::new();
        let de = toml::Deserializer::new(text);
        let config = serde_ignored::deserialize(de, |key: serde_ignored::Path| {
            unknown.push(key.to_string());
        })?;
        Ok((config, unknown))
    }

    /// CLI flags win over the file. Relative overrides resolve against the
    /// project root, like the file's own paths.
    fn apply_command_options(&mut self, cli: &Cli) {
        if let Some(modules) = &cli.modules {
            self.paths.modules = modules.clone();
        }
        if let Some(apps) = &cli.apps {
            self.paths.apps = apps.clone();
        }
        if let Some(instances) = &cli.instances {
            self.paths.instances = instances.clone();
        }
        if let Commands::Run { debounce: Some(ms) } = cli.command {
            self.reload.debounce_ms = ms;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.reload.debounce_ms == 0 {
            return Err(ConfigError::Validation(
                "[reload] debounce_ms must be positive".into(),
            ));
        }
        if self.reload.startup_timeout_ms == 0 || self.reload.shutdown_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "[reload] callback timeouts must be positive".into(),
            ));
        }
        if self.paths.modules == self.paths.apps {
            return Err(ConfigError::Validation(format!(
                "[paths] modules and apps must differ (both `{}`)",
                self.paths.modules.display()
            )));
        }
        Ok(())
    }

    /// Source layout with normalized roots.
    pub fn layout(&self) -> Layout {
        Layout::new(&self.paths.modules, &self.paths.apps, &self.paths.instances)
    }
}

/// Parse a config string for section tests.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> BoltedConfig {
    toml::from_str(content).expect("valid test config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_collected() {
        let (config, ignored) = BoltedConfig::parse_with_ignored(
            "[paths]\napps = \"automations\"\nextra = 1\n\n[watch]\nx = 2",
        )
        .unwrap();
        assert_eq!(config.paths.apps, PathBuf::from("automations"));
        assert_eq!(ignored, vec!["paths.extra", "watch"]);
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            BoltedConfig::parse_with_ignored("[paths"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_debounce() {
        let mut config = test_parse_config("[reload]\ndebounce_ms = 0");
        config.paths.resolve(Path::new("/srv"));
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_cli_overrides_resolve_against_root() {
        use clap::Parser;

        let cli = Cli::parse_from(["bolted", "check", "--apps", "automations"]);
        let mut config = BoltedConfig {
            root: PathBuf::from("/srv/home"),
            ..BoltedConfig::default()
        };
        config.apply_command_options(&cli);
        config.paths.resolve(&config.root);

        assert_eq!(config.paths.apps, PathBuf::from("/srv/home/automations"));
        assert_eq!(config.paths.modules, PathBuf::from("/srv/home/modules"));
        assert!(config.validate().is_ok());
    }
}
