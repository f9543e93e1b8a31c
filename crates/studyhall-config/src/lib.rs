//! studyhall configuration system.
//!
//! TOML-based configuration with full validation. All sections use
//! defaults so partial configs work out of the box.
//!
//! ```rust,no_run
//! let config = studyhall_config::load_config(None).expect("failed to load config");
//! println!("heartbeat every {}s", config.presence.heartbeat_interval_secs);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::StudyhallConfig;

use std::path::Path;
use studyhall_common::ConfigError;

/// Load config from `path`, or from the platform default path when `None`,
/// and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<StudyhallConfig, ConfigError> {
    let config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };
    validation::validate(&config)?;
    Ok(config)
}
