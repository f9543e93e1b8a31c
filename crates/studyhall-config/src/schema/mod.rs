//! Configuration schema types for studyhall.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod backend;
mod presence;
mod system;

pub use backend::*;
pub use presence::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Root configuration for studyhall.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StudyhallConfig {
    pub backend: BackendConfig,
    pub presence: PresenceConfig,
    pub logging: LoggingConfig,
}
