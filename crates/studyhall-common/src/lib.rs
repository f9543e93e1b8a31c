pub mod errors;

pub use errors::{ConfigError, StudyhallError};

pub type Result<T> = std::result::Result<T, StudyhallError>;
