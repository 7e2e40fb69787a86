mod raw;
mod loader;
pub mod error;
pub mod settings;

pub use loader::{load_config, load_config_or_default, CONFIG_FILE_NAME};
pub use error::ConfigError;
pub use settings::SmokeConfig;
