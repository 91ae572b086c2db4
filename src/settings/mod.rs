//! Persistent settings stored in `config.toml` under the app root.

mod defaults;
mod io;
mod types;


pub use io::{CONFIG_FILE_NAME, config_path, load_from, load_or_default, save, save_to_path};
pub use types::{
    AppSettings, ClassifierSettings, ConfigError, ModelSettings, SchedulerSettings,
    StorageSettings,
};
