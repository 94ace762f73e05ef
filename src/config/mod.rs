// Configuration management module
// TOML-backed settings for the Ollama connection, chunking and retrieval

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, HOME_ENV_VAR, OllamaConfig};

/// Get the base directory path
#[inline]
pub fn get_base_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_base_dir()
}
