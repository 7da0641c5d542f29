//! Command-line front end for wavelet-based image search.

pub mod config;
pub mod repl;
pub mod session;
pub mod types;

pub use config::{load_config, resolve_config_path};
pub use session::SearchSession;
pub use types::{CliError, CliResult};
