//! Sealvault Core - Shared functionality for the sealvault tools
//!
//! Standard directory locations and the JSON configuration file that
//! tells the CLI where a project's secrets live.

pub mod config;
pub mod paths;

pub use config::Config;
pub use paths::Paths;
