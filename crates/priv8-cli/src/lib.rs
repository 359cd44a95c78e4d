//! priv8 command-line driver
//!
//! A thin layer over [`priv8_client::StorageOrchestrator`]: settings loading,
//! wallet loading and one function per subcommand.

pub mod commands;
pub mod settings;

pub use settings::Settings;
