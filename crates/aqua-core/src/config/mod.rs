//! Workspace configuration: discovery, parsing, and registry declarations

mod finder;
mod reader;
mod types;

pub use finder::{find, finds, CONFIG_FILE_NAMES};
pub use reader::ConfigReader;
pub use types::{ChecksumSettings, Config, PackageRef, Registry, RegistrySource};

pub(crate) use types::vec_or_null;
