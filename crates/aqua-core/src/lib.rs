//! # aqua-core
//!
//! Core library for the aqua CLI providing:
//! - Workspace configuration discovery and parsing (aqua.yaml)
//! - Registry content model (package definitions, overrides, templates)
//! - Checksum storage (aqua-checksums.json)
//! - Runtime (OS/arch) probing and policy evaluation

pub mod checksum;
pub mod config;
pub mod error;
pub mod param;
pub mod policy;
pub mod registry;
pub mod runtime;
pub mod template;
pub mod util;

pub use error::{Error, Result};
pub use param::Param;
pub use runtime::Runtime;
