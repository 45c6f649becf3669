//! # aqua-install
//!
//! The resolve-install-exec pipeline: acquiring registries into the
//! content-addressed cache, resolving executables to package plans,
//! materializing package binaries, planting proxy links, and handing off
//! execution.

mod exec;
mod link;
mod package;
mod registry;
mod verify;
mod which;

pub use exec::{ExecController, Executor};
pub use link::{
    create_link, create_proxy_link, ensure_proxy, hardlinks_enabled, replace_with_hardlinks,
    FileKind, Linker, OsLinker, HARDLINK_SENTINEL,
};
pub use package::{InstallParams, PackageInstaller};
pub use registry::RegistryInstaller;
pub use verify::{CommandVerifier, NoopVerifier, SignatureKind, SignatureVerifier, VerifyRequest};
pub use which::{FindResult, PackagePlan, WhichController};
