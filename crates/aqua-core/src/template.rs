//! Rendering of registry template fields
//!
//! Registry files template `asset`, `url`, `files[].src` and `format` with
//! Go-template tokens such as `{{.Version}}`. The tokens are translated to
//! Tera syntax and rendered with a fixed variable set; anything outside the
//! simple `{{.Name}}` form is rejected rather than silently passed through.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::runtime::Runtime;

/// The variable set available to registry templates
#[derive(Debug, Clone, Default)]
pub struct Vars {
    pub version: String,
    pub sem_ver: String,
    pub os: String,
    pub arch: String,
    pub format: String,
    pub file_name: String,
    pub asset: String,
}

impl Vars {
    /// Variables for a package at a version on a runtime.
    ///
    /// `SemVer` is the version with a leading `v` stripped, matching the
    /// common `v1.2.3` tag convention.
    pub fn new(rt: &Runtime, version: &str) -> Self {
        Self {
            version: version.to_string(),
            sem_ver: version.strip_prefix('v').unwrap_or(version).to_string(),
            os: rt.os.clone(),
            arch: rt.arch.clone(),
            ..Self::default()
        }
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = asset.into();
        self
    }

    fn context(&self) -> tera::Context {
        let mut ctx = tera::Context::new();
        ctx.insert("Version", &self.version);
        ctx.insert("SemVer", &self.sem_ver);
        ctx.insert("OS", &self.os);
        ctx.insert("Arch", &self.arch);
        ctx.insert("Format", &self.format);
        ctx.insert("FileName", &self.file_name);
        ctx.insert("Asset", &self.asset);
        ctx
    }
}

fn field_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*\.(\w+)\s*\}\}").expect("valid regex"))
}

/// Render a Go-template string with the given variables
pub fn render(template: &str, vars: &Vars) -> Result<String> {
    let translated = field_token().replace_all(template, "{{$1}}");
    if translated.contains("{{.") {
        return Err(Error::template(template, "unsupported template expression"));
    }
    tera::Tera::one_off(&translated, &vars.context(), false)
        .map_err(|e| Error::template(template, message_chain(&e)))
}

// Tera reports "Failed to render ..." at the top; the cause is what matters.
fn message_chain(err: &tera::Error) -> String {
    let mut msg = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
