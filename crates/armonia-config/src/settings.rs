//! Serializable plugin settings.
//!
//! These are the data half of the plugin options. Callbacks (render,
//! static render, template and manifest transforms) cannot be expressed in a
//! config file and are attached programmatically in the `armonia` crate.

use std::path::Component;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default sub-directory of the output directory that receives the client
/// assets of a server-rendered build.
pub const DEFAULT_SERVER_ROOT: &str = "www";

/// Top-level plugin configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmoniaConfig {
    /// Build target such as `spa`, `ssr`, `ssg`, `electron` or `ssr-pwa`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Options used by the `ssr` target.
    #[serde(default)]
    pub ssr: SsrSettings,

    /// Options used by the `ssg` target.
    #[serde(default)]
    pub ssg: SsrSettings,

    /// Options used by the `electron` target.
    #[serde(default)]
    pub electron: ElectronSettings,
}

/// Either an explicit boolean switch or a module path.
///
/// Mirrors the host's `build.ssr` setting: `false` disables the SSR pipeline,
/// `true` means "use the build input", a string names the entry module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SsrEntry {
    Enabled(bool),
    Module(String),
}

impl SsrEntry {
    pub fn as_module(&self) -> Option<&str> {
        match self {
            SsrEntry::Module(module) => Some(module),
            SsrEntry::Enabled(_) => None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, SsrEntry::Enabled(false))
    }
}

/// Settings shared by the SSR and SSG pipelines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsrSettings {
    /// Sub-directory of the output directory for client assets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_root: Option<String>,

    /// Server entry module override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssr: Option<SsrEntry>,

    /// Host configuration override merged into the server build config.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,

    /// Whether the captured manifest and template are written at the
    /// bundle root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_manifest: Option<bool>,
}

impl SsrSettings {
    /// The server root with leading and trailing `/`, `\` and `.` removed,
    /// normalized to a relative `/`-separated path.
    ///
    /// Falls back to [`DEFAULT_SERVER_ROOT`] when unset, when nothing is left
    /// after trimming, or when the path would climb out of the output
    /// directory.
    pub fn server_root(&self) -> String {
        let raw = self.server_root.as_deref().unwrap_or(DEFAULT_SERVER_ROOT);
        let trimmed = trim_any(raw, &['/', '\\', '.']).replace('\\', "/");
        let cleaned = path_clean::clean(&trimmed);

        let mut parts = Vec::new();
        for component in cleaned.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return DEFAULT_SERVER_ROOT.to_string(),
            }
        }

        if parts.is_empty() {
            DEFAULT_SERVER_ROOT.to_string()
        } else {
            parts.join("/")
        }
    }

    pub fn write_manifest(&self) -> bool {
        self.write_manifest.unwrap_or(true)
    }
}

/// Settings for the Electron pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectronSettings {
    /// Electron main module, relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    /// Electron preload module, relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preload: Option<String>,

    /// Extra arguments passed to the electron process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub argv: Vec<String>,

    /// Location of `package.json` relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_json: Option<String>,

    /// Host configuration override for the electron build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

fn trim_any<'a>(value: &'a str, chars: &[char]) -> &'a str {
    value.trim_matches(|c: char| chars.contains(&c))
}
