//! Server entry discovery.
//!
//! The server-render entry is taken from, in order: the host's `build.ssr`
//! setting, the plugin's `ssr` option, then the first conventional file that
//! exists under the project root. A host `build.ssr = false` turns the whole
//! SSR pipeline off.

use std::path::Path;

use armonia_config::SsrEntry;

/// Conventional server entry locations, in priority order.
pub const SERVER_ENTRY_CANDIDATES: &[&str] = &[
    "src/entry-server.ts",
    "src/entry-server.js",
    "src/entry-server.tsx",
    "src/entry-server.jsx",
];

/// Entry used when nothing else matches; a missing file surfaces later, when
/// the host tries to load it.
pub const DEFAULT_SERVER_ENTRY: &str = "src/entry-server.js";

/// Where a resolved entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    Host,
    Plugin,
    Convention,
    Default,
}

/// Outcome of server entry discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryResolution {
    /// SSR is switched off for this build.
    Disabled,
    Entry { module: String, source: EntrySource },
}

impl EntryResolution {
    pub fn module(&self) -> Option<&str> {
        match self {
            EntryResolution::Entry { module, .. } => Some(module),
            EntryResolution::Disabled => None,
        }
    }
}

/// Resolve the server entry for a project.
///
/// `host` is the host's `build.ssr` setting and `input` the host's build
/// input, used when `build.ssr` is `true`. `plugin` is the plugin's own
/// `ssr` option.
pub fn resolve_server_entry(
    root: &Path,
    host: Option<&SsrEntry>,
    input: Option<&str>,
    plugin: Option<&SsrEntry>,
) -> EntryResolution {
    match host {
        Some(SsrEntry::Enabled(false)) => return EntryResolution::Disabled,
        Some(SsrEntry::Module(module)) if !module.is_empty() => {
            return entry(module, EntrySource::Host);
        }
        Some(SsrEntry::Enabled(true)) => {
            if let Some(input) = input.filter(|input| !input.is_empty()) {
                return entry(input, EntrySource::Host);
            }
        }
        _ => {}
    }

    match plugin {
        Some(SsrEntry::Enabled(false)) => return EntryResolution::Disabled,
        Some(SsrEntry::Module(module)) if !module.is_empty() => {
            return entry(module, EntrySource::Plugin);
        }
        _ => {}
    }

    match locate(root, SERVER_ENTRY_CANDIDATES) {
        Some(found) => entry(found, EntrySource::Convention),
        None => {
            tracing::debug!(
                root = %root.display(),
                "no server entry found, using {DEFAULT_SERVER_ENTRY}"
            );
            entry(DEFAULT_SERVER_ENTRY, EntrySource::Default)
        }
    }
}

/// First candidate, relative to `root`, that exists on disk.
pub fn locate<'a>(root: &Path, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .find(|candidate| root.join(candidate).exists())
}

fn entry(module: &str, source: EntrySource) -> EntryResolution {
    EntryResolution::Entry {
        module: module.to_string(),
        source,
    }
}
