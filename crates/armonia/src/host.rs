//! The host bundler as seen from the plugin.
//!
//! armonia does not bundle anything itself. Everything it needs from the
//! host (the resolved configuration, a nested in-memory build, the index-HTML
//! transform hook and server-module loading) is expressed here as plain data
//! types and async traits the host implements.

use std::any::Any;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use armonia_config::SsrEntry;
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Default file name of the client build's SSR manifest.
pub const DEFAULT_MANIFEST_FILE: &str = "ssr-manifest.json";

/// Default HTML input of the client build.
pub const DEFAULT_TEMPLATE_FILE: &str = "index.html";

/// Which host command is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Build,
    Serve,
}

/// What the host passes to the configuration hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEnv {
    pub command: Command,
    pub mode: String,
    /// Project root used for file discovery during configuration.
    pub root: PathBuf,
}

impl ConfigEnv {
    pub fn new(command: Command, mode: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            command,
            mode: mode.into(),
            root: root.into(),
        }
    }

    pub fn is_production_build(&self) -> bool {
        self.command == Command::Build && self.mode == "production"
    }
}

/// The host's resolved configuration, reduced to the fields armonia reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolvedConfig {
    pub root: PathBuf,
    pub base: String,
    pub mode: String,
    pub command: Option<Command>,
    pub config_file: Option<PathBuf>,
    pub build: BuildSettings,
    pub server: ServerSettings,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            base: "/".to_string(),
            mode: "development".to_string(),
            command: None,
            config_file: None,
            build: BuildSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildSettings {
    pub out_dir: PathBuf,
    pub ssr: Option<SsrEntry>,
    /// `true`, `false` or the manifest file name.
    pub ssr_manifest: Option<Value>,
    pub write: bool,
    pub empty_out_dir: Option<bool>,
    pub rollup_options: RollupOptions,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("dist"),
            ssr: None,
            ssr_manifest: None,
            write: true,
            empty_out_dir: None,
            rollup_options: RollupOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RollupOptions {
    /// A string, an array of strings, or a name to path map.
    pub input: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub headers: IndexMap<String, String>,
}

impl ResolvedConfig {
    /// Build from the host's resolved configuration JSON.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    /// The output directory as an absolute path.
    pub fn out_dir(&self) -> PathBuf {
        path_clean::clean(self.root.join(&self.build.out_dir))
    }

    /// The build input when it is a single string.
    pub fn input(&self) -> Option<&str> {
        self.build.rollup_options.input.as_ref()?.as_str()
    }

    /// File name of the SSR manifest emitted by the client build.
    pub fn manifest_file_name(&self) -> String {
        match &self.build.ssr_manifest {
            Some(Value::String(name)) if !name.is_empty() => name.clone(),
            _ => DEFAULT_MANIFEST_FILE.to_string(),
        }
    }

    /// File name of the HTML template emitted by the client build.
    ///
    /// `None` when the input is not an HTML file: only `.html` inputs can be
    /// a template. Absolute inputs under the root are made root-relative.
    pub fn template_file_name(&self) -> Option<String> {
        let input = match &self.build.rollup_options.input {
            None => return Some(DEFAULT_TEMPLATE_FILE.to_string()),
            Some(Value::String(input)) => input.as_str(),
            Some(_) => return None,
        };

        if !input.ends_with(".html") {
            return None;
        }

        let path = Path::new(input);
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()?
        } else {
            path
        };

        Some(to_slash(relative))
    }
}

/// A file produced by a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputItem {
    Asset(OutputAsset),
    Chunk(OutputChunk),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputAsset {
    pub source: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub code: String,
    pub is_entry: bool,
    /// The module the chunk was built for, when it is an entry.
    pub facade_module_id: Option<String>,
}

impl OutputItem {
    pub fn asset(source: impl Into<Vec<u8>>) -> Self {
        OutputItem::Asset(OutputAsset {
            source: source.into(),
        })
    }

    pub fn chunk(code: impl Into<String>) -> Self {
        OutputItem::Chunk(OutputChunk {
            code: code.into(),
            is_entry: false,
            facade_module_id: None,
        })
    }

    pub fn entry_chunk(code: impl Into<String>, facade_module_id: impl Into<String>) -> Self {
        OutputItem::Chunk(OutputChunk {
            code: code.into(),
            is_entry: true,
            facade_module_id: Some(facade_module_id.into()),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            OutputItem::Asset(asset) => &asset.source,
            OutputItem::Chunk(chunk) => chunk.code.as_bytes(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.bytes()).into_owned()
    }
}

/// A build output: file name to item, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBundle {
    items: IndexMap<String, OutputItem>,
}

impl OutputBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: impl Into<String>, item: OutputItem) {
        self.items.insert(file_name.into(), item);
    }

    /// Emit a file as an asset, replacing any previous item of that name.
    pub fn emit_asset(&mut self, file_name: impl Into<String>, source: impl Into<Vec<u8>>) {
        self.insert(file_name, OutputItem::asset(source));
    }

    pub fn get(&self, file_name: &str) -> Option<&OutputItem> {
        self.items.get(file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.items.contains_key(file_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OutputItem)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The entry chunk built for `module`, or the only entry chunk when the
    /// module id does not match any facade.
    ///
    /// Chunks are matched by their explicit entry marker, never by position.
    pub fn entry_chunk(&self, module: Option<&str>) -> Option<(&str, &OutputChunk)> {
        let mut entries = self.items.iter().filter_map(|(name, item)| match item {
            OutputItem::Chunk(chunk) if chunk.is_entry => Some((name.as_str(), chunk)),
            _ => None,
        });

        if let Some(module) = module {
            let wanted = normalize_module_id(module);
            if let Some(found) = entries.clone().find(|(_, chunk)| {
                chunk
                    .facade_module_id
                    .as_deref()
                    .is_some_and(|facade| same_module(&normalize_module_id(facade), &wanted))
            }) {
                return Some(found);
            }
        }

        let first = entries.next()?;
        match entries.next() {
            None => Some(first),
            Some(_) => None,
        }
    }
}

/// Request for the secondary, in-memory client build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedBuildRequest {
    pub root: PathBuf,
    pub config_file: Option<PathBuf>,
    /// Where the host would write the output; nothing is written.
    pub out_dir: PathBuf,
}

impl NestedBuildRequest {
    /// The inline configuration handed to the host's build API.
    pub fn inline_config(&self) -> Value {
        json!({
            "root": self.root,
            "configFile": self.config_file.as_ref().map_or(Value::Bool(false), |file| json!(file)),
            "build": {
                "outDir": self.out_dir,
                "ssr": false,
                "ssrManifest": true,
                "write": false,
            }
        })
    }
}

/// Runs the secondary build against the current project configuration.
#[async_trait]
pub trait NestedBuilder: Send + Sync {
    async fn build(&self, request: NestedBuildRequest) -> anyhow::Result<OutputBundle>;
}

/// Runs a build from a complete inline configuration, without loading the
/// project's config file. Used for the Electron main/preload build.
#[async_trait]
pub trait InlineBuilder: Send + Sync {
    async fn build_inline(&self, config: Value) -> anyhow::Result<OutputBundle>;
}

/// The host's index-HTML transform hook (head injections, HMR client, ...).
#[async_trait]
pub trait HtmlTransformer: Send + Sync {
    async fn transform_index_html(
        &self,
        url: &str,
        html: String,
        original_url: Option<&str>,
    ) -> anyhow::Result<String>;
}

/// Where a server module comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleSource<'a> {
    /// A project specifier compiled on demand through the host's module
    /// graph (dev server).
    Specifier(&'a str),
    /// A compiled file on disk (after a production build).
    File(&'a Path),
}

/// Loads server modules.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, source: ModuleSource<'_>) -> anyhow::Result<Arc<dyn SsrModule>>;
}

/// Export name of the URL-based render convention.
pub const RENDER_VITE_EXPORT: &str = "renderVite";
/// Export name of the request/response render convention.
pub const RENDER_EXPORT: &str = "render";

/// A loaded server-render module.
///
/// Only the two conventional exports are modelled. A module reports which
/// ones it has through [`SsrModule::has_export`]; calling one it does not
/// have fails.
#[async_trait]
pub trait SsrModule: Send + Sync {
    fn has_export(&self, name: &str) -> bool;

    async fn render_vite(
        &self,
        url: &str,
        template: &str,
        options: &Value,
    ) -> anyhow::Result<Option<String>> {
        let _ = (url, template, options);
        anyhow::bail!("module has no `{RENDER_VITE_EXPORT}` export")
    }

    async fn render(
        &self,
        request: &RenderRequest,
        response: Option<&SharedResponse>,
        template: &str,
        options: &Value,
    ) -> anyhow::Result<Option<String>> {
        let _ = (request, response, template, options);
        anyhow::bail!("module has no `{RENDER_EXPORT}` export")
    }

    /// Access to the concrete module for user render callbacks.
    fn as_any(&self) -> &dyn Any;
}

/// The inbound request as seen by render code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub method: String,
    /// Path with query, as originally requested.
    pub url: String,
    /// Lower-cased header names.
    pub headers: IndexMap<String, String>,
}

impl RenderRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: IndexMap::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Status and headers of the outbound response; render code may adjust them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: IndexMap<String, String>,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: 200,
            headers: IndexMap::new(),
        }
    }
}

/// Response head shared between the dev server and render code.
pub type SharedResponse = Arc<Mutex<ResponseHead>>;

fn normalize_module_id(id: &str) -> String {
    let id = id.replace('\\', "/");
    id.trim_start_matches("./").to_string()
}

fn same_module(facade: &str, wanted: &str) -> bool {
    facade == wanted
        || facade
            .strip_suffix(wanted)
            .is_some_and(|prefix| prefix.ends_with('/'))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_config_defaults() {
        let config = ResolvedConfig::from_value(json!({ "root": "/app" })).unwrap();
        assert_eq!(config.out_dir(), PathBuf::from("/app/dist"));
        assert!(config.build.write);
        assert_eq!(config.manifest_file_name(), "ssr-manifest.json");
        assert_eq!(config.template_file_name().as_deref(), Some("index.html"));
    }

    #[test]
    fn manifest_name_from_build_setting() {
        let config = ResolvedConfig::from_value(json!({
            "build": { "ssrManifest": "client-manifest.json" }
        }))
        .unwrap();
        assert_eq!(config.manifest_file_name(), "client-manifest.json");

        let flag = ResolvedConfig::from_value(json!({ "build": { "ssrManifest": true } })).unwrap();
        assert_eq!(flag.manifest_file_name(), "ssr-manifest.json");
    }

    #[test]
    fn template_name_follows_html_input() {
        let html = ResolvedConfig::from_value(json!({
            "root": "/app",
            "build": { "rollupOptions": { "input": "/app/pages/main.html" } }
        }))
        .unwrap();
        assert_eq!(html.template_file_name().as_deref(), Some("pages/main.html"));

        let script = ResolvedConfig::from_value(json!({
            "build": { "rollupOptions": { "input": "src/main.ts" } }
        }))
        .unwrap();
        assert_eq!(script.template_file_name(), None);

        let multi = ResolvedConfig::from_value(json!({
            "build": { "rollupOptions": { "input": ["a.html", "b.html"] } }
        }))
        .unwrap();
        assert_eq!(multi.template_file_name(), None);
    }

    #[test]
    fn entry_chunk_uses_marker_not_position() {
        let mut bundle = OutputBundle::new();
        bundle.insert("chunk-vendor.js", OutputItem::chunk("vendor"));
        bundle.insert("style.css", OutputItem::asset("body{}"));
        bundle.insert(
            "entry-server.js",
            OutputItem::entry_chunk("export {}", "/app/src/entry-server.ts"),
        );

        let (name, _) = bundle.entry_chunk(Some("src/entry-server.ts")).unwrap();
        assert_eq!(name, "entry-server.js");

        let (name, _) = bundle.entry_chunk(None).unwrap();
        assert_eq!(name, "entry-server.js");
    }

    #[test]
    fn ambiguous_entries_without_match_yield_none() {
        let mut bundle = OutputBundle::new();
        bundle.insert("a.js", OutputItem::entry_chunk("a", "/app/a.ts"));
        bundle.insert("b.js", OutputItem::entry_chunk("b", "/app/b.ts"));

        assert!(bundle.entry_chunk(Some("src/missing.ts")).is_none());
        assert_eq!(bundle.entry_chunk(Some("./b.ts")).unwrap().0, "b.js");
    }

    #[test]
    fn inline_config_disables_ssr_and_writing() {
        let request = NestedBuildRequest {
            root: PathBuf::from("/app"),
            config_file: None,
            out_dir: PathBuf::from("/app/dist/www"),
        };
        let config = request.inline_config();
        assert_eq!(config["configFile"], json!(false));
        assert_eq!(config["build"]["ssr"], json!(false));
        assert_eq!(config["build"]["ssrManifest"], json!(true));
        assert_eq!(config["build"]["write"], json!(false));
    }
}
