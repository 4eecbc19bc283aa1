//! Host doubles shared by the pipeline tests.

#![allow(dead_code)]

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use armonia::host::BuildSettings;
use armonia::{
    Command, ConfigEnv, ModuleLoader, ModuleSource, NestedBuildRequest, NestedBuilder,
    OutputBundle, OutputItem, RenderRequest, ResolvedConfig, SharedResponse, SsrModule,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;

pub const MANIFEST: &str = r#"{ "/src/main.ts": ["/assets/main.js", "/assets/main.css"] }"#;
pub const TEMPLATE: &str = "<html><body><!--app--></body></html>";

/// Client build that returns a fixed bundle and records its requests.
#[derive(Default)]
pub struct FixedBuilder {
    pub bundle: OutputBundle,
    pub requests: Mutex<Vec<NestedBuildRequest>>,
}

impl FixedBuilder {
    pub fn client() -> Self {
        let mut bundle = OutputBundle::new();
        bundle.insert("assets/main.js", OutputItem::entry_chunk("boot()", "/src/main.ts"));
        bundle.emit_asset("assets/main.css", "body{}");
        bundle.emit_asset("ssr-manifest.json", MANIFEST);
        bundle.emit_asset("index.html", TEMPLATE);
        Self {
            bundle,
            requests: Mutex::default(),
        }
    }
}

#[async_trait]
impl NestedBuilder for FixedBuilder {
    async fn build(&self, request: NestedBuildRequest) -> anyhow::Result<OutputBundle> {
        self.requests.lock().push(request);
        Ok(self.bundle.clone())
    }
}

/// Server module whose `render` export wraps the URL into the template.
pub struct PageModule;

#[async_trait]
impl SsrModule for PageModule {
    fn has_export(&self, name: &str) -> bool {
        name == "render"
    }

    async fn render(
        &self,
        request: &RenderRequest,
        _response: Option<&SharedResponse>,
        template: &str,
        _options: &Value,
    ) -> anyhow::Result<Option<String>> {
        Ok(Some(template.replace("<!--app-->", &request.url)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Loader that hands out [`PageModule`] and records what was loaded.
#[derive(Default)]
pub struct RecordingLoader {
    pub files: Mutex<Vec<PathBuf>>,
    pub loads: AtomicUsize,
}

#[async_trait]
impl ModuleLoader for RecordingLoader {
    async fn load(&self, source: ModuleSource<'_>) -> anyhow::Result<Arc<dyn SsrModule>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let ModuleSource::File(path) = source {
            self.files.lock().push(path.to_path_buf());
        }
        Ok(Arc::new(PageModule))
    }
}

impl RecordingLoader {
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

/// A project directory with a conventional server entry.
pub fn project() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    std::fs::create_dir_all(dir.path().join("src")).expect("create src");
    std::fs::write(dir.path().join("src/entry-server.ts"), "export {}").expect("write entry");
    dir
}

pub fn production(root: &Path) -> ConfigEnv {
    ConfigEnv::new(Command::Build, "production", root)
}

pub fn resolved(root: &Path) -> ResolvedConfig {
    ResolvedConfig {
        root: root.to_path_buf(),
        mode: "production".to_string(),
        command: Some(Command::Build),
        build: BuildSettings {
            ssr: Some(armonia::SsrEntry::Module("src/entry-server.ts".to_string())),
            ..BuildSettings::default()
        },
        ..ResolvedConfig::default()
    }
}
