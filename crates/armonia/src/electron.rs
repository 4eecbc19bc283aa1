//! Electron pipeline glue.
//!
//! The renderer is built by the host as usual; this plugin fixes the base
//! path for file-system loading, builds the main and preload scripts with a
//! second inline build, and owns the dev-time watch build and Electron
//! process. Spawning Electron and packaging are left to the host.

use std::path::Path;
use std::sync::Arc;

use armonia_config::{ElectronSettings, merged};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::entry::locate;
use crate::error::{Error, Result};
use crate::host::{Command, ConfigEnv, InlineBuilder, OutputBundle, ResolvedConfig};

/// Electron main module locations, in priority order.
pub const MAIN_CANDIDATES: &[&str] = &[
    "electron/main.ts",
    "electron/main.js",
    "electron/index.ts",
    "electron/index.js",
    "electron/electron.ts",
    "electron/electron.js",
    "src-electron/main.ts",
    "src-electron/main.js",
    "src-electron/index.ts",
    "src-electron/index.js",
    "src-electron/electron.ts",
    "src-electron/electron.js",
    "src-electron/electron-main.ts",
    "src-electron/electron-main.js",
    "src/electron.ts",
    "src/electron.js",
    "src/electron-main.ts",
    "src/electron-main.js",
];

/// Used when no main candidate exists.
pub const DEFAULT_MAIN: &str = "src/electron.js";

/// Electron preload module locations, in priority order.
pub const PRELOAD_CANDIDATES: &[&str] = &[
    "electron/preload.ts",
    "electron/preload.js",
    "src-electron/preload.ts",
    "src-electron/preload.js",
    "src-electron/electron-preload.ts",
    "src-electron/electron-preload.js",
    "src/preload.ts",
    "src/preload.js",
    "src/electron-preload.ts",
    "src/electron-preload.js",
];

const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "crypto",
    "dgram",
    "dns",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "timers",
    "tls",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Main and preload modules of an Electron app, relative to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectronEntries {
    pub main: String,
    pub preload: Option<String>,
}

impl ElectronEntries {
    /// Configured modules win; otherwise the first existing candidate.
    pub fn discover(root: &Path, settings: &ElectronSettings) -> Self {
        let main = settings
            .main
            .clone()
            .or_else(|| locate(root, MAIN_CANDIDATES).map(str::to_string))
            .unwrap_or_else(|| DEFAULT_MAIN.to_string());
        let preload = settings
            .preload
            .clone()
            .or_else(|| locate(root, PRELOAD_CANDIDATES).map(str::to_string));

        Self { main, preload }
    }

    /// Build inputs: main first, then preload when present.
    pub fn inputs(&self) -> Vec<&str> {
        std::iter::once(self.main.as_str())
            .chain(self.preload.as_deref())
            .collect()
    }

    /// Output file name of the preload script, relative to the main script.
    pub fn preload_url(&self) -> Option<String> {
        self.preload
            .as_deref()
            .map(|preload| format!("./{}.js", file_stem(preload)))
    }
}

/// A running watch build.
#[async_trait]
pub trait WatchHandle: Send + Sync {
    async fn close(&self) -> anyhow::Result<()>;
}

/// A running Electron process.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    async fn close(&self) -> anyhow::Result<()>;
}

/// Owns the dev-time watch build and Electron process.
#[derive(Default)]
pub struct DevRunner {
    watcher: Mutex<Option<Box<dyn WatchHandle>>>,
    process: Mutex<Option<Box<dyn ProcessHandle>>>,
}

impl DevRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_watcher(&self, watcher: Box<dyn WatchHandle>) {
        *self.watcher.lock() = Some(watcher);
    }

    /// Swap in a freshly started process after closing the previous one.
    pub async fn restart(&self, process: Box<dyn ProcessHandle>) -> Result<()> {
        let previous = self.process.lock().take();
        if let Some(previous) = previous {
            previous.close().await.map_err(Error::host("electron close"))?;
        }
        *self.process.lock() = Some(process);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.watcher.lock().is_some() || self.process.lock().is_some()
    }

    /// Close the watcher, then the process. Closing twice is a no-op.
    ///
    /// Both handles are always closed; the first failure is returned.
    pub async fn close(&self) -> Result<()> {
        let watcher = self.watcher.lock().take();
        let process = self.process.lock().take();

        let watcher_closed = match watcher {
            Some(watcher) => watcher.close().await.map_err(Error::host("watch close")),
            None => Ok(()),
        };
        let process_closed = match process {
            Some(process) => process.close().await.map_err(Error::host("electron close")),
            None => Ok(()),
        };

        if let (Err(_), Err(err)) = (&watcher_closed, &process_closed) {
            warn!(error = %err, "electron process failed to close");
        }
        watcher_closed.and(process_closed)
    }
}

/// Electron target plugin.
pub struct ElectronPlugin {
    settings: ElectronSettings,
    command: RwLock<Option<Command>>,
    config: RwLock<Option<Arc<ResolvedConfig>>>,
    runner: DevRunner,
}

impl ElectronPlugin {
    pub const NAME: &'static str = "armonia:electron";

    pub fn new(settings: ElectronSettings) -> Self {
        Self {
            settings,
            command: RwLock::new(None),
            config: RwLock::new(None),
            runner: DevRunner::new(),
        }
    }

    pub fn settings(&self) -> &ElectronSettings {
        &self.settings
    }

    pub fn runner(&self) -> &DevRunner {
        &self.runner
    }

    /// Builds load assets from the file system, so the base must be relative.
    pub fn config(&self, env: &ConfigEnv) -> Option<Value> {
        *self.command.write() = Some(env.command);
        (env.command == Command::Build).then(|| json!({ "base": "./" }))
    }

    pub fn config_resolved(&self, config: ResolvedConfig) {
        if *self.command.read() == Some(Command::Build) && config.base != "./" {
            warn!(
                base = %config.base,
                "base must be './' when building electron, the output may not load"
            );
        }
        *self.config.write() = Some(Arc::new(config));
    }

    /// Inline configuration of the main/preload build.
    ///
    /// `app_url` is what the main script loads: the dev server address in
    /// development, the HTML input otherwise.
    pub async fn build_config(&self, app_url: Option<&str>, watch: bool) -> Result<Value> {
        let config = self.resolved("buildEnd")?;
        let entries = ElectronEntries::discover(&config.root, &self.settings);
        let app_url = app_url.map_or_else(|| html_input(&config), str::to_string);
        let preload_url = entries
            .preload_url()
            .map_or_else(|| "undefined".to_string(), |url| json!(url).to_string());

        let mut external = self.dependencies(&config).await?;
        external.push("electron".to_string());
        external.extend(NODE_BUILTINS.iter().map(|name| name.to_string()));
        external.extend(NODE_BUILTINS.iter().map(|name| format!("node:{name}")));

        let mut build = json!({
            "minify": false,
            "outDir": config.build.out_dir,
            "rollupOptions": {
                "input": entries.inputs(),
                "output": {
                    "format": "cjs",
                    "entryFileNames": "[name].js",
                    "chunkFileNames": "[name].js",
                    "assetFileNames": "[name].[ext]"
                },
                "external": external
            }
        });
        if watch {
            build["watch"] = json!({});
        } else {
            build["write"] = json!(false);
        }

        let inline = json!({
            "configFile": false,
            "publicDir": false,
            "mode": config.mode,
            "root": config.root,
            "define": {
                "import.meta.env.ELECTRON": true,
                "import.meta.env.ELECTRON_APP_URL": json!(app_url).to_string(),
                "import.meta.env.ELECTRON_PRELOAD_URL": preload_url
            },
            "build": build
        });

        Ok(match &self.settings.config {
            Some(overrides) => merged(&inline, overrides),
            None => inline,
        })
    }

    /// Build end hook: build main and preload and add them to the bundle.
    pub async fn build_end(
        &self,
        builder: &dyn InlineBuilder,
        bundle: &mut OutputBundle,
    ) -> Result<()> {
        if *self.command.read() != Some(Command::Build) {
            return Ok(());
        }

        let config = self.resolved("buildEnd")?;
        info!(mode = %config.mode, "building electron");

        let inline = self.build_config(None, false).await?;
        let built = builder
            .build_inline(inline)
            .await
            .map_err(Error::host("electron build"))?;

        for (name, item) in built.iter() {
            bundle.emit_asset(name, item.bytes().to_vec());
        }
        Ok(())
    }

    /// Close bundle hook.
    pub async fn close_bundle(&self) -> Result<()> {
        self.runner.close().await
    }

    fn resolved(&self, phase: &'static str) -> Result<Arc<ResolvedConfig>> {
        self.config
            .read()
            .clone()
            .ok_or(Error::NotResolved { phase })
    }

    /// Runtime dependencies of the app, kept out of the main bundle.
    async fn dependencies(&self, config: &ResolvedConfig) -> Result<Vec<String>> {
        let file = config.root.join(
            self.settings
                .package_json
                .as_deref()
                .unwrap_or("package.json"),
        );
        if !tokio::fs::try_exists(&file).await.map_err(Error::io(&file))? {
            return Ok(Vec::new());
        }

        let text = tokio::fs::read_to_string(&file)
            .await
            .map_err(Error::io(&file))?;
        let package: Value = serde_json::from_str(&text).map_err(|source| Error::Manifest {
            file: file.display().to_string(),
            source,
        })?;

        Ok(package
            .get("dependencies")
            .and_then(Value::as_object)
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for ElectronPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElectronPlugin")
            .field("settings", &self.settings)
            .field("command", &*self.command.read())
            .field("running", &self.runner.is_running())
            .finish()
    }
}

fn html_input(config: &ResolvedConfig) -> String {
    match config.input() {
        Some(input) if input.ends_with(".html") => input.to_string(),
        _ => "index.html".to_string(),
    }
}

fn file_stem(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Counted(Arc<AtomicUsize>);

    #[async_trait]
    impl WatchHandle for Counted {
        async fn close(&self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl ProcessHandle for Counted {
        async fn close(&self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Stuck;

    #[async_trait]
    impl WatchHandle for Stuck {
        async fn close(&self) -> anyhow::Result<()> {
            anyhow::bail!("watcher stuck")
        }
    }

    fn touch(root: &Path, file: &str) {
        let path = root.join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn entries_follow_candidate_order() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/electron-main.ts");
        touch(dir.path(), "src-electron/index.ts");
        touch(dir.path(), "src/preload.js");

        let entries = ElectronEntries::discover(dir.path(), &ElectronSettings::default());
        assert_eq!(entries.main, "src-electron/index.ts");
        assert_eq!(entries.preload.as_deref(), Some("src/preload.js"));
        assert_eq!(entries.inputs(), vec!["src-electron/index.ts", "src/preload.js"]);
        assert_eq!(entries.preload_url().as_deref(), Some("./preload.js"));
    }

    #[test]
    fn missing_main_falls_back_and_preload_is_optional() {
        let dir = TempDir::new().unwrap();
        let entries = ElectronEntries::discover(dir.path(), &ElectronSettings::default());
        assert_eq!(entries.main, DEFAULT_MAIN);
        assert_eq!(entries.preload, None);
        assert_eq!(entries.inputs(), vec![DEFAULT_MAIN]);
    }

    #[test]
    fn build_command_forces_relative_base() {
        let plugin = ElectronPlugin::new(ElectronSettings::default());
        let build = ConfigEnv::new(Command::Build, "production", "/app");
        assert_eq!(plugin.config(&build), Some(json!({ "base": "./" })));

        let serve = ConfigEnv::new(Command::Serve, "development", "/app");
        assert_eq!(plugin.config(&serve), None);
    }

    #[tokio::test]
    async fn build_config_externalizes_dependencies() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "electron/main.ts");
        std::fs::write(
            dir.path().join("package.json"),
            r#"{ "dependencies": { "sqlite3": "^5" } }"#,
        )
        .unwrap();

        let plugin = ElectronPlugin::new(ElectronSettings::default());
        plugin.config(&ConfigEnv::new(Command::Build, "production", dir.path()));
        plugin.config_resolved(ResolvedConfig {
            root: dir.path().to_path_buf(),
            base: "./".to_string(),
            ..ResolvedConfig::default()
        });

        let config = plugin.build_config(None, false).await.unwrap();
        let external = config["build"]["rollupOptions"]["external"].as_array().unwrap();
        assert_eq!(external[0], json!("sqlite3"));
        assert!(external.contains(&json!("electron")));
        assert!(external.contains(&json!("node:fs")));
        assert_eq!(config["build"]["rollupOptions"]["input"], json!(["electron/main.ts"]));
        assert_eq!(config["build"]["write"], json!(false));
        assert_eq!(config["define"]["import.meta.env.ELECTRON_APP_URL"], json!("\"index.html\""));
        assert_eq!(config["define"]["import.meta.env.ELECTRON_PRELOAD_URL"], json!("undefined"));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let closed = Arc::new(AtomicUsize::new(0));
        let runner = DevRunner::new();
        runner.attach_watcher(Box::new(Counted(closed.clone())));
        runner.restart(Box::new(Counted(closed.clone()))).await.unwrap();
        assert!(runner.is_running());

        runner.close().await.unwrap();
        runner.close().await.unwrap();

        assert_eq!(closed.load(Ordering::SeqCst), 2);
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn failing_watcher_still_closes_process() {
        let closed = Arc::new(AtomicUsize::new(0));
        let runner = DevRunner::new();
        runner.attach_watcher(Box::new(Stuck));
        runner.restart(Box::new(Counted(closed.clone()))).await.unwrap();

        let err = runner.close().await.unwrap_err();
        assert!(matches!(err, Error::Host { operation: "watch close", .. }));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!runner.is_running());

        runner.close().await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn restart_closes_previous_process() {
        let closed = Arc::new(AtomicUsize::new(0));
        let runner = DevRunner::new();
        runner.restart(Box::new(Counted(closed.clone()))).await.unwrap();
        runner.restart(Box::new(Counted(closed.clone()))).await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
