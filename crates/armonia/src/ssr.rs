//! The SSR pipeline.
//!
//! A production SSR build is two builds in one. The host runs the server
//! build; at its start this plugin runs a nested, in-memory client build,
//! captures the manifest and template it produced, and later re-emits the
//! client files under the server root of the server build's output.
//!
//! ```text
//! config ─▶ config_resolved ─▶ build_start ─▶ generate_bundle ─▶ write_bundle
//! (patch)    (session)          (client build,  (re-emit under    (static render,
//!                                capture)        serverRoot)       SSG only)
//! ```
//!
//! Each hook receives the host capability it needs; all state lives in the
//! plugin's [`BuildSession`].

use std::path::PathBuf;
use std::sync::Arc;

use armonia_config::{SsrEntry, SsrSettings, merged};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::entry::{EntryResolution, resolve_server_entry};
use crate::error::{Error, Result};
use crate::host::{
    ConfigEnv, ModuleLoader, NestedBuildRequest, NestedBuilder, OutputBundle, ResolvedConfig,
};
use crate::paths::prepare_out_dir;
use crate::render::{RenderAdapter, SsrCallbacks};
use crate::session::{BuildSession, Manifest};
use crate::virtual_module;

/// SSR (and, with static generation on, SSG) build plugin.
pub struct SsrPlugin {
    settings: SsrSettings,
    callbacks: SsrCallbacks,
    adapter: RenderAdapter,
    static_generation: bool,
    session: Arc<BuildSession>,
}

impl SsrPlugin {
    pub const NAME: &'static str = "armonia:ssr";

    pub fn new(settings: SsrSettings, callbacks: SsrCallbacks) -> Self {
        let adapter = RenderAdapter::from_callback(callbacks.render.clone());
        Self {
            settings,
            callbacks,
            adapter,
            static_generation: false,
            session: Arc::new(BuildSession::new()),
        }
    }

    /// The SSR pipeline followed by the static-render phase.
    pub fn static_site(settings: SsrSettings, callbacks: SsrCallbacks) -> Self {
        Self {
            static_generation: true,
            ..Self::new(settings, callbacks)
        }
    }

    pub fn settings(&self) -> &SsrSettings {
        &self.settings
    }

    pub fn callbacks(&self) -> &SsrCallbacks {
        &self.callbacks
    }

    /// The render step, selected when the plugin was created.
    pub fn adapter(&self) -> &RenderAdapter {
        &self.adapter
    }

    pub fn session(&self) -> &Arc<BuildSession> {
        &self.session
    }

    pub fn is_static_site(&self) -> bool {
        self.static_generation
    }

    /// Configuration hook.
    ///
    /// Returns the patch for the server build, or `None` when this is not a
    /// production build, the `config` option is `false`, or SSR is disabled.
    pub fn config(&self, user_config: &Value, env: &ConfigEnv) -> Option<Value> {
        if matches!(self.settings.config, Some(Value::Bool(false))) {
            return None;
        }

        if !env.is_production_build() {
            return None;
        }

        let build = user_config.get("build");
        let host_ssr = build
            .and_then(|build| build.get("ssr"))
            .and_then(|ssr| serde_json::from_value::<SsrEntry>(ssr.clone()).ok());
        let input = build
            .and_then(|build| build.pointer("/rollupOptions/input"))
            .and_then(Value::as_str);

        let resolution =
            resolve_server_entry(&env.root, host_ssr.as_ref(), input, self.settings.ssr.as_ref());
        let EntryResolution::Entry { module, source } = &resolution else {
            debug!("SSR disabled for this build");
            return None;
        };

        info!(mode = %env.mode, entry = %module, ?source, "building SSR bundle");

        let empty_out_dir = build
            .and_then(|build| build.get("emptyOutDir"))
            .and_then(Value::as_bool);

        let preset = json!({
            "build": {
                "minify": false,
                "rollupOptions": {
                    "output": { "entryFileNames": "[name].js" }
                }
            }
        });
        let user = self.settings.config.clone().unwrap_or_else(|| json!({}));
        let forced = json!({
            "publicDir": false,
            "build": {
                "emptyOutDir": false,
                "ssr": module,
                "rollupOptions": { "input": module }
            }
        });

        let patch = merged(&merged(&preset, &user), &forced);
        self.session
            .begin_server_build(env.clone(), resolution.clone(), empty_out_dir);
        Some(patch)
    }

    /// Store the host's resolved configuration.
    pub fn config_resolved(&self, config: ResolvedConfig) {
        self.session.set_config(config);
    }

    /// The host's index-HTML hook, running after every other transform.
    pub fn transform_index_html(&self, html: &str) {
        self.session.observe_html(html);
    }

    pub fn resolve_id(&self, specifier: &str) -> Option<&'static str> {
        virtual_module::resolve_id(specifier)
    }

    pub fn load(&self, id: &str) -> Result<Option<String>> {
        virtual_module::load(id, &self.session)
    }

    /// Server entry for the dev server, resolved from the resolved config.
    pub fn dev_entry(&self) -> Result<EntryResolution> {
        if let Some(entry) = self.session.entry() {
            return Ok(entry);
        }

        let config = self.session.config("configureServer")?;
        let entry = resolve_server_entry(
            &config.root,
            config.build.ssr.as_ref(),
            config.input(),
            self.settings.ssr.as_ref(),
        );
        self.session.set_entry(entry.clone());
        Ok(entry)
    }

    /// Build start hook: run the client build and capture its manifest and
    /// template. Each call starts a fresh capture, so a rebuild replaces what
    /// the previous build captured.
    pub async fn build_start(&self, builder: &dyn NestedBuilder) -> Result<()> {
        if !self.session.is_server_build() {
            return Ok(());
        }

        let config = self.session.config("buildStart")?;
        self.session.begin_capture().await;
        info!("generating the SSR target");

        if config.build.write {
            prepare_out_dir(&config.out_dir(), self.session.empty_out_dir(), &config.root).await?;
        }

        let request = NestedBuildRequest {
            root: config.root.clone(),
            config_file: config.config_file.clone(),
            out_dir: self.client_out_dir(&config),
        };
        let bundle = builder
            .build(request)
            .await
            .map_err(Error::host("nested build"))?;

        let manifest_file = config.manifest_file_name();
        match bundle.get(&manifest_file) {
            Some(item) => {
                let manifest: Manifest =
                    serde_json::from_slice(item.bytes()).map_err(|source| Error::Manifest {
                        file: manifest_file.clone(),
                        source,
                    })?;
                self.session
                    .capture_manifest(manifest, self.callbacks.transform_manifest.as_deref())
                    .await?;
            }
            None => debug!(file = %manifest_file, "client build emitted no SSR manifest"),
        }

        let template_file = config.template_file_name();
        match template_file.as_deref().and_then(|file| bundle.get(file)) {
            Some(item) => {
                self.session
                    .capture_template(item.text(), self.callbacks.transform_template.as_deref())
                    .await?;
            }
            None => debug!(file = ?template_file, "client build emitted no HTML template"),
        }

        self.session.set_client_bundle(bundle);
        Ok(())
    }

    /// Bundle generation hook: re-emit the client build under the server
    /// root, and the manifest and template at the root when enabled.
    pub fn generate_bundle(&self, bundle: &mut OutputBundle) -> Result<()> {
        if !self.session.is_server_build() {
            return Ok(());
        }
        let Some(client) = self.session.client_bundle() else {
            return Ok(());
        };

        let config = self.session.config("generateBundle")?;
        let server_root = self.settings.server_root();
        let manifest_file = config.manifest_file_name();
        let template_file = config.template_file_name();
        let is_capture = |name: &str| name == manifest_file || template_file.as_deref() == Some(name);

        for (name, item) in client.iter().filter(|(name, _)| !is_capture(*name)) {
            bundle.emit_asset(format!("{server_root}/{name}"), item.bytes().to_vec());
        }

        if self.settings.write_manifest() {
            if client.contains(&manifest_file) {
                let manifest = serde_json::to_string_pretty(&*self.session.manifest())
                    .map_err(|source| Error::Manifest {
                        file: manifest_file.clone(),
                        source,
                    })?;
                bundle.emit_asset(manifest_file.as_str(), manifest);
            }
            if let Some(template_file) = template_file.filter(|file| client.contains(file)) {
                bundle.emit_asset(template_file, self.session.template());
            }
        }

        debug!(files = client.len(), %server_root, "re-emitted client build");
        Ok(())
    }

    /// Write bundle hook: the static-render phase of an SSG build.
    ///
    /// Returns the files written to disk.
    pub async fn write_bundle(
        &self,
        bundle: &mut OutputBundle,
        loader: &dyn ModuleLoader,
    ) -> Result<Vec<PathBuf>> {
        if !self.static_generation || !self.session.is_server_build() {
            return Ok(Vec::new());
        }
        crate::ssg::distribute(self, bundle, loader).await
    }

    fn client_out_dir(&self, config: &ResolvedConfig) -> PathBuf {
        config.out_dir().join(self.settings.server_root())
    }
}

impl std::fmt::Debug for SsrPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsrPlugin")
            .field("settings", &self.settings)
            .field("adapter", &self.adapter)
            .field("static_generation", &self.static_generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Command;
    use tempfile::TempDir;

    fn production(root: &std::path::Path) -> ConfigEnv {
        ConfigEnv::new(Command::Build, "production", root)
    }

    #[test]
    fn patch_forces_entry_and_disables_public_dir() {
        let dir = TempDir::new().unwrap();
        let plugin = SsrPlugin::new(
            SsrSettings {
                config: Some(json!({ "build": { "minify": "terser", "sourcemap": true } })),
                ..SsrSettings::default()
            },
            SsrCallbacks::new(),
        );

        let patch = plugin
            .config(&json!({ "build": { "ssr": "src/server.ts" } }), &production(dir.path()))
            .unwrap();

        assert_eq!(patch["publicDir"], json!(false));
        assert_eq!(patch["build"]["emptyOutDir"], json!(false));
        assert_eq!(patch["build"]["minify"], json!("terser"));
        assert_eq!(patch["build"]["sourcemap"], json!(true));
        assert_eq!(
            patch["build"]["rollupOptions"]["output"]["entryFileNames"],
            json!("[name].js")
        );
        assert_eq!(patch["build"]["rollupOptions"]["input"], json!("src/server.ts"));
        assert!(plugin.session().is_server_build());
    }

    #[test]
    fn no_patch_outside_production_build() {
        let dir = TempDir::new().unwrap();
        let plugin = SsrPlugin::new(SsrSettings::default(), SsrCallbacks::new());

        let serve = ConfigEnv::new(Command::Serve, "development", dir.path());
        assert!(plugin.config(&json!({}), &serve).is_none());

        let staging = ConfigEnv::new(Command::Build, "staging", dir.path());
        assert!(plugin.config(&json!({}), &staging).is_none());
        assert!(!plugin.session().is_server_build());
    }

    #[test]
    fn disabled_ssr_or_config_yields_no_patch() {
        let dir = TempDir::new().unwrap();
        let plugin = SsrPlugin::new(SsrSettings::default(), SsrCallbacks::new());
        let nested = json!({ "build": { "ssr": false } });
        assert!(plugin.config(&nested, &production(dir.path())).is_none());

        let opted_out = SsrPlugin::new(
            SsrSettings {
                config: Some(Value::Bool(false)),
                ..SsrSettings::default()
            },
            SsrCallbacks::new(),
        );
        assert!(opted_out.config(&json!({}), &production(dir.path())).is_none());
    }

    #[test]
    fn empty_out_dir_is_remembered() {
        let dir = TempDir::new().unwrap();
        let plugin = SsrPlugin::new(SsrSettings::default(), SsrCallbacks::new());
        plugin.config(
            &json!({ "build": { "ssr": "entry.ts", "emptyOutDir": true } }),
            &production(dir.path()),
        );
        assert_eq!(plugin.session().empty_out_dir(), Some(true));
    }

    #[test]
    fn dev_entry_uses_resolved_config() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/entry-server.ts"), "").unwrap();

        let plugin = SsrPlugin::new(SsrSettings::default(), SsrCallbacks::new());
        assert!(matches!(
            plugin.dev_entry(),
            Err(Error::NotResolved { .. })
        ));

        plugin.config_resolved(ResolvedConfig {
            root: dir.path().to_path_buf(),
            ..ResolvedConfig::default()
        });
        let entry = plugin.dev_entry().unwrap();
        assert_eq!(entry.module(), Some("src/entry-server.ts"));
    }
}
