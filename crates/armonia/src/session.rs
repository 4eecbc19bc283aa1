//! Per-build capture state.
//!
//! One [`BuildSession`] is created per plugin instance and handed to every
//! build phase. Reads go through a `parking_lot` lock that is never held
//! across an await; anything that runs a user transformation first takes the
//! async writer gate, so a second writer waits for the first one instead of
//! observing a half-updated template.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::entry::EntryResolution;
use crate::error::{Error, Result};
use crate::host::{ConfigEnv, OutputBundle, ResolvedConfig};
use crate::render::{ManifestTransform, TemplateTransform};

/// Module id to the ordered asset files it depends on.
pub type Manifest = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, Default)]
struct TemplateSlot {
    /// What was captured, before the user transformation.
    raw: String,
    /// What render code sees.
    html: String,
    transformed: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    env: Option<ConfigEnv>,
    config: Option<Arc<ResolvedConfig>>,
    entry: Option<EntryResolution>,
    /// Set by the configuration phase when this build produces the server
    /// bundle.
    server_build: bool,
    empty_out_dir: Option<bool>,
    client_bundle: Option<Arc<OutputBundle>>,
    manifest: Arc<Manifest>,
    manifest_transformed: bool,
    template: TemplateSlot,
}

/// Shared state of one build (or one dev-server session).
#[derive(Debug, Default)]
pub struct BuildSession {
    state: RwLock<SessionState>,
    writer: Mutex<()>,
}

impl BuildSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin_server_build(
        &self,
        env: ConfigEnv,
        entry: EntryResolution,
        empty_out_dir: Option<bool>,
    ) {
        let mut state = self.state.write();
        state.env = Some(env);
        state.entry = Some(entry);
        state.server_build = true;
        state.empty_out_dir = empty_out_dir;
    }

    pub(crate) fn set_config(&self, config: ResolvedConfig) {
        self.state.write().config = Some(Arc::new(config));
    }

    pub(crate) fn set_entry(&self, entry: EntryResolution) {
        self.state.write().entry = Some(entry);
    }

    pub(crate) fn set_client_bundle(&self, bundle: OutputBundle) {
        self.state.write().client_bundle = Some(Arc::new(bundle));
    }

    /// Start a new capture phase.
    ///
    /// Drops the previous build's manifest, template and client bundle so a
    /// rebuild captures and transforms them afresh. Waits for any
    /// transformation in progress.
    pub(crate) async fn begin_capture(&self) {
        let _gate = self.writer.lock().await;
        let mut state = self.state.write();
        state.client_bundle = None;
        state.manifest = Arc::default();
        state.manifest_transformed = false;
        state.template = TemplateSlot::default();
    }

    /// The resolved host configuration, or [`Error::NotResolved`] when
    /// `phase` runs before the host delivered it.
    pub fn config(&self, phase: &'static str) -> Result<Arc<ResolvedConfig>> {
        self.state
            .read()
            .config
            .clone()
            .ok_or(Error::NotResolved { phase })
    }

    pub fn env(&self) -> Option<ConfigEnv> {
        self.state.read().env.clone()
    }

    pub fn entry(&self) -> Option<EntryResolution> {
        self.state.read().entry.clone()
    }

    pub fn is_server_build(&self) -> bool {
        self.state.read().server_build
    }

    pub fn empty_out_dir(&self) -> Option<bool> {
        self.state.read().empty_out_dir
    }

    /// The in-memory output of the secondary client build.
    pub fn client_bundle(&self) -> Option<Arc<OutputBundle>> {
        self.state.read().client_bundle.clone()
    }

    pub fn manifest(&self) -> Arc<Manifest> {
        self.state.read().manifest.clone()
    }

    pub fn template(&self) -> String {
        self.state.read().template.html.clone()
    }

    pub fn is_template_transformed(&self) -> bool {
        self.state.read().template.transformed
    }

    /// Record HTML seen by the host's index-HTML hook.
    ///
    /// Only fills the slot while no transformed template exists; a captured
    /// and transformed template is never overwritten by a raw one.
    pub fn observe_html(&self, html: &str) {
        let mut state = self.state.write();
        if !state.template.transformed {
            state.template.raw = html.to_string();
            state.template.html = html.to_string();
        }
    }

    /// Capture the build template and apply the user transformation.
    ///
    /// The transformation runs at most once per capture phase. Later
    /// captures return the already transformed template unchanged.
    pub async fn capture_template(
        &self,
        html: String,
        transform: Option<&dyn TemplateTransform>,
    ) -> Result<String> {
        let _gate = self.writer.lock().await;

        if self.is_template_transformed() {
            return Ok(self.template());
        }

        let transformed = apply_template_transform(&html, transform).await?;
        let mut state = self.state.write();
        state.template = TemplateSlot {
            raw: html,
            html: transformed.clone(),
            transformed: true,
        };
        Ok(transformed)
    }

    /// Capture the template of one dev request.
    ///
    /// The dev server re-transforms the page on every request, so the HTML
    /// may change between requests. The user transformation runs once per
    /// distinct input; identical input reuses the published result. Inside a
    /// server build this is the same as [`BuildSession::capture_template`].
    pub async fn capture_request_template(
        &self,
        html: String,
        transform: Option<&dyn TemplateTransform>,
    ) -> Result<String> {
        if self.is_server_build() {
            return self.capture_template(html, transform).await;
        }

        if let Some(cached) = self.cached_template(&html) {
            return Ok(cached);
        }

        let _gate = self.writer.lock().await;
        if let Some(cached) = self.cached_template(&html) {
            return Ok(cached);
        }

        let transformed = apply_template_transform(&html, transform).await?;
        self.state.write().template = TemplateSlot {
            raw: html,
            html: transformed.clone(),
            transformed: true,
        };
        Ok(transformed)
    }

    /// Capture the manifest and apply the user transformation, once per
    /// capture phase.
    pub async fn capture_manifest(
        &self,
        manifest: Manifest,
        transform: Option<&dyn ManifestTransform>,
    ) -> Result<Arc<Manifest>> {
        let _gate = self.writer.lock().await;

        if self.state.read().manifest_transformed {
            return Ok(self.manifest());
        }

        let manifest = match transform {
            Some(transform) => {
                let replacement = transform
                    .transform(manifest.clone())
                    .await
                    .map_err(Error::callback("transformManifest"))?;
                manifest_replacement(replacement)?.unwrap_or(manifest)
            }
            None => manifest,
        };

        let manifest = Arc::new(manifest);
        let mut state = self.state.write();
        state.manifest = manifest.clone();
        state.manifest_transformed = true;
        Ok(manifest)
    }

    fn cached_template(&self, html: &str) -> Option<String> {
        let state = self.state.read();
        (state.template.transformed && state.template.raw == html)
            .then(|| state.template.html.clone())
    }
}

async fn apply_template_transform(
    html: &str,
    transform: Option<&dyn TemplateTransform>,
) -> Result<String> {
    let Some(transform) = transform else {
        return Ok(html.to_string());
    };

    let transformed = transform
        .transform(html.to_string())
        .await
        .map_err(Error::callback("transformTemplate"))?;
    Ok(transformed.unwrap_or_else(|| html.to_string()))
}

/// Interpret what a manifest transformation returned: JSON text is parsed,
/// an object replaces the manifest, anything else keeps it.
fn manifest_replacement(value: Option<Value>) -> Result<Option<Manifest>> {
    let value = match value {
        Some(Value::String(text)) => {
            serde_json::from_str::<Value>(&text).map_err(|source| Error::Manifest {
                file: "transformManifest".to_string(),
                source,
            })?
        }
        Some(value) => value,
        None => return Ok(None),
    };

    if !value.is_object() {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| Error::Manifest {
            file: "transformManifest".to_string(),
            source,
        })
}
