//! Render step and user callbacks.
//!
//! How a page is rendered is decided once, when the plugin is built: either
//! the user supplied a `render` callback ([`RenderAdapter::UserCallback`]) or
//! the server module's own exports are used ([`RenderAdapter::Convention`]).
//! A render that produces no string means "not handled".

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::host::{
    RENDER_EXPORT, RENDER_VITE_EXPORT, RenderRequest, ResolvedConfig, SharedResponse, SsrModule,
};
use crate::session::Manifest;

/// Everything a render invocation sees. Lives for one call.
#[derive(Clone)]
pub struct RenderContext {
    pub module: Arc<dyn SsrModule>,
    pub request: RenderRequest,
    /// Only present when rendering for the dev server.
    pub response: Option<SharedResponse>,
    pub template: String,
    pub manifest: Arc<Manifest>,
}

/// User-supplied page renderer.
#[async_trait]
pub trait RenderCallback: Send + Sync {
    async fn render(&self, ctx: RenderContext) -> anyhow::Result<Option<String>>;
}

#[async_trait]
impl<F, Fut> RenderCallback for F
where
    F: Fn(RenderContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<String>>> + Send,
{
    async fn render(&self, ctx: RenderContext) -> anyhow::Result<Option<String>> {
        (self)(ctx).await
    }
}

/// User-supplied one-shot template transformation. `None` keeps the input.
#[async_trait]
pub trait TemplateTransform: Send + Sync {
    async fn transform(&self, html: String) -> anyhow::Result<Option<String>>;
}

#[async_trait]
impl<F, Fut> TemplateTransform for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<String>>> + Send,
{
    async fn transform(&self, html: String) -> anyhow::Result<Option<String>> {
        (self)(html).await
    }
}

/// User-supplied one-shot manifest transformation.
///
/// May return a replacement mapping (an object) or its JSON text (a string);
/// anything else keeps the captured manifest.
#[async_trait]
pub trait ManifestTransform: Send + Sync {
    async fn transform(&self, manifest: Manifest) -> anyhow::Result<Option<Value>>;
}

#[async_trait]
impl<F, Fut> ManifestTransform for F
where
    F: Fn(Manifest) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send,
{
    async fn transform(&self, manifest: Manifest) -> anyhow::Result<Option<Value>> {
        (self)(manifest).await
    }
}

/// A file produced by static generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsgFile {
    /// Route or path, e.g. `/about/index.html`.
    pub id: String,
    pub code: String,
}

impl SsgFile {
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
        }
    }
}

/// What the static-render callback receives.
#[derive(Clone)]
pub struct StaticRenderContext {
    pub module: Arc<dyn SsrModule>,
    pub config: Arc<ResolvedConfig>,
    pub template: String,
    pub manifest: Arc<Manifest>,
    adapter: RenderAdapter,
}

impl StaticRenderContext {
    pub(crate) fn new(
        module: Arc<dyn SsrModule>,
        config: Arc<ResolvedConfig>,
        template: String,
        manifest: Arc<Manifest>,
        adapter: RenderAdapter,
    ) -> Self {
        Self {
            module,
            config,
            template,
            manifest,
            adapter,
        }
    }

    /// Render `url` with the configured render step, as the dev server would.
    pub async fn render(&self, url: &str) -> Result<Option<String>> {
        self.adapter
            .render(RenderContext {
                module: self.module.clone(),
                request: RenderRequest::get(url),
                response: None,
                template: self.template.clone(),
                manifest: self.manifest.clone(),
            })
            .await
    }
}

/// User-supplied static generator: one call, any number of files.
#[async_trait]
pub trait StaticRenderCallback: Send + Sync {
    async fn static_render(&self, ctx: StaticRenderContext) -> anyhow::Result<Vec<SsgFile>>;
}

#[async_trait]
impl<F, Fut> StaticRenderCallback for F
where
    F: Fn(StaticRenderContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<SsgFile>>> + Send,
{
    async fn static_render(&self, ctx: StaticRenderContext) -> anyhow::Result<Vec<SsgFile>> {
        (self)(ctx).await
    }
}

/// The render step, selected once per plugin.
#[derive(Clone, Default)]
pub enum RenderAdapter {
    /// Call the module's `renderVite(url, template, options)` export, or its
    /// `render(req, res, template, options)` export when there is none.
    #[default]
    Convention,
    /// Call the user's `render` callback with the full context.
    UserCallback(Arc<dyn RenderCallback>),
}

impl RenderAdapter {
    pub fn from_callback(callback: Option<Arc<dyn RenderCallback>>) -> Self {
        callback.map_or(RenderAdapter::Convention, RenderAdapter::UserCallback)
    }

    pub async fn render(&self, ctx: RenderContext) -> Result<Option<String>> {
        match self {
            RenderAdapter::UserCallback(callback) => {
                callback.render(ctx).await.map_err(Error::callback("render"))
            }
            RenderAdapter::Convention => render_by_convention(ctx).await,
        }
    }
}

impl std::fmt::Debug for RenderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderAdapter::Convention => f.write_str("Convention"),
            RenderAdapter::UserCallback(_) => f.write_str("UserCallback"),
        }
    }
}

async fn render_by_convention(ctx: RenderContext) -> Result<Option<String>> {
    let options = json!({});
    let module = &ctx.module;

    if module.has_export(RENDER_VITE_EXPORT) {
        return module
            .render_vite(&ctx.request.url, &ctx.template, &options)
            .await
            .map_err(Error::callback(RENDER_VITE_EXPORT));
    }

    if !module.has_export(RENDER_EXPORT) {
        return Err(Error::MissingExport {
            export: RENDER_EXPORT,
        });
    }

    module
        .render(
            &ctx.request,
            ctx.response.as_ref(),
            &ctx.template,
            &options,
        )
        .await
        .map_err(Error::callback(RENDER_EXPORT))
}

/// Optional user hooks of the SSR and SSG pipelines.
#[derive(Clone, Default)]
pub struct SsrCallbacks {
    pub render: Option<Arc<dyn RenderCallback>>,
    pub static_render: Option<Arc<dyn StaticRenderCallback>>,
    pub transform_template: Option<Arc<dyn TemplateTransform>>,
    pub transform_manifest: Option<Arc<dyn ManifestTransform>>,
}

impl SsrCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(mut self, callback: impl RenderCallback + 'static) -> Self {
        self.render = Some(Arc::new(callback));
        self
    }

    pub fn static_render(mut self, callback: impl StaticRenderCallback + 'static) -> Self {
        self.static_render = Some(Arc::new(callback));
        self
    }

    pub fn transform_template(mut self, callback: impl TemplateTransform + 'static) -> Self {
        self.transform_template = Some(Arc::new(callback));
        self
    }

    pub fn transform_manifest(mut self, callback: impl ManifestTransform + 'static) -> Self {
        self.transform_manifest = Some(Arc::new(callback));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    struct ViteStyle;

    #[async_trait]
    impl SsrModule for ViteStyle {
        fn has_export(&self, name: &str) -> bool {
            name == RENDER_VITE_EXPORT || name == RENDER_EXPORT
        }

        async fn render_vite(
            &self,
            url: &str,
            template: &str,
            _options: &Value,
        ) -> anyhow::Result<Option<String>> {
            Ok(Some(template.replace("<!--app-->", url)))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct NoExports;

    #[async_trait]
    impl SsrModule for NoExports {
        fn has_export(&self, _name: &str) -> bool {
            false
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn ctx(module: Arc<dyn SsrModule>) -> RenderContext {
        RenderContext {
            module,
            request: RenderRequest::get("/about?x=1"),
            response: None,
            template: "<div><!--app--></div>".to_string(),
            manifest: Arc::new(Manifest::new()),
        }
    }

    #[tokio::test]
    async fn convention_prefers_render_vite() {
        let rendered = RenderAdapter::Convention
            .render(ctx(Arc::new(ViteStyle)))
            .await
            .unwrap();
        assert_eq!(rendered.as_deref(), Some("<div>/about?x=1</div>"));
    }

    #[tokio::test]
    async fn convention_without_exports_is_an_error() {
        let err = RenderAdapter::Convention
            .render(ctx(Arc::new(NoExports)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingExport { export: "render" }));
    }

    #[tokio::test]
    async fn user_callback_output_is_used_verbatim() {
        let adapter = RenderAdapter::from_callback(Some(Arc::new(|ctx: RenderContext| async move {
            Ok::<_, anyhow::Error>(Some(format!("{}|{}", ctx.request.url, ctx.template)))
        })));
        let rendered = adapter.render(ctx(Arc::new(NoExports))).await.unwrap();
        assert_eq!(rendered.as_deref(), Some("/about?x=1|<div><!--app--></div>"));
    }

    #[tokio::test]
    async fn user_callback_errors_propagate() {
        let adapter = RenderAdapter::from_callback(Some(Arc::new(|_ctx: RenderContext| async move {
            Err::<Option<String>, _>(anyhow::anyhow!("boom"))
        })));
        let err = adapter.render(ctx(Arc::new(NoExports))).await.unwrap_err();
        assert!(matches!(err, Error::Callback { name: "render", .. }));
    }
}
