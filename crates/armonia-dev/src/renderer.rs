//! Rendering one dev-server page request.

use std::path::PathBuf;
use std::sync::Arc;

use armonia::paths::contained_path;
use armonia::{
    EntryResolution, HtmlTransformer, ModuleLoader, ModuleSource, RenderContext, RenderRequest,
    ResponseHead, SharedResponse, SsrPlugin,
};
use axum::http::request::Parts;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{DevError, Result};

/// A rendered page, ready to send.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub head: ResponseHead,
}

/// Renders HTML page requests through the SSR plugin using the host's
/// dev-server capabilities.
pub struct DevRenderer {
    plugin: Arc<SsrPlugin>,
    html: Arc<dyn HtmlTransformer>,
    loader: Arc<dyn ModuleLoader>,
}

impl DevRenderer {
    pub fn new(
        plugin: Arc<SsrPlugin>,
        html: Arc<dyn HtmlTransformer>,
        loader: Arc<dyn ModuleLoader>,
    ) -> Self {
        Self {
            plugin,
            html,
            loader,
        }
    }

    pub fn plugin(&self) -> &Arc<SsrPlugin> {
        &self.plugin
    }

    /// The HTML file a request maps to, if it should be server-rendered.
    ///
    /// Only `.html` paths qualify, never script fetches, and only regular
    /// files inside the project root.
    pub async fn page_for(&self, parts: &Parts) -> Result<Option<PathBuf>> {
        let path = parts.uri.path();
        if !path.ends_with(".html") {
            return Ok(None);
        }

        let fetch_dest = parts
            .headers
            .get("sec-fetch-dest")
            .and_then(|value| value.to_str().ok());
        if fetch_dest == Some("script") {
            return Ok(None);
        }

        let Ok(decoded) = urlencoding::decode(path) else {
            debug!(path, "undecodable page path");
            return Ok(None);
        };

        let config = self.plugin.session().config("configureServer")?;
        let Some(file) = contained_path(&config.root, decoded.trim_start_matches('/')) else {
            debug!(path, "page path escapes the project root");
            return Ok(None);
        };

        match tokio::fs::metadata(&file).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(file)),
            _ => Ok(None),
        }
    }

    /// Render `file` for the request. `None` means the render step declined
    /// and the request should fall through.
    pub async fn render(&self, parts: &Parts, file: PathBuf) -> Result<Option<RenderedPage>> {
        let entry = match self.plugin.dev_entry()? {
            EntryResolution::Entry { module, .. } => module,
            EntryResolution::Disabled => return Ok(None),
        };

        let raw = tokio::fs::read_to_string(&file)
            .await
            .map_err(|source| DevError::Io {
                path: file.clone(),
                source,
            })?;

        let original_url = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());
        let html = self
            .html
            .transform_index_html(parts.uri.path(), raw, Some(&original_url))
            .await
            .map_err(DevError::host("transformIndexHtml"))?;

        let template = self
            .plugin
            .session()
            .capture_request_template(html, self.plugin.callbacks().transform_template.as_deref())
            .await?;

        trace!(entry = %entry, "loading server entry");
        let module = self
            .loader
            .load(ModuleSource::Specifier(&entry))
            .await
            .map_err(DevError::host("ssrLoadModule"))?;

        let response: SharedResponse = Arc::new(Mutex::new(ResponseHead::default()));
        let ctx = RenderContext {
            module,
            request: render_request(parts, original_url),
            response: Some(response.clone()),
            template,
            manifest: self.plugin.session().manifest(),
        };

        let Some(html) = self.plugin.adapter().render(ctx).await? else {
            return Ok(None);
        };
        let head = response.lock().clone();
        Ok(Some(RenderedPage { html, head }))
    }
}

fn render_request(parts: &Parts, url: String) -> RenderRequest {
    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect();

    RenderRequest {
        method: parts.method.to_string(),
        url,
        headers,
    }
}
