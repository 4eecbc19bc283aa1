use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, error};

use crate::renderer::DevRenderer;
use crate::response::{error_page, send_html};

/// Server-render HTML page requests; everything else goes to `next`.
pub async fn ssr_middleware(
    State(renderer): State<Arc<DevRenderer>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let file = match renderer.page_for(&parts).await {
        Ok(Some(file)) => file,
        Ok(None) => return next.run(Request::from_parts(parts, body)).await,
        Err(err) => {
            error!(error = %err, "SSR page lookup failed");
            return error_page(&err);
        }
    };

    match renderer.render(&parts, file).await {
        Ok(Some(page)) => {
            let server_headers = match renderer.plugin().session().config("configureServer") {
                Ok(config) => config.server.headers.clone(),
                Err(_) => Default::default(),
            };
            send_html(&parts.headers, page.html, &page.head, &server_headers)
        }
        Ok(None) => {
            debug!(path = parts.uri.path(), "render step declined the request");
            next.run(Request::from_parts(parts, body)).await
        }
        Err(err) => {
            error!(path = parts.uri.path(), error = %err, "SSR render failed");
            error_page(&err)
        }
    }
}
