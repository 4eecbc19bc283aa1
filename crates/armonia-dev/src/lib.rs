//! Dev-server integration for armonia's SSR pipeline.
//!
//! [`with_ssr`] wraps an axum router with a middleware that intercepts
//! requests for existing `.html` pages, runs them through the host's HTML
//! transform and the server entry's render step, and answers with the
//! rendered document. Anything the render step declines falls through to
//! the wrapped router.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # fn wire(renderer: armonia_dev::DevRenderer) -> axum::Router {
//! let static_files = axum::Router::new();
//! armonia_dev::with_ssr(static_files, Arc::new(renderer))
//! # }
//! ```

pub mod error;
pub mod middleware;
pub mod renderer;
pub mod response;

use std::sync::Arc;

use axum::Router;

pub use error::{DevError, Result};
pub use middleware::ssr_middleware;
pub use renderer::{DevRenderer, RenderedPage};

/// Put the SSR middleware in front of `router`.
pub fn with_ssr(router: Router, renderer: Arc<DevRenderer>) -> Router {
    router.layer(axum::middleware::from_fn_with_state(renderer, ssr_middleware))
}
