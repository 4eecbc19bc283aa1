//! Errors raised while rendering a page for the dev server.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DevError {
    /// Capturing the template or running the render step failed.
    #[error(transparent)]
    Render(#[from] armonia::Error),

    /// A host capability (HTML transform, module load) failed.
    #[error("host {operation} failed: {source}")]
    Host {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DevError>;

impl DevError {
    pub(crate) fn host(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| DevError::Host { operation, source }
    }
}
