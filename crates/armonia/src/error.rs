//! Error types for armonia build orchestration.

use std::path::PathBuf;

/// Error types for armonia operations.
///
/// Absent features (SSR disabled, no entry, missing manifest) are not errors;
/// the pipeline goes inert instead. What remains here is either a failure
/// raised by user code or the host, or a broken build artifact.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A user-supplied callback (`render`, `staticRender`,
    /// `transformTemplate`, `transformManifest`) failed.
    #[error("{name} callback failed: {source}")]
    Callback {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A host capability (nested build, HTML transform, module load) failed.
    #[error("host {operation} failed: {source}")]
    Host {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The captured SSR manifest is not valid JSON of the expected shape.
    #[error("invalid SSR manifest '{file}': {source}")]
    Manifest {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// The loaded server module exposes neither render export.
    #[error("SSR module does not export '{export}'")]
    MissingExport { export: &'static str },

    /// A build phase ran before the host delivered its resolved config.
    #[error("build phase '{phase}' ran before the configuration was resolved")]
    NotResolved { phase: &'static str },

    /// I/O error with the path it happened on.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Plugin configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] armonia_config::ConfigError),
}

/// Result type alias for armonia operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn callback(name: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Error::Callback { name, source }
    }

    pub(crate) fn host(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Error::Host { operation, source }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::Callback { .. } => "CALLBACK_ERROR",
            Error::Host { .. } => "HOST_ERROR",
            Error::Manifest { .. } => "INVALID_MANIFEST",
            Error::MissingExport { .. } => "MISSING_EXPORT",
            Error::NotResolved { .. } => "CONFIG_NOT_RESOLVED",
            Error::Io { .. } => "IO_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::MissingExport { export } => Some(Box::new(format!(
                "Export a `renderVite(url, template, options)` or `render(req, res, template, options)` \
                 function from the server entry, or configure a `render` callback (missing: {export})."
            ))),
            Error::Manifest { file, .. } => Some(Box::new(format!(
                "The client build produced '{file}' but it is not a JSON object of module id to asset list."
            ))),
            Error::NotResolved { .. } => Some(Box::new(
                "The host must deliver the resolved configuration before the build starts.",
            )),
            _ => None,
        }
    }
}
