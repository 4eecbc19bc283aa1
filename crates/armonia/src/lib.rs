#![cfg_attr(docsrs, feature(doc_cfg))]

//! # armonia
//!
//! Multi-target build orchestration for a front-end bundler. One project,
//! four outputs: a single-page app, an Electron app, a server-rendered
//! bundle, or a statically generated site.
//!
//! The bundler is the host. armonia implements the plugin side of its
//! lifecycle and reaches back into the host only through the traits in
//! [`host`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use armonia::{ArmoniaConfig, Pipeline, SsgFile, SsrCallbacks, StaticRenderContext};
//!
//! let callbacks = SsrCallbacks::new().static_render(|ctx: StaticRenderContext| async move {
//!     let code = ctx.render("/").await?.unwrap_or_default();
//!     Ok::<_, anyhow::Error>(vec![SsgFile::new("/index.html", code)])
//! });
//!
//! let config = ArmoniaConfig {
//!     target: Some("ssg".to_string()),
//!     ..ArmoniaConfig::default()
//! };
//!
//! match armonia::armonia(config, callbacks) {
//!     Pipeline::Ssr(plugin) => assert!(plugin.is_static_site()),
//!     _ => unreachable!(),
//! }
//! ```

pub mod electron;
pub mod entry;
pub mod error;
pub mod host;
pub mod paths;
pub mod render;
pub mod session;
pub mod spa;
pub mod ssr;
pub mod target;
pub mod virtual_module;

mod ssg;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

use std::path::Path;

pub use armonia_config::{
    ArmoniaConfig, ConfigDiscovery, ElectronSettings, SsrEntry, SsrSettings, merge_config,
};
pub use electron::{DevRunner, ElectronEntries, ElectronPlugin};
pub use entry::{EntryResolution, EntrySource, resolve_server_entry};
pub use error::{Error, Result};
pub use host::{
    Command, ConfigEnv, HtmlTransformer, InlineBuilder, ModuleLoader, ModuleSource,
    NestedBuildRequest, NestedBuilder, OutputBundle, OutputItem, RenderRequest, ResolvedConfig,
    ResponseHead, SharedResponse, SsrModule,
};
pub use render::{
    ManifestTransform, RenderAdapter, RenderCallback, RenderContext, SsgFile, SsrCallbacks,
    StaticRenderCallback, StaticRenderContext, TemplateTransform,
};
pub use session::{BuildSession, Manifest};
pub use spa::SpaPlugin;
pub use ssr::SsrPlugin;
pub use target::{Mode, Target};

/// The plugin that owns a build, chosen from the target.
#[derive(Debug)]
pub enum Pipeline {
    Spa(SpaPlugin),
    /// Both `ssr` and `ssg`; the latter has static generation switched on.
    Ssr(SsrPlugin),
    Electron(ElectronPlugin),
}

impl Pipeline {
    pub fn name(&self) -> &'static str {
        match self {
            Pipeline::Spa(_) => SpaPlugin::NAME,
            Pipeline::Ssr(_) => SsrPlugin::NAME,
            Pipeline::Electron(_) => ElectronPlugin::NAME,
        }
    }
}

/// Select and build the pipeline for `config`.
///
/// The target comes from `config.target`, then `ARMONIA_TARGET`, then `spa`.
/// `callbacks` are only used by the `ssr` and `ssg` pipelines.
pub fn armonia(config: ArmoniaConfig, callbacks: SsrCallbacks) -> Pipeline {
    let target = Target::resolve(config.target.as_deref());

    match target.mode {
        Mode::Spa => Pipeline::Spa(SpaPlugin),
        Mode::Ssr => Pipeline::Ssr(SsrPlugin::new(config.ssr, callbacks)),
        Mode::Ssg => Pipeline::Ssr(SsrPlugin::static_site(config.ssg, callbacks)),
        Mode::Electron => Pipeline::Electron(ElectronPlugin::new(config.electron)),
    }
}

/// [`armonia`] with the configuration discovered under `root`
/// (`armonia.toml` or the `armonia` field of `package.json`).
pub fn from_project(root: impl AsRef<Path>, callbacks: SsrCallbacks) -> Result<Pipeline> {
    let config = ConfigDiscovery::new(root).load_or_default()?;
    Ok(armonia(config, callbacks))
}
