//! Static render distribution: the last phase of an SSG build.
//!
//! After the host has written the server build, the compiled entry is loaded
//! from disk and handed to the user's static-render callback. Every file it
//! returns is emitted into the bundle under the server root and, when its
//! path stays inside the output directory, written to disk directly.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::host::{ModuleLoader, ModuleSource, OutputBundle};
use crate::paths::{contained_path, normalize_ssg_path};
use crate::render::StaticRenderContext;
use crate::ssr::SsrPlugin;

pub(crate) async fn distribute(
    plugin: &SsrPlugin,
    bundle: &mut OutputBundle,
    loader: &dyn ModuleLoader,
) -> Result<Vec<PathBuf>> {
    let session = plugin.session();
    let Some(static_render) = plugin.callbacks().static_render.clone() else {
        debug!("no staticRender callback configured, nothing to generate");
        return Ok(Vec::new());
    };

    let config = session.config("writeBundle")?;
    let out_dir = config.out_dir();
    let entry = session.entry();
    let entry_module = entry.as_ref().and_then(|entry| entry.module());

    let Some(entry_file) = bundle
        .entry_chunk(entry_module)
        .map(|(name, _)| out_dir.join(name))
    else {
        warn!(entry = ?entry_module, "compiled server entry not found in the bundle, skipping static render");
        return Ok(Vec::new());
    };

    if !tokio::fs::try_exists(&entry_file)
        .await
        .map_err(Error::io(&entry_file))?
    {
        warn!(file = %entry_file.display(), "compiled server entry missing on disk, skipping static render");
        return Ok(Vec::new());
    }

    let module = loader
        .load(ModuleSource::File(&entry_file))
        .await
        .map_err(Error::host("module load"))?;

    let ctx = StaticRenderContext::new(
        module,
        config.clone(),
        session.template(),
        session.manifest(),
        plugin.adapter().clone(),
    );
    let files = static_render
        .static_render(ctx)
        .await
        .map_err(Error::callback("staticRender"))?;

    let server_root = plugin.settings().server_root();
    let mut written = Vec::with_capacity(files.len());

    for file in files {
        let file_name = normalize_ssg_path(&server_root, &file.id);

        let Some(path) = contained_path(&out_dir, &file_name) else {
            warn!(
                id = %file.id,
                out_dir = %out_dir.display(),
                "static file resolves outside the output directory and was not written"
            );
            bundle.emit_asset(file_name, file.code);
            continue;
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(Error::io(parent))?;
        }
        tokio::fs::write(&path, file.code.as_bytes())
            .await
            .map_err(Error::io(&path))?;
        info!(file = %path.display(), "generated");

        bundle.emit_asset(file_name, file.code);
        written.push(path);
    }

    Ok(written)
}
