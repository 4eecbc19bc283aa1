//! Output path handling: SSG file placement and out-dir preparation.

use std::path::{Path, PathBuf};

use path_clean::PathClean;

use crate::error::{Error, Result};

/// Bundle file name for an SSG file id: the id, stripped of leading
/// separators, placed under `server_root` and cleaned.
///
/// `/sub/page.html` under `www` becomes `www/sub/page.html`. The result may
/// still point outside the server root; [`contained_path`] decides whether it
/// can be written.
pub fn normalize_ssg_path(server_root: &str, id: &str) -> String {
    let id = id.replace('\\', "/");
    let id = id.trim_start_matches('/');
    let joined = Path::new(server_root).join(id).clean();
    joined.to_string_lossy().replace('\\', "/")
}

/// `relative` resolved against `base`, or `None` when the result leaves
/// `base` (or is `base` itself).
pub fn contained_path(base: &Path, relative: &str) -> Option<PathBuf> {
    if relative.is_empty() || relative.contains('\0') {
        return None;
    }

    let base = base.clean();
    let full = base.join(Path::new(relative).clean()).clean();
    (full.starts_with(&base) && full != base).then_some(full)
}

/// Empty the output directory before the server build writes into it.
///
/// Both builds share the directory, so the host's own emptying is turned
/// off and done here instead. `.git` is kept. With `empty_out_dir` unset an
/// out dir outside `root` is left alone.
pub async fn prepare_out_dir(out_dir: &Path, empty_out_dir: Option<bool>, root: &Path) -> Result<()> {
    if !tokio::fs::try_exists(out_dir)
        .await
        .map_err(Error::io(out_dir))?
    {
        return Ok(());
    }

    match empty_out_dir {
        None if !out_dir.clean().starts_with(root.clean()) => {
            tracing::warn!(
                out_dir = %out_dir.display(),
                "outDir is not inside project root and will not be emptied; set emptyOutDir to override"
            );
            Ok(())
        }
        Some(false) => Ok(()),
        _ => empty_dir(out_dir, &[".git"]).await,
    }
}

/// Remove everything inside `dir` except the entries named in `skip`.
pub async fn empty_dir(dir: &Path, skip: &[&str]) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(Error::io(dir))?;

    while let Some(entry) = entries.next_entry().await.map_err(Error::io(dir))? {
        if skip.iter().any(|name| entry.file_name() == *name) {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type().await.map_err(Error::io(&path))?;
        if file_type.is_dir() {
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(Error::io(&path))?;
        } else {
            tokio::fs::remove_file(&path)
                .await
                .map_err(Error::io(&path))?;
        }
    }

    Ok(())
}
