//! `ssr:manifest` and `ssr:template`: importable views of the captured
//! manifest and template.
//!
//! Both are served from the session at load time, so application code always
//! imports whatever the current build captured.

use crate::error::{Error, Result};
use crate::session::BuildSession;

pub const MANIFEST_ID: &str = "ssr:manifest";
pub const TEMPLATE_ID: &str = "ssr:template";

/// Claim one of the virtual ids. Anything else is left to the host.
pub fn resolve_id(specifier: &str) -> Option<&'static str> {
    match specifier {
        MANIFEST_ID => Some(MANIFEST_ID),
        TEMPLATE_ID => Some(TEMPLATE_ID),
        _ => None,
    }
}

/// Module source for a virtual id, `None` for ids this plugin does not own.
pub fn load(id: &str, session: &BuildSession) -> Result<Option<String>> {
    let json = match id {
        MANIFEST_ID => {
            serde_json::to_string_pretty(&*session.manifest()).map_err(|source| {
                Error::Manifest {
                    file: MANIFEST_ID.to_string(),
                    source,
                }
            })?
        }
        TEMPLATE_ID => serde_json::Value::String(session.template()).to_string(),
        _ => return Ok(None),
    };

    Ok(Some(format!("export default {json}")))
}
