//! The default single-page pipeline.
//!
//! Only defines build-time flags so application code can branch on
//! `import.meta.env.CAPACITOR` or `import.meta.env.ELECTRON` without the
//! platform-specific values being present.

use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, Default)]
pub struct SpaPlugin;

impl SpaPlugin {
    pub const NAME: &'static str = "armonia:spa";

    pub fn config(&self) -> Value {
        json!({ "define": define_flags() })
    }
}

/// Flags defined for every SPA build.
pub fn define_flags() -> Value {
    json!({
        "import.meta.env.CAPACITOR": true,
        "import.meta.env.ELECTRON": true,
        "import.meta.env.ELECTRON_APP_URL": "undefined",
        "import.meta.env.ELECTRON_PRELOAD_URL": "undefined"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spa_defines_platform_flags() {
        let config = SpaPlugin.config();
        let define = &config["define"];
        assert_eq!(define["import.meta.env.CAPACITOR"], json!(true));
        assert_eq!(define["import.meta.env.ELECTRON"], json!(true));
        assert_eq!(define["import.meta.env.ELECTRON_APP_URL"], json!("undefined"));
        assert_eq!(define["import.meta.env.ELECTRON_PRELOAD_URL"], json!("undefined"));
    }
}
