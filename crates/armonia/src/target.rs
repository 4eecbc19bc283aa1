//! Target resolution.
//!
//! A target string like `ssr-pwa` is split on the first `-` into a mode
//! (`ssr`) and an optional variant (`pwa`). Unknown or missing modes fall back
//! to the single-page pipeline; resolution never fails.

use std::fmt;

use armonia_config::TARGET_ENV;

/// The pipeline that owns a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Spa,
    Ssr,
    Ssg,
    Electron,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Spa => "spa",
            Mode::Ssr => "ssr",
            Mode::Ssg => "ssg",
            Mode::Electron => "electron",
        }
    }

    fn from_segment(segment: &str) -> Self {
        match segment {
            "ssr" => Mode::Ssr,
            "ssg" => Mode::Ssg,
            "electron" => Mode::Electron,
            _ => Mode::Spa,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed target: `{mode}[-{variant}]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Target {
    pub mode: Mode,
    pub variant: Option<String>,
}

impl Target {
    /// Parse a target string. Never fails: anything unrecognised is `spa`.
    pub fn parse(target: &str) -> Self {
        let target = target.trim();
        let (mode, variant) = match target.split_once('-') {
            Some((mode, variant)) => (mode, Some(variant)),
            None => (target, None),
        };

        Self {
            mode: Mode::from_segment(mode),
            variant: variant
                .filter(|variant| !variant.is_empty())
                .map(str::to_string),
        }
    }

    /// Resolve from an explicit target, falling back to `ARMONIA_TARGET`,
    /// then to `spa`.
    pub fn resolve(explicit: Option<&str>) -> Self {
        let from_env = std::env::var(TARGET_ENV).ok();
        let raw = explicit
            .filter(|target| !target.trim().is_empty())
            .or(from_env.as_deref().filter(|target| !target.trim().is_empty()));

        let target = raw.map(Self::parse).unwrap_or_default();
        tracing::debug!(mode = %target.mode, variant = ?target.variant, "resolved build target");
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn mode_is_substring_before_first_dash() {
        for (raw, mode) in [
            ("ssr", Mode::Ssr),
            ("ssg", Mode::Ssg),
            ("electron", Mode::Electron),
            ("spa", Mode::Spa),
            ("ssr-pwa", Mode::Ssr),
        ] {
            assert_eq!(Target::parse(raw).mode, mode, "target {raw}");
        }
    }

    #[test]
    fn variant_is_remainder_after_first_dash() {
        let target = Target::parse("ssr-pwa");
        assert_eq!(target.variant.as_deref(), Some("pwa"));

        let nested = Target::parse("electron-mac-arm64");
        assert_eq!(nested.mode, Mode::Electron);
        assert_eq!(nested.variant.as_deref(), Some("mac-arm64"));

        assert_eq!(Target::parse("ssr-").variant, None);
    }

    #[test]
    fn malformed_targets_fall_back_to_spa() {
        assert_eq!(Target::parse("").mode, Mode::Spa);
        assert_eq!(Target::parse("-ssr").mode, Mode::Spa);
        assert_eq!(Target::parse("capacitor").mode, Mode::Spa);
        assert_eq!(Target::parse("SSR").mode, Mode::Spa);
    }

    #[test]
    #[serial]
    fn explicit_target_wins_over_environment() {
        unsafe { std::env::set_var(TARGET_ENV, "electron") };
        let target = Target::resolve(Some("ssg"));
        unsafe { std::env::remove_var(TARGET_ENV) };
        assert_eq!(target.mode, Mode::Ssg);
    }

    #[test]
    #[serial]
    fn environment_is_the_fallback() {
        unsafe { std::env::set_var(TARGET_ENV, "ssr-pwa") };
        let target = Target::resolve(None);
        unsafe { std::env::remove_var(TARGET_ENV) };
        assert_eq!(target.mode, Mode::Ssr);
        assert_eq!(target.variant.as_deref(), Some("pwa"));
    }

    #[test]
    #[serial]
    fn absent_everything_is_spa() {
        unsafe { std::env::remove_var(TARGET_ENV) };
        assert_eq!(Target::resolve(None), Target::default());
        assert_eq!(Target::resolve(Some("  ")).mode, Mode::Spa);
    }
}
