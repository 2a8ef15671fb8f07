//! File/env settings for the motion and presence tunables.
//!
//! ```toml
//! [motion]
//! move_speed = 0.1
//! island_radius = 20.0
//!
//! [presence]
//! publish_interval_ms = 200
//! stale_after_ms = 30000
//! ```
//!
//! Env overrides use the `EXPLORER_` prefix with `__` between sections,
//! e.g. `EXPLORER_MOTION__MOVE_SPEED=0.2`.

use crate::error::Result;
use crate::types::{MotionConfig, PresenceConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerSettings {
    pub motion: MotionConfig,
    pub presence: PresenceConfig,
}

impl ExplorerSettings {
    /// Defaults, then `file` (if given), then `EXPLORER_*` env.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("EXPLORER")
                .prefix_separator("_")
                .separator("__"),
        );
        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string (no env layer).
    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;
        let settings: Self = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.motion.validate()?;
        self.presence.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExplorerError;

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = ExplorerSettings::from_toml(
            "[motion]\nisland_radius = 12.5\n\n[presence]\nstale_after_ms = 10000\n",
        )
        .unwrap();
        assert_eq!(s.motion.island_radius, 12.5);
        assert_eq!(s.motion.move_speed, 0.1);
        assert_eq!(s.presence.stale_after_ms, 10_000);
        assert_eq!(s.presence.publish_interval_ms, 200);
    }

    #[test]
    fn zero_publish_interval_is_rejected() {
        let err = ExplorerSettings::from_toml("[presence]\npublish_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, ExplorerError::Config(_)));
        assert!(err.to_string().contains("publish_interval_ms"));
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let err = ExplorerSettings::from_toml("[presence]\nsweep_interval_ms = 0\n").unwrap_err();
        assert!(matches!(err, ExplorerError::Config(_)));
        assert!(err.to_string().contains("sweep_interval_ms"));
    }

    #[test]
    fn heading_smoothing_outside_unit_range_is_rejected() {
        for value in ["0.0", "-0.5", "1.5"] {
            let text = format!("[motion]\nheading_smoothing = {}\n", value);
            let err = ExplorerSettings::from_toml(&text).unwrap_err();
            assert!(err.to_string().contains("heading_smoothing"), "{}", value);
        }
        let s = ExplorerSettings::from_toml("[motion]\nheading_smoothing = 1.0\n").unwrap();
        assert_eq!(s.motion.heading_smoothing, 1.0);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(ExplorerSettings::from_toml("").unwrap(), ExplorerSettings::default());
    }
}
