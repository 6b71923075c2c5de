//! Renderer configuration.
//!
//! `RenderHints` carries the small key/value hint map callers pass when a
//! renderer is built. `RendererConfig` holds the static tuning constants.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for render hint {key}")]
    InvalidValue { key: String, value: String },
}

/// Renderer variant. Realtime enables solid guessing and symmetry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RendererKind {
    #[default]
    Standard,
    Realtime,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressMode {
    SinglePass,
    #[default]
    Progressive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderHints {
    pub kind: RendererKind,
    pub progress: ProgressMode,
    pub multithread: bool,
}

impl Default for RenderHints {
    fn default() -> Self {
        Self {
            kind: RendererKind::Standard,
            progress: ProgressMode::Progressive,
            multithread: true,
        }
    }
}

impl RenderHints {
    pub const TYPE: &'static str = "TYPE";
    pub const PROGRESS: &'static str = "PROGRESS";
    pub const MULTITHREAD: &'static str = "MULTITHREAD";

    /// Parse `TYPE`, `PROGRESS` and `MULTITHREAD` hints. Missing keys keep
    /// their defaults; unknown keys are ignored.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut hints = Self::default();
        for (key, value) in pairs {
            let invalid = || ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            };
            match key {
                Self::TYPE => {
                    hints.kind = match value {
                        "standard" => RendererKind::Standard,
                        "realtime" => RendererKind::Realtime,
                        _ => return Err(invalid()),
                    }
                }
                Self::PROGRESS => {
                    hints.progress = match value {
                        "single-pass" => ProgressMode::SinglePass,
                        "progressive" => ProgressMode::Progressive,
                        _ => return Err(invalid()),
                    }
                }
                Self::MULTITHREAD => {
                    hints.multithread = match value {
                        "enabled" => true,
                        "disabled" => false,
                        _ => return Err(invalid()),
                    }
                }
                _ => log::warn!("Ignoring unknown render hint {}={}", key, value),
            }
        }
        Ok(hints)
    }

    pub fn realtime() -> Self {
        Self {
            kind: RendererKind::Realtime,
            ..Self::default()
        }
    }

    pub fn single_pass(mut self) -> Self {
        self.progress = ProgressMode::SinglePass;
        self
    }

    pub fn single_threaded(mut self) -> Self {
        self.multithread = false;
        self
    }
}

/// Static renderer tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RendererConfig {
    /// Pixel stride of the first progressive pass. Strides halve down to 1.
    pub coarsest_stride: u32,
    /// Rows per band. Kept a multiple of `coarsest_stride` so every band
    /// starts on the coarsest grid.
    pub band_height: u32,
    /// Side of a solid-guess block, in grid points of the current pass.
    pub solid_block: u32,
    /// Upper bound on worker threads; 0 means one per available CPU.
    pub max_workers: usize,
}

impl RendererConfig {
    /// Strides of the passes, coarse to fine.
    pub fn strides(&self, progress: ProgressMode) -> Vec<u32> {
        match progress {
            ProgressMode::SinglePass => vec![1],
            ProgressMode::Progressive => {
                let mut strides = Vec::new();
                let mut stride = self.coarsest_stride.max(1).next_power_of_two();
                while stride >= 1 {
                    strides.push(stride);
                    stride /= 2;
                }
                strides
            }
        }
    }

    /// Worker count for `bands` bands when `available` CPUs exist.
    pub fn worker_count(&self, multithread: bool, available: usize, bands: usize) -> usize {
        if !multithread {
            return 1;
        }
        let cap = if self.max_workers == 0 {
            available
        } else {
            self.max_workers.min(available)
        };
        cap.min(bands).max(1)
    }
}

/// Canonical renderer configuration.
pub static RENDERER_CONFIG: RendererConfig = RendererConfig {
    coarsest_stride: 8,
    band_height: 16,
    solid_block: 4,
    max_workers: 0,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_parse_from_pairs() {
        let hints = RenderHints::from_pairs([
            ("TYPE", "realtime"),
            ("PROGRESS", "single-pass"),
            ("MULTITHREAD", "disabled"),
        ])
        .unwrap();
        assert_eq!(hints.kind, RendererKind::Realtime);
        assert_eq!(hints.progress, ProgressMode::SinglePass);
        assert!(!hints.multithread);
    }

    #[test]
    fn missing_and_unknown_hints_keep_defaults() {
        let hints = RenderHints::from_pairs([("COLOR", "fancy")]).unwrap();
        assert_eq!(hints, RenderHints::default());
    }

    #[test]
    fn invalid_hint_value_is_rejected() {
        let err = RenderHints::from_pairs([("TYPE", "fast")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "TYPE".into(),
                value: "fast".into()
            }
        );
    }

    #[test]
    fn progressive_strides_halve_to_one() {
        assert_eq!(RENDERER_CONFIG.strides(ProgressMode::Progressive), vec![8, 4, 2, 1]);
        assert_eq!(RENDERER_CONFIG.strides(ProgressMode::SinglePass), vec![1]);
    }

    #[test]
    fn worker_count_is_bounded() {
        assert_eq!(RENDERER_CONFIG.worker_count(true, 8, 3), 3);
        assert_eq!(RENDERER_CONFIG.worker_count(true, 2, 10), 2);
        assert_eq!(RENDERER_CONFIG.worker_count(false, 8, 10), 1);
        assert_eq!(RENDERER_CONFIG.worker_count(true, 8, 0), 1);
    }

    #[test]
    fn band_height_is_multiple_of_coarsest_stride() {
        assert_eq!(RENDERER_CONFIG.band_height % RENDERER_CONFIG.coarsest_stride, 0);
    }

    #[test]
    fn hints_serialize_with_kebab_case_values() {
        let json = serde_json::to_string(&RenderHints::realtime().single_pass()).unwrap();
        assert!(json.contains("\"realtime\""));
        assert!(json.contains("\"single-pass\""));
    }
}
