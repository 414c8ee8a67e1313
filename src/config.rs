//! Run configuration, loadable from a TOML file with sensible defaults.
//!
//! Defaults mirror the classic SIFT-montage parameters: 1 px minimal and
//! 10 px maximal alignment error, 0.05 inlier ratio, 1.25 ratio threshold,
//! a 100-iteration trend window and a 100 000-iteration cap.
//!
//! ## Example TOML
//!
//! ```toml
//! model = "rigid"
//! prealigned = true
//!
//! [intra]
//! min_epsilon = 1.0
//! max_epsilon = 10.0
//! min_inlier_ratio = 0.05
//!
//! [cross]
//! min_epsilon = 2.0
//! max_epsilon = 50.0
//!
//! [optimizer]
//! max_iterations = 100000
//! trend_window = 100
//!
//! [coarse]
//! max_error = 10.0
//! max_image_size = 512
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::ModelKind;
use crate::error::{AlignError, Result};

/// Error tolerance for one pairwise model fit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PairTolerance {
    /// Minimal allowed alignment error in px; also the epsilon step size.
    pub min_epsilon: f64,
    /// Maximal allowed alignment error in px.
    pub max_epsilon: f64,
    /// Minimal fraction of candidates that must be inliers.
    pub min_inlier_ratio: f64,
}

impl Default for PairTolerance {
    fn default() -> Self {
        Self {
            min_epsilon: 1.0,
            max_epsilon: 10.0,
            min_inlier_ratio: 0.05,
        }
    }
}

impl PairTolerance {
    /// Looser default used for pairs from two different sections.
    pub fn cross_section() -> Self {
        Self {
            min_epsilon: 2.0,
            max_epsilon: 50.0,
            min_inlier_ratio: 0.05,
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        // min_epsilon doubles as the escalation step size and must advance
        if self.min_epsilon <= 0.0 {
            return Err(AlignError::Config(format!(
                "{}: min_epsilon must be positive, got {}",
                section, self.min_epsilon
            )));
        }
        if self.max_epsilon < self.min_epsilon {
            return Err(AlignError::Config(format!(
                "{}: max_epsilon {} is below min_epsilon {}",
                section, self.max_epsilon, self.min_epsilon
            )));
        }
        Ok(())
    }
}

/// Iteration bounds for the relaxation solver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Hard iteration cap; reaching it is a soft failure.
    pub max_iterations: u64,
    /// Trailing window length for the displacement-delta trend test.
    pub trend_window: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
            trend_window: 100,
        }
    }
}

/// Parameters for whole-section coarse registration, including the
/// relax-and-retry schedule applied when it fails.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CoarseConfig {
    /// Initial maximal alignment error in px.
    pub max_error: f64,
    /// Factor applied to `max_error` on each retry.
    pub error_relax_factor: f64,
    /// Initial maximal working image size (longest side, px).
    pub max_image_size: u32,
    /// Structural ceiling for the working image size; reaching it without
    /// success leaves the section pair unlinked.
    pub image_size_ceiling: u32,
}

impl Default for CoarseConfig {
    fn default() -> Self {
        Self {
            max_error: 10.0,
            error_relax_factor: 1.5,
            max_image_size: 512,
            image_size_ceiling: 4096,
        }
    }
}

/// Top-level configuration for one registration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Transform class estimated for every tile; fixed for the whole run.
    pub model: ModelKind,
    /// Nearest/second-nearest descriptor ratio threshold.
    pub ratio_threshold: RatioThreshold,
    /// Whether tile placements are trusted enough that bounding-box
    /// overlap reflects true spatial overlap. Enables the pairwise
    /// intersection test and disconnected-graph repair.
    pub prealigned: bool,
    /// Worker threads for feature extraction; 0 means one per available
    /// hardware thread.
    pub threads: usize,
    /// Tolerance for pairs within one section.
    pub intra: PairTolerance,
    /// Tolerance for pairs across consecutive sections.
    pub cross: PairTolerance,
    /// Relaxation solver bounds.
    pub optimizer: OptimizerConfig,
    /// Coarse section-pair registration parameters.
    pub coarse: CoarseConfig,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::default(),
            ratio_threshold: RatioThreshold::default(),
            prealigned: true,
            threads: 0,
            intra: PairTolerance::default(),
            cross: PairTolerance::cross_section(),
            optimizer: OptimizerConfig::default(),
            coarse: CoarseConfig::default(),
        }
    }
}

/// Newtype so the ratio threshold can default to 1.25 under
/// `#[serde(default)]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatioThreshold(pub f32);

impl Default for RatioThreshold {
    fn default() -> Self {
        RatioThreshold(1.25)
    }
}

impl AlignConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject parameter combinations that cannot run.
    pub fn validate(&self) -> Result<()> {
        self.intra.validate("intra")?;
        self.cross.validate("cross")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AlignConfig::default();
        assert_eq!(config.model, ModelKind::Rigid);
        assert_eq!(config.intra.min_epsilon, 1.0);
        assert_eq!(config.intra.max_epsilon, 10.0);
        assert_eq!(config.optimizer.max_iterations, 100_000);
        assert_eq!(config.optimizer.trend_window, 100);
        assert_eq!(config.ratio_threshold.0, 1.25);
        assert_eq!(config.cross.max_epsilon, 50.0);
        assert!(config.prealigned);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AlignConfig::from_toml_str(
            r#"
            model = "affine"

            [intra]
            max_epsilon = 25.0
            "#,
        )
        .unwrap();
        assert_eq!(config.model, ModelKind::Affine);
        assert_eq!(config.intra.max_epsilon, 25.0);
        // untouched fields fall back to defaults
        assert_eq!(config.intra.min_epsilon, 1.0);
        assert_eq!(config.cross.min_inlier_ratio, 0.05);
    }

    #[test]
    fn test_zero_epsilon_step_rejected() {
        let err = AlignConfig::from_toml_str(
            r#"
            [intra]
            min_epsilon = 0.0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("min_epsilon"), "{}", err);

        let err = AlignConfig::from_toml_str(
            r#"
            [cross]
            min_epsilon = 5.0
            max_epsilon = 1.0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_epsilon"), "{}", err);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = AlignConfig::from_toml_str("model = 7").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("configuration error"), "{}", msg);
    }
}
