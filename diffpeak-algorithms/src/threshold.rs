//! Threshold evaluators.
//!
//! A threshold decides which pixels of a filtered frame seed blobs. The
//! absolute evaluator is a constant; the relative evaluator estimates the
//! frame background by iterated outlier rejection and places the threshold a
//! configurable number of standard deviations above it.

use std::collections::HashMap;

use diffpeak_core::{ConfigError, DataError, DataSet, Frame};

/// Validated threshold selection.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ThresholdConfig {
    /// Fixed intensity cut, applied identically to every frame.
    Absolute {
        /// Pixels at or above this value seed blobs.
        value: f64,
    },
    /// Per-frame cut at `background + intensity_scale * sqrt(background)`,
    /// with the background mean estimated by iterated outlier rejection.
    Relative {
        /// Rejection band half-width in background standard deviations.
        background_scale: f64,
        /// Final threshold offset in background standard deviations.
        intensity_scale: f64,
        /// Number of rejection passes.
        n_iterations: usize,
    },
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig::Absolute { value: 80.0 }
    }
}

impl ThresholdConfig {
    /// Resolves a string key plus numeric parameters.
    ///
    /// Known keys: `absolute`, `relative`.
    pub fn from_key(key: &str, params: &HashMap<String, f64>) -> Result<Self, ConfigError> {
        let config = match key {
            "absolute" => ThresholdConfig::Absolute {
                value: params.get("value").copied().unwrap_or(80.0),
            },
            "relative" => {
                let n_iterations = params.get("n_iterations").copied().unwrap_or(3.0);
                if n_iterations < 1.0 {
                    return Err(ConfigError::ZeroIterations);
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let n_iterations = n_iterations as usize;
                ThresholdConfig::Relative {
                    background_scale: params.get("background_scale").copied().unwrap_or(3.0),
                    intensity_scale: params.get("intensity_scale").copied().unwrap_or(3.0),
                    n_iterations,
                }
            }
            other => return Err(ConfigError::UnknownThreshold(other.into())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            ThresholdConfig::Absolute { value } => {
                if value < 0.0 {
                    return Err(ConfigError::NegativeThreshold(value));
                }
            }
            ThresholdConfig::Relative {
                background_scale,
                intensity_scale,
                n_iterations,
            } => {
                if background_scale <= 0.0 {
                    return Err(ConfigError::NonPositiveParameter {
                        name: "background_scale",
                        value: background_scale,
                    });
                }
                if intensity_scale <= 0.0 {
                    return Err(ConfigError::NonPositiveParameter {
                        name: "intensity_scale",
                        value: intensity_scale,
                    });
                }
                if n_iterations == 0 {
                    return Err(ConfigError::ZeroIterations);
                }
            }
        }
        Ok(())
    }

    /// Evaluates the threshold for one frame of a data set.
    ///
    /// Reads the frame only for the relative evaluator; the absolute one
    /// never touches the data.
    pub fn value(&self, data: &dyn DataSet, frame_index: usize) -> Result<f64, DataError> {
        match *self {
            ThresholdConfig::Absolute { value } => Ok(value),
            ThresholdConfig::Relative { .. } => Ok(self.frame_value(&data.frame(frame_index)?)),
        }
    }

    /// Evaluates the threshold for one raw frame.
    ///
    /// The cut is always derived from raw intensities, not from the
    /// convolver response the labeling engine compares against it.
    #[must_use]
    pub fn frame_value(&self, frame: &Frame) -> f64 {
        match *self {
            ThresholdConfig::Absolute { value } => value,
            ThresholdConfig::Relative {
                background_scale,
                intensity_scale,
                n_iterations,
            } => {
                let background =
                    estimate_background(frame, background_scale, n_iterations);
                background + intensity_scale * background.max(0.0).sqrt()
            }
        }
    }
}

/// Iterated sigma-clipped mean: each pass recomputes the mean over pixels
/// no more than `scale` Poisson standard deviations above the current
/// estimate.
fn estimate_background(frame: &Frame, scale: f64, n_iterations: usize) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let mut mean = frame.sum() / frame.len() as f64;
    for _ in 0..n_iterations {
        let cut = mean + scale * mean.max(0.0).sqrt();
        let mut sum = 0.0;
        let mut count = 0usize;
        for &v in frame {
            if v <= cut {
                sum += v;
                count += 1;
            }
        }
        if count == 0 {
            break;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            mean = sum / count as f64;
        }
    }
    mean
}
