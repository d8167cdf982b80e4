//! Convolver family: FFT-based frame filters selected by string key.
//!
//! A convolver transforms a raw frame into a statistic emphasizing localized
//! intensity excursions; the labeling engine thresholds the filtered frame
//! but accumulates raw intensities. Kernel selection and parameters are
//! validated eagerly so that `convolve` itself never fails.

mod engine;
mod kernel;

use std::collections::HashMap;

use diffpeak_core::{ConfigError, Frame};

use engine::FftConvolver;
pub use kernel::{Axis, GradientOp};

/// The closed set of kernels, with their parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KernelKind {
    /// Identity: no filtering.
    Delta,
    /// Uniform box average of `size x size` pixels.
    Constant {
        /// Box edge length in pixels.
        size: usize,
    },
    /// Normalized indicator over the annulus `[r_in, r_out)`.
    Radial {
        /// Inner radius in pixels.
        r_in: f64,
        /// Outer radius in pixels.
        r_out: f64,
    },
    /// Peak response minus local background response:
    /// `radial(0, r1) - radial(r2, r3)`.
    Annular {
        /// Peak disc radius.
        r1: f64,
        /// Background annulus inner radius.
        r2: f64,
        /// Background annulus outer radius.
        r3: f64,
    },
    /// Annular response divided by the local background standard deviation.
    EnhancedAnnular {
        /// Peak disc radius.
        r1: f64,
        /// Background annulus inner radius.
        r2: f64,
        /// Background annulus outer radius.
        r3: f64,
    },
    /// Fixed directional-derivative stencil.
    Gradient {
        /// Operator family.
        op: GradientOp,
        /// Derivative direction.
        axis: Axis,
    },
}

impl KernelKind {
    fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            KernelKind::Delta | KernelKind::Gradient { .. } => Ok(()),
            KernelKind::Constant { size } => {
                if size == 0 {
                    return Err(ConfigError::NonPositiveParameter {
                        name: "box_size",
                        value: 0.0,
                    });
                }
                Ok(())
            }
            KernelKind::Radial { r_in, r_out } => {
                if r_in < 0.0 {
                    return Err(ConfigError::NonPositiveParameter {
                        name: "r_in",
                        value: r_in,
                    });
                }
                if r_out <= r_in {
                    return Err(ConfigError::InvalidAnnulus { r_in, r_out });
                }
                if kernel::radial_stencil(r_in, r_out).is_none() {
                    return Err(ConfigError::DegenerateKernel("radial".into()));
                }
                Ok(())
            }
            KernelKind::Annular { r1, r2, r3 } | KernelKind::EnhancedAnnular { r1, r2, r3 } => {
                if r1 <= 0.0 {
                    return Err(ConfigError::NonPositiveParameter {
                        name: "r1",
                        value: r1,
                    });
                }
                if r2 < r1 {
                    return Err(ConfigError::InvalidAnnulus {
                        r_in: r1,
                        r_out: r2,
                    });
                }
                if r3 <= r2 {
                    return Err(ConfigError::InvalidAnnulus {
                        r_in: r2,
                        r_out: r3,
                    });
                }
                if kernel::radial_stencil(r2, r3).is_none() {
                    return Err(ConfigError::DegenerateKernel("annular".into()));
                }
                Ok(())
            }
        }
    }
}

/// Validated convolver selection. Building the runtime [`Convolver`] from a
/// config is infallible, so each labeling worker can cheaply build its own
/// instance instead of sharing FFT plans across threads.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConvolverConfig {
    kind: KernelKind,
}

impl Default for ConvolverConfig {
    fn default() -> Self {
        Self {
            kind: KernelKind::Annular {
                r1: 5.0,
                r2: 10.0,
                r3: 15.0,
            },
        }
    }
}

impl ConvolverConfig {
    /// Validates a kernel selection.
    pub fn new(kind: KernelKind) -> Result<Self, ConfigError> {
        kind.validate()?;
        Ok(Self { kind })
    }

    /// Resolves a string key plus numeric parameters, the way interactive
    /// callers configure the search. Unknown keys, missing direction flags
    /// and non-positive sizes fail here, never later during `convolve`.
    ///
    /// Known keys: `delta`, `constant`/`box`, `radial`, `annular`,
    /// `enhanced_annular`, `sobel`, `sobel5`, `prewitt`, `roberts`,
    /// `central_difference`.
    pub fn from_key(key: &str, params: &HashMap<String, f64>) -> Result<Self, ConfigError> {
        let annulus = |def: (f64, f64, f64)| {
            (
                params.get("r1").copied().unwrap_or(def.0),
                params.get("r2").copied().unwrap_or(def.1),
                params.get("r3").copied().unwrap_or(def.2),
            )
        };

        let kind = match key {
            "delta" => KernelKind::Delta,
            "constant" | "box" => {
                let size = params.get("box_size").copied().unwrap_or(3.0);
                if size < 1.0 || size.fract() != 0.0 {
                    return Err(ConfigError::NonPositiveParameter {
                        name: "box_size",
                        value: size,
                    });
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let size = size as usize;
                KernelKind::Constant { size }
            }
            "radial" => KernelKind::Radial {
                r_in: params.get("r_in").copied().unwrap_or(0.0),
                r_out: params.get("r_out").copied().unwrap_or(5.0),
            },
            "annular" => {
                let (r1, r2, r3) = annulus((5.0, 10.0, 15.0));
                KernelKind::Annular { r1, r2, r3 }
            }
            "enhanced_annular" => {
                let (r1, r2, r3) = annulus((5.0, 10.0, 15.0));
                KernelKind::EnhancedAnnular { r1, r2, r3 }
            }
            "sobel" => gradient_kind(GradientOp::Sobel, params)?,
            "sobel5" => gradient_kind(GradientOp::Sobel5, params)?,
            "prewitt" => gradient_kind(GradientOp::Prewitt, params)?,
            "roberts" => gradient_kind(GradientOp::Roberts, params)?,
            "central_difference" => gradient_kind(GradientOp::CentralDifference, params)?,
            other => return Err(ConfigError::UnknownKernel(other.into())),
        };
        Self::new(kind)
    }

    /// Selected kernel.
    #[must_use]
    pub fn kind(&self) -> &KernelKind {
        &self.kind
    }

    /// Builds a runtime convolver. Infallible: parameters were validated at
    /// construction.
    #[must_use]
    pub fn build(&self) -> Convolver {
        match self.kind {
            KernelKind::Delta => Convolver::Delta,
            KernelKind::Constant { size } => {
                Convolver::Single(FftConvolver::new(kernel::box_stencil(size)))
            }
            KernelKind::Radial { r_in, r_out } => Convolver::Single(FftConvolver::new(
                kernel::radial_stencil(r_in, r_out).expect("validated at construction"),
            )),
            KernelKind::Annular { r1, r2, r3 } => Convolver::Annular {
                peak: FftConvolver::new(
                    kernel::radial_stencil(0.0, r1).expect("validated at construction"),
                ),
                background: FftConvolver::new(
                    kernel::radial_stencil(r2, r3).expect("validated at construction"),
                ),
            },
            KernelKind::EnhancedAnnular { r1, r2, r3 } => Convolver::EnhancedAnnular {
                peak: FftConvolver::new(
                    kernel::radial_stencil(0.0, r1).expect("validated at construction"),
                ),
                background: FftConvolver::new(
                    kernel::radial_stencil(r2, r3).expect("validated at construction"),
                ),
            },
            KernelKind::Gradient { op, axis } => {
                Convolver::Single(FftConvolver::new(kernel::gradient_stencil(op, axis)))
            }
        }
    }
}

fn gradient_kind(op: GradientOp, params: &HashMap<String, f64>) -> Result<KernelKind, ConfigError> {
    let x = params.get("x").copied().unwrap_or(0.0) != 0.0;
    let y = params.get("y").copied().unwrap_or(0.0) != 0.0;
    let axis = match (x, y) {
        (true, false) => Axis::X,
        (false, true) => Axis::Y,
        _ => return Err(ConfigError::MissingDirection),
    };
    Ok(KernelKind::Gradient { op, axis })
}

/// Standard deviation below which the enhanced annular response is zeroed
/// instead of divided.
const MIN_BACKGROUND_STD: f64 = 1e-10;

/// A runtime convolver: `convolve` maps a frame to a same-shape response.
///
/// Owns cached FFT plans; not shared across workers.
pub enum Convolver {
    /// Identity.
    Delta,
    /// One finite kernel.
    Single(FftConvolver),
    /// Peak response minus background response.
    Annular {
        /// Disc kernel over the peak region.
        peak: FftConvolver,
        /// Annulus kernel over the local background.
        background: FftConvolver,
    },
    /// Annular response divided by the background standard deviation.
    EnhancedAnnular {
        /// Disc kernel over the peak region.
        peak: FftConvolver,
        /// Annulus kernel over the local background.
        background: FftConvolver,
    },
}

impl Convolver {
    /// Filters one frame.
    pub fn convolve(&mut self, image: &Frame) -> Frame {
        match self {
            Convolver::Delta => image.clone(),
            Convolver::Single(conv) => conv.convolve(image),
            Convolver::Annular { peak, background } => {
                peak.convolve(image) - background.convolve(image)
            }
            Convolver::EnhancedAnnular { peak, background } => {
                let mean_peak = peak.convolve(image);
                let mean_bkg = background.convolve(image);
                let mean_bkg_sq = background.convolve(&image.mapv(|v| v * v));

                let mut out = mean_peak - &mean_bkg;
                for ((o, m), m2) in out.iter_mut().zip(mean_bkg.iter()).zip(mean_bkg_sq.iter()) {
                    let std = (m2 - m * m).max(0.0).sqrt();
                    *o = if std > MIN_BACKGROUND_STD { *o / std } else { 0.0 };
                }
                out
            }
        }
    }

    /// Kernel half-extent in (rows, cols); used to shrink the usable
    /// detector area when flagging edge peaks.
    #[must_use]
    pub fn half_extent(&self) -> (usize, usize) {
        match self {
            Convolver::Delta => (0, 0),
            Convolver::Single(conv) => conv.half_extent(),
            Convolver::Annular { peak, background }
            | Convolver::EnhancedAnnular { peak, background } => {
                let (pr, pc) = peak.half_extent();
                let (br, bc) = background.half_extent();
                (pr.max(br), pc.max(bc))
            }
        }
    }
}
