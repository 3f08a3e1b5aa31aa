//! Traversal generators.
//!
//! A traversal turns an ordered list of axes into a lazy sequence of
//! [`Coordinate`]s. Generators are pure: every call to [`Strategy::coordinates`]
//! builds a fresh iterator that owns its own position state, so the same axes
//! and strategy always produce the same sequence.
//!
//! | Strategy | Order |
//! |----------|-------|
//! | [`Strategy::Sweep`] | odometer, `axes[0]` outermost, optional serpentine |
//! | [`Strategy::Star`] | each axis alone, others held at `begin` |
//! | [`Strategy::Hilbert`] | Hilbert curve over the last two axes, nested sweep over the rest |
//!
//! # Example
//!
//! ```rust
//! use parspace::axis::Axis;
//! use parspace::traversal::Strategy;
//!
//! let axes = vec![Axis::new("x", 0.0, 2.0, 1.0), Axis::new("y", 0.0, 2.0, 1.0)];
//! let points: Vec<_> = Strategy::Sweep { sweepback: false }
//!     .coordinates(&axes)
//!     .unwrap()
//!     .collect();
//!
//! assert_eq!(points.len(), 9);
//! assert_eq!(points[1].values, vec![0.0, 1.0]);
//! assert!(points[2].block_boundary);
//! ```

use crate::axis::Axis;
use crate::error::{ParspaceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod hilbert;
pub mod sweep;

pub use hilbert::{HilbertCurve, HilbertSweep};
pub use sweep::{NestedSweep, StarSweep};

/// Default Hilbert curve depth.
pub const DEFAULT_HILBERT_DEPTH: u32 = 3;

/// Deepest Hilbert curve accepted by [`Strategy::check`]; `4^16` cells.
pub const MAX_HILBERT_DEPTH: u32 = 16;

/// One point to visit.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    /// One value per axis, in axis order
    pub values: Vec<f64>,
    /// Last point of a contiguous block
    pub block_boundary: bool,
}

impl Coordinate {
    /// Create a coordinate.
    pub fn new(values: Vec<f64>, block_boundary: bool) -> Self {
        Self {
            values,
            block_boundary,
        }
    }
}

/// Boxed coordinate stream.
pub type Coordinates = Box<dyn Iterator<Item = Coordinate> + Send>;

/// Options accepted by [`Strategy::from_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalOptions {
    /// Serpentine traversal of nested sweeps
    #[serde(default)]
    pub sweepback: bool,
    /// Hilbert curve depth
    #[serde(default = "default_depth")]
    pub n: u32,
}

fn default_depth() -> u32 {
    DEFAULT_HILBERT_DEPTH
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            sweepback: false,
            n: DEFAULT_HILBERT_DEPTH,
        }
    }
}

/// Traversal strategy descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    /// Nested sweep
    Sweep {
        /// Reverse each inner axis whenever its parent advances
        sweepback: bool,
    },
    /// Star / radial cross-sections
    Star,
    /// Hilbert curve over the last two axes
    Hilbert {
        /// Curve depth; the curve has `4^n` cells
        n: u32,
        /// Serpentine order of the outer sweep
        sweepback: bool,
    },
}

impl Strategy {
    /// Look up a strategy by name.
    pub fn from_name(name: &str, options: TraversalOptions) -> Result<Self> {
        match name {
            "sweep" => Ok(Strategy::Sweep {
                sweepback: options.sweepback,
            }),
            "star" => Ok(Strategy::Star),
            "hilbert" => Ok(Strategy::Hilbert {
                n: options.n,
                sweepback: options.sweepback,
            }),
            other => Err(ParspaceError::UnknownStrategy(other.to_string())),
        }
    }

    /// Registry name.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Sweep { .. } => "sweep",
            Strategy::Star => "star",
            Strategy::Hilbert { .. } => "hilbert",
        }
    }

    /// Fewest axes the strategy can walk.
    pub fn min_axes(&self) -> usize {
        match self {
            Strategy::Hilbert { .. } => 2,
            _ => 0,
        }
    }

    /// Check the axes without generating anything.
    ///
    /// Besides the axis count and every axis's own range, the Hilbert depth
    /// must not exceed [`MAX_HILBERT_DEPTH`] and the total point count must
    /// fit in a `usize`.
    pub fn check(&self, axes: &[Axis]) -> Result<()> {
        if axes.len() < self.min_axes() {
            return Err(ParspaceError::TooFewAxes {
                strategy: self.name(),
                required: self.min_axes(),
                found: axes.len(),
            });
        }
        axes.iter().try_for_each(Axis::validate)?;
        if let Strategy::Hilbert { n, .. } = *self {
            if n > MAX_HILBERT_DEPTH {
                return Err(self.too_large(format!(
                    "depth {n} exceeds the limit of {MAX_HILBERT_DEPTH}"
                )));
            }
        }
        self.point_count(axes).map(|_| ())
    }

    /// Build the coordinate stream for `axes`.
    ///
    /// Fails before producing anything if the axes are invalid or too few.
    pub fn coordinates(&self, axes: &[Axis]) -> Result<Coordinates> {
        self.check(axes)?;
        Ok(match *self {
            Strategy::Sweep { sweepback } => Box::new(NestedSweep::new(axes, sweepback)),
            Strategy::Star => Box::new(StarSweep::new(axes)),
            Strategy::Hilbert { n, sweepback } => Box::new(HilbertSweep::new(axes, n, sweepback)?),
        })
    }

    /// Number of coordinates [`coordinates`](Self::coordinates) yields.
    ///
    /// Fails with [`ParspaceError::TraversalTooLarge`] when the count
    /// overflows.
    pub fn point_count(&self, axes: &[Axis]) -> Result<usize> {
        let product = |axes: &[Axis]| {
            axes.iter()
                .try_fold(1usize, |total, axis| total.checked_mul(axis.points()))
        };
        let count = match *self {
            Strategy::Sweep { .. } if axes.is_empty() => Some(0),
            Strategy::Sweep { .. } => product(axes),
            Strategy::Star => axes
                .iter()
                .try_fold(0usize, |total, axis| total.checked_add(axis.points())),
            Strategy::Hilbert { .. } if axes.len() < 2 => Some(0),
            Strategy::Hilbert { n, .. } => {
                let cells = 4usize.checked_pow(n);
                product(&axes[..axes.len() - 2])
                    .zip(cells)
                    .and_then(|(outer, cells)| outer.checked_mul(cells))
            }
        };
        count.ok_or_else(|| self.too_large("point count overflows".to_string()))
    }

    fn too_large(&self, reason: String) -> ParspaceError {
        ParspaceError::TraversalTooLarge {
            strategy: self.name(),
            reason,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Sweep { sweepback } => write!(f, "sweep(sweepback={sweepback})"),
            Strategy::Star => write!(f, "star"),
            Strategy::Hilbert { n, sweepback } => {
                write!(f, "hilbert(n={n}, sweepback={sweepback})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        let options = TraversalOptions {
            sweepback: true,
            n: 2,
        };
        assert_eq!(
            Strategy::from_name("sweep", options).unwrap(),
            Strategy::Sweep { sweepback: true }
        );
        assert_eq!(Strategy::from_name("star", options).unwrap(), Strategy::Star);
        assert_eq!(
            Strategy::from_name("hilbert", TraversalOptions::default()).unwrap(),
            Strategy::Hilbert {
                n: 3,
                sweepback: false
            }
        );
    }

    #[test]
    fn test_unknown_name_fails() {
        let err = Strategy::from_name("spiral", TraversalOptions::default()).unwrap_err();
        assert!(matches!(err, ParspaceError::UnknownStrategy(ref name) if name == "spiral"));
    }

    #[test]
    fn test_hilbert_needs_two_axes() {
        let axes = vec![Axis::new("x", 0.0, 1.0, 0.1)];
        let strategy = Strategy::Hilbert {
            n: 2,
            sweepback: false,
        };
        assert!(matches!(
            strategy.coordinates(&axes),
            Err(ParspaceError::TooFewAxes {
                required: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_axis_fails_eagerly() {
        let axes = vec![Axis::new("x", 0.0, 1.0, 0.0)];
        let strategy = Strategy::Sweep { sweepback: false };
        assert!(matches!(
            strategy.coordinates(&axes),
            Err(ParspaceError::InvalidAxis { .. })
        ));
    }

    #[test]
    fn test_point_count_matches_stream() {
        let axes = vec![
            Axis::new("a", 0.0, 1.0, 0.5),
            Axis::new("b", 0.0, 3.0, 1.0),
            Axis::new("c", 1.0, 0.0, 0.25),
        ];
        for strategy in [
            Strategy::Sweep { sweepback: false },
            Strategy::Sweep { sweepback: true },
            Strategy::Star,
            Strategy::Hilbert {
                n: 2,
                sweepback: true,
            },
        ] {
            let produced = strategy.coordinates(&axes).unwrap().count();
            assert_eq!(produced, strategy.point_count(&axes).unwrap(), "{strategy}");
        }
    }

    #[test]
    fn test_hilbert_depth_is_bounded() {
        let axes = vec![Axis::new("x", 0.0, 1.0, 0.1), Axis::new("y", 0.0, 1.0, 0.1)];
        let deep = Strategy::Hilbert {
            n: 32,
            sweepback: false,
        };
        assert!(matches!(
            deep.point_count(&axes),
            Err(ParspaceError::TraversalTooLarge { .. })
        ));
        assert!(matches!(
            deep.check(&axes),
            Err(ParspaceError::TraversalTooLarge { .. })
        ));
        assert!(deep.coordinates(&axes).is_err());

        let limit = Strategy::Hilbert {
            n: MAX_HILBERT_DEPTH,
            sweepback: false,
        };
        assert!(limit.check(&axes).is_ok());
        assert_eq!(limit.point_count(&axes).unwrap(), 1 << 32);
    }

    #[test]
    fn test_overflowing_grid_is_rejected() {
        // each axis is valid on its own, the product is not countable
        let axes: Vec<Axis> = (0..4)
            .map(|i| Axis::new(format!("a{i}"), 0.0, 1.0, 1e-6))
            .collect();
        let sweep = Strategy::Sweep { sweepback: true };
        assert!(matches!(
            sweep.check(&axes),
            Err(ParspaceError::TraversalTooLarge { .. })
        ));
        assert!(Strategy::Star.check(&axes).is_ok());
    }

    #[test]
    fn test_serde_descriptor() {
        let json = serde_json::to_string(&Strategy::Hilbert {
            n: 4,
            sweepback: false,
        })
        .unwrap();
        assert!(json.contains("\"strategy\":\"hilbert\""));
        let back: Strategy = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name(), "hilbert");
    }
}
