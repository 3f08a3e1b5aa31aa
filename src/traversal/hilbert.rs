//! Hilbert-curve traversal.
//!
//! The curve recursively splits a rectangle into four quadrants, ordered so
//! that consecutive leaf cells share an edge. Leaves yield the cell midpoint.
//! [`HilbertCurve`] walks the recursion with an explicit work stack, so cells
//! are produced one at a time without buffering the curve.

use super::sweep::NestedSweep;
use super::Coordinate;
use crate::axis::Axis;
use crate::error::{ParspaceError, Result};

/// One pending quadrant: origin, the two half-axis vectors and remaining depth.
#[derive(Debug, Clone, Copy)]
struct Quadrant {
    x0: f64,
    y0: f64,
    xi: f64,
    xj: f64,
    yi: f64,
    yj: f64,
    depth: u32,
}

impl Quadrant {
    fn children(&self) -> [Quadrant; 4] {
        let Quadrant {
            x0,
            y0,
            xi,
            xj,
            yi,
            yj,
            depth,
        } = *self;
        let depth = depth - 1;
        [
            Quadrant {
                x0,
                y0,
                xi: yi / 2.0,
                xj: yj / 2.0,
                yi: xi / 2.0,
                yj: xj / 2.0,
                depth,
            },
            Quadrant {
                x0: x0 + xi / 2.0,
                y0: y0 + xj / 2.0,
                xi: xi / 2.0,
                xj: xj / 2.0,
                yi: yi / 2.0,
                yj: yj / 2.0,
                depth,
            },
            Quadrant {
                x0: x0 + xi / 2.0 + yi / 2.0,
                y0: y0 + xj / 2.0 + yj / 2.0,
                xi: xi / 2.0,
                xj: xj / 2.0,
                yi: yi / 2.0,
                yj: yj / 2.0,
                depth,
            },
            Quadrant {
                x0: x0 + xi / 2.0 + yi,
                y0: y0 + xj / 2.0 + yj,
                xi: -yi / 2.0,
                xj: -yj / 2.0,
                yi: -xi / 2.0,
                yj: -xj / 2.0,
                depth,
            },
        ]
    }

    fn midpoint(&self) -> (f64, f64) {
        (
            self.x0 + (self.xi + self.yi) / 2.0,
            self.y0 + (self.xj + self.yj) / 2.0,
        )
    }
}

/// Lazy depth-`n` Hilbert curve over `[x_begin, x_end] x [y_begin, y_end]`.
///
/// Yields `4^n` cell midpoints; the grid cell is `span / 2^n` on each axis.
#[derive(Debug, Clone)]
pub struct HilbertCurve {
    stack: Vec<Quadrant>,
}

impl HilbertCurve {
    /// Curve spanning the given ranges.
    pub fn new(x: (f64, f64), y: (f64, f64), n: u32) -> Self {
        Self {
            stack: vec![Quadrant {
                x0: x.0,
                y0: y.0,
                xi: x.1 - x.0,
                xj: 0.0,
                yi: 0.0,
                yj: y.1 - y.0,
                depth: n,
            }],
        }
    }

    /// Curve spanning the ranges of two axes.
    pub fn over(x: &Axis, y: &Axis, n: u32) -> Self {
        Self::new((x.begin, x.end), (y.begin, y.end), n)
    }
}

impl Iterator for HilbertCurve {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<(f64, f64)> {
        loop {
            let quadrant = self.stack.pop()?;
            if quadrant.depth == 0 {
                return Some(quadrant.midpoint());
            }
            self.stack.extend(quadrant.children().into_iter().rev());
        }
    }
}

/// Hilbert curve over the last two axes, repeated for every point of a nested
/// sweep over the leading axes.
///
/// The last cell of every curve pass closes a block.
pub struct HilbertSweep {
    outer: Box<dyn Iterator<Item = Vec<f64>> + Send>,
    x: (f64, f64),
    y: (f64, f64),
    n: u32,
    prefix: Option<Vec<f64>>,
    curve: HilbertCurve,
}

impl HilbertSweep {
    /// Start a Hilbert sweep; needs at least two axes.
    pub fn new(axes: &[Axis], n: u32, sweepback: bool) -> Result<Self> {
        if axes.len() < 2 {
            return Err(ParspaceError::TooFewAxes {
                strategy: "hilbert",
                required: 2,
                found: axes.len(),
            });
        }
        let split = axes.len() - 2;
        let (lead, plane) = axes.split_at(split);
        let outer: Box<dyn Iterator<Item = Vec<f64>> + Send> = if lead.is_empty() {
            Box::new(std::iter::once(Vec::new()))
        } else {
            Box::new(NestedSweep::new(lead, sweepback).map(|c| c.values))
        };
        let x = (plane[0].begin, plane[0].end);
        let y = (plane[1].begin, plane[1].end);
        Ok(Self {
            outer,
            x,
            y,
            n,
            prefix: None,
            curve: HilbertCurve::new(x, y, n),
        })
    }
}

impl Iterator for HilbertSweep {
    type Item = Coordinate;

    fn next(&mut self) -> Option<Coordinate> {
        loop {
            if self.prefix.is_none() {
                self.prefix = Some(self.outer.next()?);
                self.curve = HilbertCurve::new(self.x, self.y, self.n);
            }
            let prefix = self.prefix.as_ref()?;
            let Some((x, y)) = self.curve.next() else {
                self.prefix = None;
                continue;
            };
            let mut values = Vec::with_capacity(prefix.len() + 2);
            values.extend_from_slice(prefix);
            values.push(x);
            values.push(y);
            let block_boundary = self.curve.stack.is_empty();
            if block_boundary {
                self.prefix = None;
            }
            return Some(Coordinate::new(values, block_boundary));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_zero_is_rectangle_midpoint() {
        let cells: Vec<_> = HilbertCurve::new((0.0, 2.0), (0.0, 4.0), 0).collect();
        assert_eq!(cells, vec![(1.0, 2.0)]);
    }

    #[test]
    fn test_depth_one_order() {
        let cells: Vec<_> = HilbertCurve::new((0.0, 1.0), (0.0, 1.0), 1).collect();
        assert_eq!(
            cells,
            vec![(0.25, 0.25), (0.75, 0.25), (0.75, 0.75), (0.25, 0.75)]
        );
    }

    #[test]
    fn test_cells_are_connected() {
        for n in 1..=5 {
            let cell = 8.0 / f64::from(1u32 << n);
            let cells: Vec<_> = HilbertCurve::new((0.0, 8.0), (0.0, 8.0), n).collect();
            assert_eq!(cells.len(), 4usize.pow(n));
            for pair in cells.windows(2) {
                let dx = (pair[0].0 - pair[1].0).abs();
                let dy = (pair[0].1 - pair[1].1).abs();
                assert!((dx.max(dy) - cell).abs() < 1e-9, "n={n}: {pair:?}");
                assert!(dx.min(dy) < 1e-9, "diagonal step {pair:?}");
            }
        }
    }

    #[test]
    fn test_sweep_blocks_per_outer_point() {
        let axes = vec![
            Axis::new("T", 1.0, 2.0, 1.0),
            Axis::new("x", 0.0, 1.0, 0.1),
            Axis::new("y", 0.0, 1.0, 0.1),
        ];
        let points: Vec<Coordinate> = HilbertSweep::new(&axes, 2, false).unwrap().collect();
        assert_eq!(points.len(), 2 * 16);
        assert!(points.iter().all(|c| c.values.len() == 3));
        assert_eq!(points[0].values[0], 1.0);
        assert_eq!(points[16].values[0], 2.0);

        let boundaries: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, c)| c.block_boundary)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(boundaries, vec![15, 31]);
    }

    #[test]
    fn test_two_axes_single_pass() {
        let axes = vec![Axis::new("x", 0.0, 1.0, 0.1), Axis::new("y", 0.0, 1.0, 0.1)];
        let points: Vec<Coordinate> = HilbertSweep::new(&axes, 1, false).unwrap().collect();
        assert_eq!(points.len(), 4);
        assert!(points[3].block_boundary);
        assert!(!points[..3].iter().any(|c| c.block_boundary));
    }

    #[test]
    fn test_too_few_axes() {
        let axes = vec![Axis::new("x", 0.0, 1.0, 0.1)];
        assert!(HilbertSweep::new(&axes, 2, false).is_err());
    }
}
